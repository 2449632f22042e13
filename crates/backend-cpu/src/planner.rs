//! Kernel variant and solve path selection for the host device.

use serde::{Deserialize, Serialize};
use sparseforge_kernels::{
    DataType, DeviceInfo, LaunchConfig, MemoryLocation, SparseError, SparseFormat, SparseResult,
};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOptions {
    /// Workers per group for every row-partitioned launch.
    pub work_group_size: usize,
    pub adaptive_csr: bool,
    /// Honour supplied level schedules on the device solve path.
    pub level_scheduling: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            work_group_size: 128,
            adaptive_csr: true,
            level_scheduling: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KernelVariant {
    CsrScalar,
    CsrAdaptive,
    CompressedCsr,
    Coo,
    Ell,
    SlicedEll,
    Hybrid,
}

impl KernelVariant {
    pub fn name(&self) -> &'static str {
        match self {
            KernelVariant::CsrScalar => "csr-scalar",
            KernelVariant::CsrAdaptive => "csr-adaptive",
            KernelVariant::CompressedCsr => "compressed-csr",
            KernelVariant::Coo => "coo-segmented",
            KernelVariant::Ell => "ell",
            KernelVariant::SlicedEll => "sliced-ell",
            KernelVariant::Hybrid => "hyb",
        }
    }
}

impl fmt::Display for KernelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a triangular solve is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolvePlan {
    /// Both operands live on the host; solve in place without relocation.
    HostDirect,
    LevelScheduled,
    /// Single-worker substitution on the device.
    DeviceSequential,
}

#[derive(Debug, Clone)]
pub struct DispatchPlanner {
    device: DeviceInfo,
    options: DispatchOptions,
}

impl DispatchPlanner {
    pub fn new(device: DeviceInfo, options: DispatchOptions) -> Self {
        Self { device, options }
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Launch geometry for row-partitioned kernels on this device.
    pub fn launch(&self) -> SparseResult<LaunchConfig> {
        let size = self.options.work_group_size;
        if size > self.device.max_work_group_size {
            return Err(SparseError::InvalidLaunch(format!(
                "work group size {size} exceeds the device maximum {}",
                self.device.max_work_group_size
            )));
        }
        let launch = LaunchConfig::new((self.device.compute_units * 4).max(1), size);
        launch.validate()?;
        Ok(launch)
    }

    /// One group of one worker, for the device substitution path.
    pub fn single_worker_launch(&self) -> SparseResult<LaunchConfig> {
        let launch = LaunchConfig::new(1, 1);
        launch.validate()?;
        Ok(launch)
    }

    pub fn variant_for(&self, format: SparseFormat, dtype: DataType) -> KernelVariant {
        match format {
            SparseFormat::Csr
                if self.options.adaptive_csr && self.device.fits_adaptive_csr(dtype) =>
            {
                KernelVariant::CsrAdaptive
            }
            SparseFormat::Csr => KernelVariant::CsrScalar,
            SparseFormat::CompressedCsr => KernelVariant::CompressedCsr,
            SparseFormat::Coo => KernelVariant::Coo,
            SparseFormat::Ell => KernelVariant::Ell,
            SparseFormat::SlicedEll => KernelVariant::SlicedEll,
            SparseFormat::Hybrid => KernelVariant::Hybrid,
        }
    }

    pub fn solve_plan(
        &self,
        matrix: MemoryLocation,
        vector: MemoryLocation,
        has_schedule: bool,
        transposed: bool,
    ) -> SolvePlan {
        if matrix == MemoryLocation::Host && vector == MemoryLocation::Host {
            SolvePlan::HostDirect
        } else if has_schedule && !transposed && self.options.level_scheduling {
            SolvePlan::LevelScheduled
        } else {
            SolvePlan::DeviceSequential
        }
    }
}
