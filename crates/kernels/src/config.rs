//! Kernel configuration structures.

use crate::error::{SparseError, SparseResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    F32,
    F64,
}

impl DataType {
    pub fn element_size_bytes(&self) -> usize {
        match self {
            DataType::F32 => 4,
            DataType::F64 => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::F32 => "float",
            DataType::F64 => "double",
        }
    }
}

/// Memory space a dense operand currently resides in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MemoryLocation {
    #[default]
    Host,
    Device,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Layout {
    #[default]
    RowMajor,
    ColumnMajor,
}

/// Per-row quantity computed by the `row_info` kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowInfo {
    InfNorm,
    OneNorm,
    TwoNorm,
    Diagonal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriangularKind {
    UnitLower,
    Lower,
    UnitUpper,
    Upper,
}

impl TriangularKind {
    pub fn is_lower(&self) -> bool {
        matches!(self, TriangularKind::UnitLower | TriangularKind::Lower)
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, TriangularKind::UnitLower | TriangularKind::UnitUpper)
    }
}

/// How the dense right-hand side of a sparse × dense product is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RhsOp {
    #[default]
    Plain,
    Transposed,
}

/// Elements staged in shared memory by one adaptive CSR work group.
pub const ADAPTIVE_SHARED_ELEMENTS: usize = 1024;

/// Launch geometry of a row-partitioned kernel.
///
/// `work_group_size` is the number of lockstep workers per group and must be a
/// power of two so tree reductions halve cleanly. On the host, `work_groups`
/// bounds how many row spans are scheduled as independent tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfig {
    pub work_groups: usize,
    pub work_group_size: usize,
}

impl LaunchConfig {
    pub const fn new(work_groups: usize, work_group_size: usize) -> Self {
        Self {
            work_groups,
            work_group_size,
        }
    }

    pub fn validate(&self) -> SparseResult<()> {
        if self.work_groups == 0 {
            return Err(SparseError::InvalidLaunch(
                "at least one work group is required".to_string(),
            ));
        }
        if !self.work_group_size.is_power_of_two() {
            return Err(SparseError::InvalidLaunch(format!(
                "work group size {} is not a power of two",
                self.work_group_size
            )));
        }
        Ok(())
    }

    pub fn global_size(&self) -> usize {
        self.work_groups * self.work_group_size
    }

    /// Rows handled by one group task: the group's share of the grid-stride
    /// loop, rounded up to whole work groups.
    pub fn rows_per_group(&self, rows: usize) -> usize {
        let groups = self.work_groups.max(1);
        let size = self.work_group_size.max(1);
        rows.div_ceil(groups).div_ceil(size).max(1) * size
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self::new(128, 128)
    }
}
