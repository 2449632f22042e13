//! Matrix-product kernel profiles and their device validity rules.

use crate::device::DeviceInfo;
use serde::{Deserialize, Serialize};

/// Every work-group tile dimension must divide this or be a multiple of it.
pub const PROFILE_ALIGNMENT: usize = 128;

/// Fully resolved tuning choices for one matrix-product kernel.
///
/// A work group computes an `ml × nl` output tile, stepping through the
/// contracted dimension `kl` at a time; each worker owns an `ms × ns`
/// micro-tile and consumes `ks` contracted elements per inner step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GemmProfile {
    pub ml: usize,
    pub kl: usize,
    pub nl: usize,
    pub ms: usize,
    pub ks: usize,
    pub ns: usize,
    /// Stage the left operand tile in local memory.
    pub lhs_local: bool,
    /// Stage the right operand tile in local memory.
    pub rhs_local: bool,
    pub vector: usize,
    pub unroll: usize,
}

impl GemmProfile {
    /// Workers along the `n` and `m` axes of a work group.
    pub fn work_group_dims(&self) -> (usize, usize) {
        (self.nl / self.ns.max(1), self.ml / self.ms.max(1))
    }

    pub fn work_group_size(&self) -> usize {
        let (x, y) = self.work_group_dims();
        x * y
    }

    pub fn local_memory_bytes(&self, elem_size: usize) -> usize {
        let lhs = if self.lhs_local { self.ml * self.kl } else { 0 };
        let rhs = if self.rhs_local { self.kl * self.nl } else { 0 };
        (lhs + rhs) * elem_size
    }

    /// Why this profile cannot run on `device`, if it cannot.
    pub fn rejection(&self, device: &DeviceInfo, elem_size: usize) -> Option<&'static str> {
        let tiles = [self.ml, self.kl, self.nl];
        let micro = [self.ms, self.ks, self.ns];
        if tiles.iter().chain(&micro).any(|&dim| dim == 0) || self.vector == 0 || self.unroll == 0 {
            return Some("zero-sized dimension");
        }
        if tiles
            .iter()
            .any(|&dim| PROFILE_ALIGNMENT % dim != 0 && dim % PROFILE_ALIGNMENT != 0)
        {
            return Some("tile size not aligned");
        }
        if tiles.iter().zip(&micro).any(|(&tile, &m)| m > tile || tile % m != 0) {
            return Some("micro-tile does not divide its tile");
        }
        if !matches!(self.vector, 1 | 2 | 4) {
            return Some("unsupported vector width");
        }
        if micro.iter().any(|&m| m % self.vector != 0) {
            return Some("micro-tile not a multiple of the vector width");
        }
        if self.kl % self.unroll != 0 {
            return Some("unroll factor does not divide the k tile");
        }
        if self.work_group_size() > device.max_work_group_size {
            return Some("work group too large");
        }
        if self.local_memory_bytes(elem_size) > device.local_memory_bytes {
            return Some("local memory exceeded");
        }
        if elem_size == 8 && !device.supports_f64 {
            return Some("double precision unsupported");
        }
        None
    }

    pub fn is_invalid(&self, device: &DeviceInfo, elem_size: usize) -> bool {
        self.rejection(device, elem_size).is_some()
    }
}

impl Default for GemmProfile {
    fn default() -> Self {
        Self {
            ml: 64,
            kl: 32,
            nl: 64,
            ms: 4,
            ks: 4,
            ns: 4,
            lhs_local: true,
            rhs_local: false,
            vector: 1,
            unroll: 1,
        }
    }
}
