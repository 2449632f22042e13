//! Compute device descriptions used for dispatch and tuning validity.

use crate::config::{DataType, ADAPTIVE_SHARED_ELEMENTS};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub backend: String,
    pub max_work_group_size: usize,
    pub local_memory_bytes: usize,
    pub compute_units: usize,
    pub supports_f64: bool,
}

impl DeviceInfo {
    /// The host CPU seen as a device: rayon workers as compute units and an
    /// L1-sized scratch area standing in for local memory.
    pub fn host() -> Self {
        Self {
            name: "host".to_string(),
            backend: "cpu".to_string(),
            max_work_group_size: 1024,
            local_memory_bytes: 64 * 1024,
            compute_units: rayon::current_num_threads(),
            supports_f64: true,
        }
    }

    pub fn supports(&self, dtype: DataType) -> bool {
        match dtype {
            DataType::F32 => true,
            DataType::F64 => self.supports_f64,
        }
    }

    /// Whether the adaptive CSR staging buffer fits in local memory.
    pub fn fits_adaptive_csr(&self, dtype: DataType) -> bool {
        ADAPTIVE_SHARED_ELEMENTS * dtype.element_size_bytes() <= self.local_memory_bytes
    }

    /// Stable identifier used to key persisted tuning results.
    pub fn key(&self) -> String {
        format!("{}/{}", self.backend, self.name)
    }
}
