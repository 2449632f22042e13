//! Sparse storage formats, row-partitioned kernels and triangular solves for SparseForge.

pub mod config;
pub mod dense;
pub mod device;
pub mod error;
pub mod format;
pub mod gemm;
pub mod profile;
pub mod random;
pub mod row_partition;
pub mod scalar;
pub mod triangular;

pub use config::*;
pub use dense::*;
pub use device::*;
pub use error::*;
pub use format::*;
pub use gemm::*;
pub use profile::*;
pub use random::*;
pub use row_partition::*;
pub use scalar::*;
pub use triangular::*;
