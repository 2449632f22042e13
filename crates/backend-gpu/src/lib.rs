//! wgpu backend for SparseForge: generated WGSL kernels and the GPU tuning backend.

pub mod runtime;
pub mod shaders;
pub mod tuning;

pub use runtime::*;
pub use shaders::*;
pub use tuning::*;
