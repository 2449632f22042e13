//! SparseForge: sparse storage formats, row-partitioned kernels and a
//! profile-driven autotuner for matrix-product kernels.

pub use sparseforge_autotune as autotune;
pub use sparseforge_backend_cpu as backend_cpu;
pub use sparseforge_kernels as kernels;

pub use sparseforge_autotune::{OperationDescriptor, ProfileCache, RoundSpec, Tuner, TuningConfig};
pub use sparseforge_backend_cpu::{
    multiply, multiply_dense, multiply_into, row_reduce, triangular_solve, Context, IlutConfig,
    IlutPrecond,
};
pub use sparseforge_kernels::{
    CsrMatrix, DataType, DenseMatrix, DenseVector, LevelSchedule, SparseError, SparseFormat,
    SparseMatrix, SparseResult,
};
