//! Error taxonomy for sparse kernels and solves.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SparseError {
    #[error("dimension mismatch in {operation}: expected {expected}, got {actual}")]
    DimensionMismatch {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid {format} structure: {reason}")]
    InvalidStructure {
        format: &'static str,
        reason: String,
    },

    #[error("singular triangular factor: zero pivot in row {row}")]
    SingularFactor { row: usize },

    #[error("kernel `{kernel}` failed to build or launch: {reason}")]
    KernelLaunch { kernel: String, reason: String },

    #[error("invalid launch configuration: {0}")]
    InvalidLaunch(String),
}

pub type SparseResult<T> = Result<T, SparseError>;

impl SparseError {
    pub fn mismatch(operation: &'static str, expected: usize, actual: usize) -> Self {
        SparseError::DimensionMismatch {
            operation,
            expected,
            actual,
        }
    }

    pub fn structure(format: &'static str, reason: impl Into<String>) -> Self {
        SparseError::InvalidStructure {
            format,
            reason: reason.into(),
        }
    }

    pub fn launch(kernel: impl Into<String>, reason: impl Into<String>) -> Self {
        SparseError::KernelLaunch {
            kernel: kernel.into(),
            reason: reason.into(),
        }
    }
}

/// Fails with a dimension mismatch unless `actual == expected`.
pub(crate) fn ensure_dim(operation: &'static str, expected: usize, actual: usize) -> SparseResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(SparseError::mismatch(operation, expected, actual))
    }
}
