//! Errors raised while building or searching a tuning space.

use sparseforge_kernels::SparseError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TuningError {
    #[error("invalid tuning parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("assignment has no value for parameter `{0}`")]
    UnknownParameter(String),

    #[error(transparent)]
    Kernel(#[from] SparseError),

    #[error("no usable configuration survived round {round}")]
    NoUsableConfiguration { round: usize },

    #[error("tuning backend failure: {0}")]
    Backend(String),
}

pub type TuneResult<T> = Result<T, TuningError>;

impl TuningError {
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        TuningError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
