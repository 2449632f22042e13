//! Host device dispatch, host tuning backend and ILUT preconditioning for SparseForge.

pub mod planner;
pub mod precond;
pub mod runtime;
pub mod tuning;

pub use planner::*;
pub use precond::*;
pub use runtime::*;
pub use tuning::*;
