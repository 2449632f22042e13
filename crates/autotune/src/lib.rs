//! Parameter spaces and the multi-round autotuning search for SparseForge kernels.

pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod param;
pub mod timings;
pub mod tuner;

pub use builder::*;
pub use cache::*;
pub use config::*;
pub use error::*;
pub use param::*;
pub use timings::*;
pub use tuner::*;
