//! Element types the kernels are generic over.

use crate::config::DataType;
use ndarray::LinalgScalar;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;
use std::iter::Sum;
use std::ops::AddAssign;

pub trait Scalar:
    Float + FromPrimitive + LinalgScalar + AddAssign + Sum + Default + Debug + Send + Sync + 'static
{
    const DTYPE: DataType;

    /// Uniform sample from `[0, 1)`.
    fn sample(rng: &mut fastrand::Rng) -> Self;
}

impl Scalar for f32 {
    const DTYPE: DataType = DataType::F32;

    fn sample(rng: &mut fastrand::Rng) -> Self {
        rng.f32()
    }
}

impl Scalar for f64 {
    const DTYPE: DataType = DataType::F64;

    fn sample(rng: &mut fastrand::Rng) -> Self {
        rng.f64()
    }
}
