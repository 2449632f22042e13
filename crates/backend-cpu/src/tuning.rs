//! Host tuning backend: realizes profiles with the tiled host GEMM.

use ndarray::Array2;
use sparseforge_autotune::{OperationDescriptor, TuneResult, TuningBackend, TuningError};
use sparseforge_kernels::{random_dense, DataType, DeviceInfo, GemmProfile, Scalar, TiledGemm};
use std::hint::black_box;
use tracing::info;

enum Operands {
    F32(Array2<f32>, Array2<f32>),
    F64(Array2<f64>, Array2<f64>),
}

fn random_operands<T: Scalar>(
    op: &OperationDescriptor,
    size: usize,
    rng: &mut fastrand::Rng,
) -> (Array2<T>, Array2<T>) {
    let ((lr, lc), (rr, rc)) = op.layout.operand_shapes(size, size, size);
    (random_dense(lr, lc, rng), random_dense(rr, rc, rng))
}

pub struct HostGemmBackend {
    device: DeviceInfo,
    rng: fastrand::Rng,
    operands: Option<Operands>,
}

impl HostGemmBackend {
    pub fn new() -> Self {
        Self::with_seed(0x5eed)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            device: DeviceInfo::host(),
            rng: fastrand::Rng::with_seed(seed),
            operands: None,
        }
    }
}

impl Default for HostGemmBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TuningBackend for HostGemmBackend {
    fn device(&self) -> &DeviceInfo {
        &self.device
    }

    fn prepare(&mut self, op: &OperationDescriptor, problem_size: usize) -> TuneResult<()> {
        info!(operation = %op, problem_size, "preparing host tuning operands");
        self.operands = Some(match op.dtype {
            DataType::F32 => {
                let (lhs, rhs) = random_operands(op, problem_size, &mut self.rng);
                Operands::F32(lhs, rhs)
            }
            DataType::F64 => {
                let (lhs, rhs) = random_operands(op, problem_size, &mut self.rng);
                Operands::F64(lhs, rhs)
            }
        });
        Ok(())
    }

    fn launch(&mut self, op: &OperationDescriptor, profile: &GemmProfile) -> TuneResult<()> {
        let kernel = TiledGemm::new(*profile);
        match &self.operands {
            Some(Operands::F32(lhs, rhs)) => {
                black_box(kernel.run(op.layout, lhs.view(), rhs.view())?);
            }
            Some(Operands::F64(lhs, rhs)) => {
                black_box(kernel.run(op.layout, lhs.view(), rhs.view())?);
            }
            None => {
                return Err(TuningError::Backend(
                    "launch before operands were prepared".to_string(),
                ))
            }
        }
        Ok(())
    }

    /// Host launches complete before returning.
    fn finish(&mut self) -> TuneResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparseforge_autotune::{RoundSpec, StepFn, Tuner, TuningConfig, TuningParam};
    use sparseforge_kernels::GemmLayout;

    #[test]
    fn launch_requires_prepared_operands() {
        let mut backend = HostGemmBackend::new();
        let op = OperationDescriptor::new(GemmLayout::AA, DataType::F32);
        assert!(backend.launch(&op, &GemmProfile::default()).is_err());
        backend.prepare(&op, 16).expect("prepare");
        assert!(backend.launch(&op, &GemmProfile::default()).is_ok());
    }

    #[test]
    fn tunes_a_small_space_end_to_end() -> TuneResult<()> {
        let mut config = TuningConfig::new();
        config
            .add(TuningParam::new("ml", 16, 32, StepFn::MulByTwo)?)
            .add(TuningParam::new("nl", 16, 32, StepFn::MulByTwo)?)
            .add(TuningParam::new("kl", 16, 16, StepFn::MulByTwo)?)
            .add(TuningParam::new("ms", 4, 4, StepFn::MulByTwo)?)
            .add(TuningParam::new("ks", 2, 4, StepFn::MulByTwo)?)
            .add(TuningParam::new("ns", 4, 4, StepFn::MulByTwo)?)
            .add(TuningParam::new("vector", 1, 2, StepFn::MulByTwo)?)
            .add(TuningParam::new("lhs_storage", 0, 1, StepFn::AddOne)?)
            .add(TuningParam::new("rhs_storage", 0, 0, StepFn::AddOne)?)
            .add(TuningParam::new("unroll", 1, 1, StepFn::AddOne)?);

        let mut backend = HostGemmBackend::with_seed(11);
        let op = OperationDescriptor::new(GemmLayout::TT, DataType::F64);
        let outcome = Tuner::default().with_runs(0, 1).run(
            &mut backend,
            &op,
            &config,
            &[RoundSpec::new(24, 6), RoundSpec::new(48, 2)],
        )?;
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.rounds.len(), 2);
        assert_eq!(outcome.operation, op);
        Ok(())
    }
}
