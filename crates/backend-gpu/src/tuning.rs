//! GPU tuning backend: realizes each profile as a generated WGSL kernel.

use crate::runtime::{GemmParams, GpuContext};
use crate::shaders::{gemm_dispatch_dims, gemm_shader_source};
use sparseforge_autotune::{OperationDescriptor, TuneResult, TuningBackend, TuningError};
use sparseforge_kernels::{random_dense, DataType, DeviceInfo, GemmLayout, GemmProfile};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

fn backend_error(err: anyhow::Error) -> TuningError {
    TuningError::Backend(format!("{err:#}"))
}

struct PreparedOperands {
    size: u32,
    bind_group: wgpu::BindGroup,
    // kept alive for the bind group
    _buffers: [wgpu::Buffer; 4],
}

pub struct GpuGemmBackend {
    ctx: GpuContext,
    rng: fastrand::Rng,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<(GemmProfile, GemmLayout), wgpu::ComputePipeline>,
    operands: Option<PreparedOperands>,
}

impl GpuGemmBackend {
    pub fn new(ctx: GpuContext) -> Self {
        Self::with_seed(ctx, 0x5eed)
    }

    pub fn with_seed(ctx: GpuContext, seed: u64) -> Self {
        let bind_group_layout = ctx.gemm_bind_group_layout();
        let pipeline_layout = ctx.pipeline_layout("gemm_pipeline_layout", &bind_group_layout);
        Self {
            ctx,
            rng: fastrand::Rng::with_seed(seed),
            bind_group_layout,
            pipeline_layout,
            pipelines: HashMap::new(),
            operands: None,
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    fn ensure_single_precision(op: &OperationDescriptor) -> TuneResult<()> {
        if op.dtype != DataType::F32 {
            return Err(TuningError::Backend(format!(
                "GPU kernels are generated for single precision only, got {}",
                op.dtype.name()
            )));
        }
        Ok(())
    }

    fn pipeline(&mut self, op: &OperationDescriptor, profile: &GemmProfile) -> TuneResult<&wgpu::ComputePipeline> {
        let key = (*profile, op.layout);
        if !self.pipelines.contains_key(&key) {
            debug!(?profile, layout = %op.layout, "compiling GPU gemm kernel");
            let pipeline = self
                .ctx
                .compute_pipeline(
                    "gemm",
                    gemm_shader_source(profile, op.layout),
                    &self.pipeline_layout,
                )
                .map_err(backend_error)?;
            self.pipelines.insert(key, pipeline);
        }
        self.pipelines
            .get(&key)
            .ok_or_else(|| TuningError::Backend("pipeline cache miss".to_string()))
    }

    fn submit(
        &mut self,
        op: &OperationDescriptor,
        profile: &GemmProfile,
        timestamps: Option<&wgpu::Buffer>,
    ) -> TuneResult<()> {
        Self::ensure_single_precision(op)?;
        let size = match &self.operands {
            Some(operands) => operands.size as usize,
            None => {
                return Err(TuningError::Backend(
                    "launch before operands were prepared".to_string(),
                ))
            }
        };
        self.pipeline(op, profile)?;
        let (Some(pipeline), Some(operands)) =
            (self.pipelines.get(&(*profile, op.layout)), &self.operands)
        else {
            return Err(TuningError::Backend("pipeline cache miss".to_string()));
        };
        let encoder = self.ctx.encode_dispatch(
            "gemm",
            pipeline,
            &operands.bind_group,
            gemm_dispatch_dims(profile, size, size),
            timestamps,
        );
        self.ctx.queue().submit(Some(encoder.finish()));
        Ok(())
    }
}

impl TuningBackend for GpuGemmBackend {
    fn device(&self) -> &DeviceInfo {
        self.ctx.info()
    }

    fn prepare(&mut self, op: &OperationDescriptor, problem_size: usize) -> TuneResult<()> {
        Self::ensure_single_precision(op)?;
        info!(operation = %op, problem_size, "preparing GPU tuning operands");
        let size = u32::try_from(problem_size)
            .map_err(|_| TuningError::invalid("problem_size", "exceeds u32"))?;
        let ((lr, lc), (rr, rc)) = op.layout.operand_shapes(problem_size, problem_size, problem_size);
        let lhs = random_dense::<f32>(lr, lc, &mut self.rng);
        let rhs = random_dense::<f32>(rr, rc, &mut self.rng);
        let lhs_data: Vec<f32> = lhs.iter().copied().collect();
        let rhs_data: Vec<f32> = rhs.iter().copied().collect();
        let params = GemmParams {
            size_m: size,
            size_n: size,
            size_k: size,
            _padding: 0,
        };

        let lhs_buffer = self.ctx.upload("lhs", &lhs_data, wgpu::BufferUsages::STORAGE);
        let rhs_buffer = self.ctx.upload("rhs", &rhs_data, wgpu::BufferUsages::STORAGE);
        let output_buffer = self.ctx.output_buffer("output", problem_size * problem_size);
        let params_buffer = self.ctx.upload("params", &[params], wgpu::BufferUsages::UNIFORM);
        let bind_group = self.ctx.bind_buffers(
            "gemm_bind_group",
            &self.bind_group_layout,
            &[&lhs_buffer, &rhs_buffer, &output_buffer, &params_buffer],
        );
        self.operands = Some(PreparedOperands {
            size,
            bind_group,
            _buffers: [lhs_buffer, rhs_buffer, output_buffer, params_buffer],
        });
        Ok(())
    }

    fn launch(&mut self, op: &OperationDescriptor, profile: &GemmProfile) -> TuneResult<()> {
        self.submit(op, profile, None)
    }

    fn finish(&mut self) -> TuneResult<()> {
        self.ctx.device().poll(wgpu::Maintain::Wait);
        Ok(())
    }

    /// Kernel time from timestamp queries when the device has them,
    /// otherwise drained wall time.
    fn time_launch(&mut self, op: &OperationDescriptor, profile: &GemmProfile) -> TuneResult<Duration> {
        // compile outside the measured region
        self.pipeline(op, profile)?;
        self.finish()?;
        match self.ctx.timestamp_buffer() {
            Some(timestamps) => {
                self.submit(op, profile, Some(&timestamps))?;
                self.finish()?;
                let nanos = self.ctx.elapsed_ns(&timestamps).map_err(backend_error)?;
                Ok(Duration::from_secs_f64(nanos.max(0.0) / 1e9))
            }
            None => {
                let start = Instant::now();
                self.launch(op, profile)?;
                self.finish()?;
                Ok(start.elapsed())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_precision_is_refused() -> TuneResult<()> {
        let Ok(ctx) = GpuContext::new(None) else {
            return Ok(());
        };
        let mut backend = GpuGemmBackend::new(ctx);
        let op = OperationDescriptor::new(GemmLayout::AA, DataType::F64);
        assert!(matches!(backend.prepare(&op, 16), Err(TuningError::Backend(_))));
        Ok(())
    }

    #[test]
    fn times_a_prepared_launch() -> TuneResult<()> {
        let Ok(ctx) = GpuContext::new(None) else {
            return Ok(());
        };
        let mut backend = GpuGemmBackend::new(ctx);
        let op = OperationDescriptor::new(GemmLayout::TA, DataType::F32);
        let profile = GemmProfile {
            ml: 16,
            kl: 16,
            nl: 16,
            ms: 2,
            ks: 2,
            ns: 2,
            ..GemmProfile::default()
        };
        assert!(backend.launch(&op, &profile).is_err());
        backend.prepare(&op, 40)?;
        let elapsed = backend.time_launch(&op, &profile)?;
        assert!(elapsed < Duration::from_secs(10));
        Ok(())
    }
}
