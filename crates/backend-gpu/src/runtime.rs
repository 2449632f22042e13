//! wgpu device context: adapter selection, buffer plumbing and kernel launches.
//!
//! Kernels are generated as WGSL (see [`crate::shaders`]) and run through
//! wgpu, which maps to Vulkan, Metal or DX12 depending on the platform.

use crate::shaders::{csr_spmv_shader_source, gemm_dispatch_dims, gemm_shader_source};
use anyhow::{anyhow, ensure, Result};
use bytemuck::{cast_slice, Pod, Zeroable};
use ndarray::{Array2, ArrayView2};
use pollster::block_on;
use sparseforge_kernels::{CsrMatrix, DeviceInfo, GemmLayout, GemmProfile};
use std::num::NonZeroU64;
use std::sync::mpsc;
use wgpu::util::DeviceExt;
use tracing::{debug, info};

const SPMV_WORK_GROUP_SIZE: u32 = 64;
const MAX_DISPATCH: u32 = 65_535;

/// What an adapter offers, as reported before a device is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterSummary {
    pub index: usize,
    pub name: String,
    pub backend: String,
    pub device_type: String,
    pub has_f64: bool,
    pub has_timestamps: bool,
}

/// Every adapter wgpu can see, in selection-index order.
pub fn enumerate_adapters() -> Vec<AdapterSummary> {
    wgpu::Instance::default()
        .enumerate_adapters(wgpu::Backends::all())
        .into_iter()
        .enumerate()
        .map(|(index, adapter)| {
            let info = adapter.get_info();
            let features = adapter.features();
            AdapterSummary {
                index,
                name: info.name,
                backend: format!("{:?}", info.backend).to_lowercase(),
                device_type: format!("{:?}", info.device_type),
                has_f64: features.contains(wgpu::Features::SHADER_F64),
                has_timestamps: features.contains(wgpu::Features::TIMESTAMP_QUERY),
            }
        })
        .collect()
}

fn device_info(adapter: &wgpu::Adapter) -> DeviceInfo {
    let info = adapter.get_info();
    let limits = adapter.limits();
    DeviceInfo {
        name: info.name,
        backend: format!("wgpu-{:?}", info.backend).to_lowercase(),
        max_work_group_size: limits.max_compute_invocations_per_workgroup as usize,
        local_memory_bytes: limits.max_compute_workgroup_storage_size as usize,
        // not exposed through wgpu
        compute_units: 1,
        supports_f64: adapter.features().contains(wgpu::Features::SHADER_F64),
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub(crate) struct GemmParams {
    pub size_m: u32,
    pub size_n: u32,
    pub size_k: u32,
    pub _padding: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SpmvParams {
    rows: u32,
    _pad: [u32; 3],
}

pub(crate) fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub(crate) fn uniform_entry<P>(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(std::mem::size_of::<P>() as u64),
        },
        count: None,
    }
}

fn to_u32(values: &[usize], what: &str) -> Result<Vec<u32>> {
    values
        .iter()
        .map(|&v| u32::try_from(v).map_err(|_| anyhow!("{what} value {v} exceeds u32")))
        .collect()
}

pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    info: DeviceInfo,
    timestamp_query_set: Option<wgpu::QuerySet>,
    timestamp_period: f32,
}

impl GpuContext {
    /// Opens the adapter at `index` from [`enumerate_adapters`], or the
    /// high-performance default when `None`.
    pub fn new(index: Option<usize>) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = match index {
            Some(index) => instance
                .enumerate_adapters(wgpu::Backends::all())
                .into_iter()
                .nth(index)
                .ok_or_else(|| anyhow!("no GPU adapter at index {index}"))?,
            None => block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            }))
            .ok_or_else(|| anyhow!("no suitable GPU adapter found"))?,
        };

        let supports_timestamps = adapter.features().contains(wgpu::Features::TIMESTAMP_QUERY);
        let required_features = if supports_timestamps {
            wgpu::Features::TIMESTAMP_QUERY
        } else {
            wgpu::Features::empty()
        };
        // request the adapter's own limits so DeviceInfo matches what kernels may use
        let (device, queue) = block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("SparseForge GPU Device"),
                required_features,
                required_limits: adapter.limits(),
            },
            None,
        ))?;

        let timestamp_query_set = supports_timestamps.then(|| {
            device.create_query_set(&wgpu::QuerySetDescriptor {
                label: Some("timestamp_queries"),
                ty: wgpu::QueryType::Timestamp,
                count: 2,
            })
        });
        let timestamp_period = if supports_timestamps {
            queue.get_timestamp_period()
        } else {
            0.0
        };

        let info = device_info(&adapter);
        info!(
            device = %info.key(),
            max_work_group_size = info.max_work_group_size,
            local_memory_bytes = info.local_memory_bytes,
            supports_timestamps,
            "opened GPU device"
        );
        Ok(Self {
            device,
            queue,
            info,
            timestamp_query_set,
            timestamp_period,
        })
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn supports_timestamps(&self) -> bool {
        self.timestamp_query_set.is_some()
    }

    pub(crate) fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub(crate) fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Storage buffer holding `data`; empty slices get one zeroed element
    /// since zero-sized bindings are rejected.
    pub(crate) fn upload<T: Pod>(&self, label: &str, data: &[T], usage: wgpu::BufferUsages) -> wgpu::Buffer {
        let zero = [T::zeroed()];
        let contents: &[T] = if data.is_empty() { &zero } else { data };
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: cast_slice(contents),
                usage,
            })
    }

    pub(crate) fn output_buffer(&self, label: &str, elements: usize) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: (elements.max(1) * std::mem::size_of::<f32>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    /// Compiles `source`, surfacing validation failures as errors instead of
    /// the uncaptured-error panic.
    pub(crate) fn compute_pipeline(
        &self,
        label: &str,
        source: String,
        layout: &wgpu::PipelineLayout,
    ) -> Result<wgpu::ComputePipeline> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(layout),
                module: &module,
                entry_point: "main",
            });
        if let Some(err) = block_on(self.device.pop_error_scope()) {
            return Err(anyhow!("{label} failed validation: {err}"));
        }
        Ok(pipeline)
    }

    pub(crate) fn gemm_bind_group_layout(&self) -> wgpu::BindGroupLayout {
        self.device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("gemm_layout"),
                entries: &[
                    storage_entry(0, true),
                    storage_entry(1, true),
                    storage_entry(2, false),
                    uniform_entry::<GemmParams>(3),
                ],
            })
    }

    pub(crate) fn pipeline_layout(&self, label: &str, layout: &wgpu::BindGroupLayout) -> wgpu::PipelineLayout {
        self.device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[layout],
                push_constant_ranges: &[],
            })
    }

    pub(crate) fn bind_buffers(
        &self,
        label: &str,
        layout: &wgpu::BindGroupLayout,
        buffers: &[&wgpu::Buffer],
    ) -> wgpu::BindGroup {
        let entries: Vec<wgpu::BindGroupEntry<'_>> = buffers
            .iter()
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &entries,
        })
    }

    /// Records one dispatch, optionally bracketed by timestamp writes that
    /// are resolved into `timestamps`.
    pub(crate) fn encode_dispatch(
        &self,
        label: &str,
        pipeline: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
        groups: (u32, u32),
        timestamps: Option<&wgpu::Buffer>,
    ) -> wgpu::CommandEncoder {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        let query_set = self.timestamp_query_set.as_ref().filter(|_| timestamps.is_some());
        let timestamp_writes = query_set.map(|qs| wgpu::ComputePassTimestampWrites {
            query_set: qs,
            beginning_of_pass_write_index: Some(0),
            end_of_pass_write_index: Some(1),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(groups.0, groups.1, 1);
        }
        if let (Some(qs), Some(buffer)) = (query_set, timestamps) {
            encoder.resolve_query_set(qs, 0..2, buffer, 0);
        }
        encoder
    }

    pub(crate) fn timestamp_buffer(&self) -> Option<wgpu::Buffer> {
        self.timestamp_query_set.as_ref().map(|_| {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("timestamp_buffer"),
                size: 2 * std::mem::size_of::<u64>() as u64,
                usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        })
    }

    /// Copies `len` elements of `source` back to the host.
    pub(crate) fn read_back<T: Pod>(&self, source: &wgpu::Buffer, len: usize) -> Result<Vec<T>> {
        let size = (len * std::mem::size_of::<T>()) as u64;
        if size == 0 {
            return Ok(Vec::new());
        }
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("read_back") });
        encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = sender.send(res);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| anyhow!("failed to receive GPU map signal"))??;
        let data = slice.get_mapped_range();
        let values: Vec<T> = cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();
        Ok(values)
    }

    /// Kernel time in nanoseconds from a resolved timestamp pair.
    pub(crate) fn elapsed_ns(&self, timestamps: &wgpu::Buffer) -> Result<f64> {
        let stamps: Vec<u64> = self.read_back(timestamps, 2)?;
        ensure!(stamps.len() == 2, "expected two timestamps");
        Ok(stamps[1].saturating_sub(stamps[0]) as f64 * self.timestamp_period as f64)
    }

    /// Scalar CSR `A × x` in single precision.
    pub fn spmv(&self, matrix: &CsrMatrix<f32>, x: &[f32]) -> Result<Vec<f32>> {
        ensure!(
            x.len() == matrix.cols(),
            "x has {} elements but the matrix has {} columns",
            x.len(),
            matrix.cols()
        );
        let rows = matrix.rows();
        if rows == 0 {
            return Ok(Vec::new());
        }
        let row_ptr = to_u32(matrix.row_ptr(), "row pointer")?;
        let col_idx = to_u32(matrix.col_idx(), "column index")?;
        let params = SpmvParams {
            rows: u32::try_from(rows)?,
            _pad: [0; 3],
        };

        let storage = wgpu::BufferUsages::STORAGE;
        let row_ptr_buffer = self.upload("row_ptr", &row_ptr, storage);
        let col_idx_buffer = self.upload("col_idx", &col_idx, storage);
        let values_buffer = self.upload("values", matrix.values(), storage);
        let x_buffer = self.upload("x", x, storage);
        let result_buffer = self.output_buffer("result", rows);
        let params_buffer = self.upload("params", &[params], wgpu::BufferUsages::UNIFORM);

        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("spmv_layout"),
                entries: &[
                    storage_entry(0, true),
                    storage_entry(1, true),
                    storage_entry(2, true),
                    storage_entry(3, true),
                    storage_entry(4, false),
                    uniform_entry::<SpmvParams>(5),
                ],
            });
        let pipeline_layout = self.pipeline_layout("spmv_pipeline_layout", &layout);
        let pipeline = self.compute_pipeline(
            "csr_spmv",
            csr_spmv_shader_source(SPMV_WORK_GROUP_SIZE),
            &pipeline_layout,
        )?;
        let bind_group = self.bind_buffers(
            "spmv_bind_group",
            &layout,
            &[
                &row_ptr_buffer,
                &col_idx_buffer,
                &values_buffer,
                &x_buffer,
                &result_buffer,
                &params_buffer,
            ],
        );

        let groups = params.rows.div_ceil(SPMV_WORK_GROUP_SIZE).clamp(1, MAX_DISPATCH);
        debug!(rows, nnz = matrix.nnz(), groups, "dispatching GPU CSR spmv");
        let encoder = self.encode_dispatch("spmv", &pipeline, &bind_group, (groups, 1), None);
        self.queue.submit(Some(encoder.finish()));
        self.read_back(&result_buffer, rows)
    }

    /// `op(lhs) × op(rhs)` with the kernel generated for `profile`.
    pub fn gemm(
        &self,
        profile: &GemmProfile,
        layout: GemmLayout,
        lhs: ArrayView2<'_, f32>,
        rhs: ArrayView2<'_, f32>,
    ) -> Result<Array2<f32>> {
        let (lr, lc) = lhs.dim();
        let (rr, rc) = rhs.dim();
        let (m, k) = if layout.lhs_transposed() { (lc, lr) } else { (lr, lc) };
        let (rhs_k, n) = if layout.rhs_transposed() { (rc, rr) } else { (rr, rc) };
        ensure!(k == rhs_k, "inner dimensions differ: {k} vs {rhs_k}");
        if let Some(reason) = profile.rejection(&self.info, std::mem::size_of::<f32>()) {
            return Err(anyhow!("profile rejected by {}: {reason}", self.info.key()));
        }

        let lhs_data: Vec<f32> = lhs.iter().copied().collect();
        let rhs_data: Vec<f32> = rhs.iter().copied().collect();
        let params = GemmParams {
            size_m: u32::try_from(m)?,
            size_n: u32::try_from(n)?,
            size_k: u32::try_from(k)?,
            _padding: 0,
        };
        let lhs_buffer = self.upload("lhs", &lhs_data, wgpu::BufferUsages::STORAGE);
        let rhs_buffer = self.upload("rhs", &rhs_data, wgpu::BufferUsages::STORAGE);
        let output_buffer = self.output_buffer("output", m * n);
        let params_buffer = self.upload("params", &[params], wgpu::BufferUsages::UNIFORM);

        let bind_layout = self.gemm_bind_group_layout();
        let pipeline_layout = self.pipeline_layout("gemm_pipeline_layout", &bind_layout);
        let pipeline = self.compute_pipeline(
            "gemm",
            gemm_shader_source(profile, layout),
            &pipeline_layout,
        )?;
        let bind_group = self.bind_buffers(
            "gemm_bind_group",
            &bind_layout,
            &[&lhs_buffer, &rhs_buffer, &output_buffer, &params_buffer],
        );
        let encoder = self.encode_dispatch(
            "gemm",
            &pipeline,
            &bind_group,
            gemm_dispatch_dims(profile, m, n),
            None,
        );
        self.queue.submit(Some(encoder.finish()));
        let values = self.read_back(&output_buffer, m * n)?;
        Array2::from_shape_vec((m, n), values)
            .map_err(|err| anyhow!("failed to shape GPU gemm output: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use sparseforge_kernels::reference_gemm;

    // Machines without an adapter skip the device checks.
    fn context() -> Option<GpuContext> {
        GpuContext::new(None).ok()
    }

    #[test]
    fn enumeration_indices_are_dense() {
        for (position, adapter) in enumerate_adapters().iter().enumerate() {
            assert_eq!(adapter.index, position);
        }
    }

    #[test]
    fn spmv_matches_host_product() -> Result<()> {
        let Some(ctx) = context() else {
            return Ok(());
        };
        let matrix = CsrMatrix::from_dense(&array![[1.0f32, 0.0, 2.0], [0.0, 0.0, 0.0], [4.0, 0.0, 5.0]]);
        let y = ctx.spmv(&matrix, &[1.0, 2.0, 3.0])?;
        assert_eq!(y, vec![7.0, 0.0, 19.0]);
        assert!(ctx.spmv(&matrix, &[1.0]).is_err());
        Ok(())
    }

    #[test]
    fn gemm_matches_reference_for_ragged_shapes() -> Result<()> {
        let Some(ctx) = context() else {
            return Ok(());
        };
        let profile = GemmProfile {
            ml: 16,
            kl: 16,
            nl: 16,
            ms: 2,
            ks: 2,
            ns: 2,
            ..GemmProfile::default()
        };
        let mut rng = fastrand::Rng::with_seed(3);
        for layout in GemmLayout::ALL {
            let ((lr, lc), (rr, rc)) = layout.operand_shapes(19, 23, 17);
            let lhs = sparseforge_kernels::random_dense::<f32>(lr, lc, &mut rng);
            let rhs = sparseforge_kernels::random_dense::<f32>(rr, rc, &mut rng);
            let expected = reference_gemm(layout, lhs.view(), rhs.view())?;
            let actual = ctx.gemm(&profile, layout, lhs.view(), rhs.view())?;
            assert_eq!(actual.dim(), (19, 23));
            for (a, e) in actual.iter().zip(expected.iter()) {
                assert_abs_diff_eq!(a, e, epsilon = 1e-4);
            }
        }
        Ok(())
    }
}
