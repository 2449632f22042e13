//! CLI wiring for the sparseforge tool.

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ndarray::Array1;
use sparseforge_autotune::{
    default_gemm_space, OperationDescriptor, ProfileCache, RoundSpec, Tuner, TuningBackend,
};
use sparseforge_backend_cpu::{multiply, Context, HostGemmBackend};
use sparseforge_backend_gpu::{enumerate_adapters, GpuContext, GpuGemmBackend};
use sparseforge_kernels::{
    random_csr, CsrMatrix, DataType, DenseVector, DeviceInfo, GemmLayout, SparseFormat, SparseMatrix,
};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sparseforge", about = "SparseForge sparse kernels and autotuner")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendArg {
    Cpu,
    Gpu,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutArg {
    Aa,
    Ta,
    At,
    Tt,
}

impl From<LayoutArg> for GemmLayout {
    fn from(value: LayoutArg) -> GemmLayout {
        match value {
            LayoutArg::Aa => GemmLayout::AA,
            LayoutArg::Ta => GemmLayout::TA,
            LayoutArg::At => GemmLayout::AT,
            LayoutArg::Tt => GemmLayout::TT,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DtypeArg {
    F32,
    F64,
}

impl From<DtypeArg> for DataType {
    fn from(value: DtypeArg) -> DataType {
        match value {
            DtypeArg::F32 => DataType::F32,
            DtypeArg::F64 => DataType::F64,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatArg {
    All,
    Csr,
    CompressedCsr,
    Coo,
    Ell,
    SlicedEll,
    Hyb,
}

impl FormatArg {
    fn formats(self) -> Vec<SparseFormat> {
        match self {
            FormatArg::All => SparseFormat::ALL.to_vec(),
            FormatArg::Csr => vec![SparseFormat::Csr],
            FormatArg::CompressedCsr => vec![SparseFormat::CompressedCsr],
            FormatArg::Coo => vec![SparseFormat::Coo],
            FormatArg::Ell => vec![SparseFormat::Ell],
            FormatArg::SlicedEll => vec![SparseFormat::SlicedEll],
            FormatArg::Hyb => vec![SparseFormat::Hybrid],
        }
    }
}

/// Parses a `size:keep` round.
pub fn parse_round(value: &str) -> Result<RoundSpec, String> {
    let (size, keep) = value
        .split_once(':')
        .ok_or_else(|| format!("expected size:keep, got `{value}`"))?;
    let size = size
        .trim()
        .parse()
        .map_err(|err| format!("bad problem size `{size}`: {err}"))?;
    let keep = keep
        .trim()
        .parse()
        .map_err(|err| format!("bad keep count `{keep}`: {err}"))?;
    Ok(RoundSpec::new(size, keep))
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the host device and every wgpu adapter.
    Devices,
    /// Search the matrix-product parameter space on one device.
    Autotune {
        #[arg(long, value_enum, default_value = "cpu")]
        backend: BackendArg,
        /// Adapter index from `devices`; the default adapter when omitted.
        #[arg(long)]
        adapter: Option<usize>,
        #[arg(long, value_enum, default_value = "aa")]
        layout: LayoutArg,
        #[arg(long, value_enum, default_value = "f32")]
        dtype: DtypeArg,
        #[arg(long, value_delimiter = ',', value_parser = parse_round, default_value = "512:70,4096:20")]
        rounds: Vec<RoundSpec>,
        #[arg(long, default_value_t = 1)]
        warmup: usize,
        #[arg(long, default_value_t = 5)]
        runs: usize,
        /// Drop candidates slower than this many milliseconds per launch.
        #[arg(long)]
        cap_ms: Option<u64>,
        #[arg(long)]
        cache: Option<PathBuf>,
        #[arg(long)]
        dump: Option<PathBuf>,
    },
    /// Time sparse matrix-vector products across storage formats.
    Spmv {
        #[arg(long, default_value_t = 4096)]
        rows: usize,
        #[arg(long, default_value_t = 4096)]
        cols: usize,
        #[arg(long, default_value_t = 0.01)]
        density: f64,
        #[arg(long, value_enum, default_value = "all")]
        format: FormatArg,
        #[arg(long, default_value_t = 10)]
        runs: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Also run the single-precision CSR kernel on the default adapter.
        #[arg(long, default_value_t = false)]
        gpu: bool,
    },
}

pub fn run_cli(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    match cli.command {
        Command::Devices => list_devices(),
        Command::Autotune {
            backend,
            adapter,
            layout,
            dtype,
            rounds,
            warmup,
            runs,
            cap_ms,
            cache,
            dump,
        } => {
            let op = OperationDescriptor::new(layout.into(), dtype.into());
            let mut tuner = Tuner::default().with_runs(warmup, runs);
            if let Some(ms) = cap_ms {
                tuner = tuner.with_candidate_cap(Duration::from_millis(ms));
            }
            let mut backend: Box<dyn TuningBackend> = match backend {
                BackendArg::Cpu => Box::new(HostGemmBackend::new()),
                BackendArg::Gpu => Box::new(GpuGemmBackend::new(GpuContext::new(adapter)?)),
            };
            autotune(&tuner, backend.as_mut(), &op, &rounds, cache, dump)
        }
        Command::Spmv {
            rows,
            cols,
            density,
            format,
            runs,
            seed,
            gpu,
        } => spmv(rows, cols, density, &format.formats(), runs.max(1), seed, gpu),
    }
}

fn list_devices() -> Result<()> {
    let host = DeviceInfo::host();
    println!("host: {}", serde_json::to_string(&host)?);
    let adapters = enumerate_adapters();
    if adapters.is_empty() {
        println!("no wgpu adapters found");
    }
    for adapter in adapters {
        println!(
            "[{}] {} ({}, {}) f64={} timestamps={}",
            adapter.index,
            adapter.name,
            adapter.backend,
            adapter.device_type,
            adapter.has_f64,
            adapter.has_timestamps
        );
    }
    Ok(())
}

fn autotune(
    tuner: &Tuner,
    backend: &mut dyn TuningBackend,
    op: &OperationDescriptor,
    rounds: &[RoundSpec],
    cache: Option<PathBuf>,
    dump: Option<PathBuf>,
) -> Result<()> {
    let config = default_gemm_space()?;
    info!(
        device = %backend.device().key(),
        operation = %op,
        space = config.space_size(),
        rounds = rounds.len(),
        "starting autotune"
    );
    let outcome = tuner.run(backend, op, &config, rounds)?;

    println!(
        "device={} operation={} skipped={}",
        outcome.device.key(),
        outcome.operation,
        outcome.skipped
    );
    for report in &outcome.rounds {
        println!(
            "round {}: size={} candidates={} survivors={} best={:.3e}s",
            report.round, report.problem_size, report.candidates, report.survivors, report.best_seconds
        );
    }
    for (rank, (seconds, profile)) in outcome.results.iter().enumerate() {
        println!("{rank:>3}. {seconds:.3e}s {profile:?}");
    }

    if let Some(path) = cache {
        let mut profiles = ProfileCache::load_from_file(&path)
            .with_context(|| format!("reading profile cache {}", path.display()))?;
        if profiles.record(&outcome) {
            profiles.save_to_file(&path)?;
            info!(path = %path.display(), entries = profiles.len(), "profile cache updated");
        }
    }
    if let Some(path) = dump {
        fs::write(&path, serde_json::to_string_pretty(&outcome)?)?;
    }
    Ok(())
}

fn spmv(
    rows: usize,
    cols: usize,
    density: f64,
    formats: &[SparseFormat],
    runs: usize,
    seed: u64,
    gpu: bool,
) -> Result<()> {
    let mut rng = fastrand::Rng::with_seed(seed);
    let csr = random_csr::<f64>(rows, cols, density, &mut rng)?;
    let x: Vec<f64> = (0..cols).map(|_| rng.f64() * 2.0 - 1.0).collect();
    let expected = csr.to_dense().dot(&Array1::from_vec(x.clone()));
    let scale = expected.iter().fold(1.0f64, |acc, v| acc.max(v.abs()));
    info!(rows, cols, nnz = csr.nnz(), "generated random matrix");

    let ctx = Context::host();
    let x = DenseVector::from_vec(x);
    for &format in formats {
        let matrix = SparseMatrix::convert(&csr, format)?;
        let y = multiply(&ctx, &matrix, &x)?;
        let max_error = y
            .iter()
            .zip(expected.iter())
            .fold(0.0f64, |acc, (a, b)| acc.max((a - b).abs()));
        if max_error > 1e-12 * scale * cols.max(1) as f64 {
            bail!("{format} product differs from the dense reference by {max_error:e}");
        }

        let start = Instant::now();
        for _ in 0..runs {
            std::hint::black_box(multiply(&ctx, &matrix, &x)?);
        }
        let mean_ms = start.elapsed().as_secs_f64() * 1000.0 / runs as f64;
        println!("{format:>15}: mean_ms={mean_ms:.3} max_abs_error={max_error:.3e}");
    }

    if gpu {
        let device = GpuContext::new(None)?;
        let single = CsrMatrix::new(
            rows,
            cols,
            csr.row_ptr().to_vec(),
            csr.col_idx().to_vec(),
            csr.values().iter().map(|&v| v as f32).collect(),
        )?;
        let x32: Vec<f32> = x.iter().map(|v| v as f32).collect();
        let y = device.spmv(&single, &x32)?;
        let max_error = y
            .iter()
            .zip(expected.iter())
            .fold(0.0f64, |acc, (&a, &b)| acc.max((a as f64 - b).abs()));
        let start = Instant::now();
        for _ in 0..runs {
            std::hint::black_box(device.spmv(&single, &x32)?);
        }
        let mean_ms = start.elapsed().as_secs_f64() * 1000.0 / runs as f64;
        println!(
            "{:>15}: mean_ms={mean_ms:.3} max_abs_error={max_error:.3e}",
            format!("gpu-csr ({})", device.info().name)
        );
    }
    Ok(())
}
