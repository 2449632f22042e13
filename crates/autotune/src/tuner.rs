//! Multi-round search for the fastest matrix-product profile.

use crate::builder::GemmProfileBuilder;
use crate::config::TuningConfig;
use crate::error::{TuneResult, TuningError};
use crate::timings::TimingResults;
use serde::{Deserialize, Serialize};
use sparseforge_kernels::{DataType, DeviceInfo, GemmLayout, GemmProfile};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The operation being tuned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub layout: GemmLayout,
    pub dtype: DataType,
}

impl OperationDescriptor {
    pub fn new(layout: GemmLayout, dtype: DataType) -> Self {
        Self { layout, dtype }
    }

    pub fn key(&self) -> String {
        format!("{}-{}", self.layout, self.dtype.name())
    }
}

impl fmt::Display for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// One search round: operands of `problem_size` and how many candidates
/// survive into the next round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSpec {
    pub problem_size: usize,
    pub keep: usize,
}

impl RoundSpec {
    pub const fn new(problem_size: usize, keep: usize) -> Self {
        Self { problem_size, keep }
    }

    /// A broad pass on small operands, then a narrow pass on large ones.
    pub fn default_rounds() -> Vec<RoundSpec> {
        vec![RoundSpec::new(512, 70), RoundSpec::new(4096, 20)]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunerOptions {
    pub warmup: usize,
    pub runs: usize,
    /// Candidates whose average launch time exceeds this are dropped.
    pub candidate_cap: Option<Duration>,
}

impl Default for TunerOptions {
    fn default() -> Self {
        Self {
            warmup: 1,
            runs: 5,
            candidate_cap: None,
        }
    }
}

/// Realizes and times matrix-product kernels on one device.
pub trait TuningBackend {
    fn device(&self) -> &DeviceInfo;

    /// Allocates fresh random operands for `op` at `problem_size`.
    fn prepare(&mut self, op: &OperationDescriptor, problem_size: usize) -> TuneResult<()>;

    /// Builds (or reuses) the kernel for `profile` and enqueues one launch.
    fn launch(&mut self, op: &OperationDescriptor, profile: &GemmProfile) -> TuneResult<()>;

    /// Blocks until all enqueued work has completed.
    fn finish(&mut self) -> TuneResult<()>;

    /// Wall time of one launch, drained on both sides.
    fn time_launch(&mut self, op: &OperationDescriptor, profile: &GemmProfile) -> TuneResult<Duration> {
        self.finish()?;
        let start = Instant::now();
        self.launch(op, profile)?;
        self.finish()?;
        Ok(start.elapsed())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Idle,
    RoundSetup { round: usize },
    Benchmarking { round: usize, candidates: usize },
    Ranking { round: usize },
    Done,
}

impl fmt::Display for SearchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchState::Idle => write!(f, "idle"),
            SearchState::RoundSetup { round } => write!(f, "round-setup({round})"),
            SearchState::Benchmarking { round, candidates } => {
                write!(f, "benchmarking({round}, {candidates} candidates)")
            }
            SearchState::Ranking { round } => write!(f, "ranking({round})"),
            SearchState::Done => write!(f, "done"),
        }
    }
}

fn transition(state: &mut SearchState, next: SearchState) {
    info!(from = %state, to = %next, "search state");
    *state = next;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundReport {
    pub round: usize,
    pub problem_size: usize,
    pub candidates: usize,
    pub survivors: usize,
    pub best_seconds: f64,
}

/// Result of a complete search: the final round's ranked survivors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuneOutcome {
    pub device: DeviceInfo,
    pub operation: OperationDescriptor,
    pub results: TimingResults<GemmProfile>,
    pub rounds: Vec<RoundReport>,
    pub skipped: usize,
}

impl TuneOutcome {
    pub fn best(&self) -> Option<(f64, &GemmProfile)> {
        self.results.best()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Tuner {
    options: TunerOptions,
}

impl Tuner {
    pub fn new(options: TunerOptions) -> Self {
        Self { options }
    }

    pub fn with_runs(mut self, warmup: usize, runs: usize) -> Self {
        self.options.warmup = warmup;
        self.options.runs = runs.max(1);
        self
    }

    pub fn with_candidate_cap(mut self, cap: Duration) -> Self {
        self.options.candidate_cap = Some(cap);
        self
    }

    pub fn options(&self) -> &TunerOptions {
        &self.options
    }

    /// The valid profiles of `config` for the backend's device, plus the
    /// number of points the validity predicate rejected.
    pub fn candidates<B: TuningBackend + ?Sized>(
        &self,
        backend: &B,
        op: &OperationDescriptor,
        config: &TuningConfig,
    ) -> TuneResult<(Vec<GemmProfile>, usize)> {
        let builder = GemmProfileBuilder::new(op.dtype);
        let (profiles, skipped) = config.profiles(&builder, backend.device())?;
        info!(
            operation = %op,
            space = config.space_size(),
            valid = profiles.len(),
            skipped,
            "enumerated tuning space"
        );
        Ok((profiles, skipped))
    }

    /// Times every valid profile of `config` on fresh operands.
    pub fn benchmark_space<B: TuningBackend + ?Sized>(
        &self,
        backend: &mut B,
        op: &OperationDescriptor,
        config: &TuningConfig,
        problem_size: usize,
    ) -> TuneResult<TimingResults<GemmProfile>> {
        let (candidates, _) = self.candidates(backend, op, config)?;
        self.benchmark_profiles(backend, op, problem_size, &candidates)
    }

    /// Times each of `profiles` on fresh operands. Candidates that fail to
    /// build or launch, or exceed the time cap, are left out.
    pub fn benchmark_profiles<B: TuningBackend + ?Sized>(
        &self,
        backend: &mut B,
        op: &OperationDescriptor,
        problem_size: usize,
        profiles: &[GemmProfile],
    ) -> TuneResult<TimingResults<GemmProfile>> {
        backend.prepare(op, problem_size)?;
        let mut results = TimingResults::new();
        for profile in profiles {
            match self.measure(backend, op, profile) {
                Ok(seconds) => {
                    if let Some(cap) = self.options.candidate_cap {
                        if seconds > cap.as_secs_f64() {
                            warn!(?profile, seconds, cap = cap.as_secs_f64(), "dropping slow candidate");
                            continue;
                        }
                    }
                    debug!(?profile, seconds, "measured candidate");
                    results.insert(seconds, *profile);
                }
                Err(err) => {
                    warn!(?profile, error = %err, "dropping failed candidate");
                }
            }
        }
        Ok(results)
    }

    fn measure<B: TuningBackend + ?Sized>(
        &self,
        backend: &mut B,
        op: &OperationDescriptor,
        profile: &GemmProfile,
    ) -> TuneResult<f64> {
        for _ in 0..self.options.warmup {
            backend.launch(op, profile)?;
        }
        backend.finish()?;
        let runs = self.options.runs.max(1);
        let mut total = Duration::default();
        for _ in 0..runs {
            total += backend.time_launch(op, profile)?;
        }
        Ok(total.as_secs_f64() / runs as f64)
    }

    /// Runs `rounds` in order. Round 0 benchmarks the whole valid space, each
    /// later round only the previous round's survivors.
    pub fn run<B: TuningBackend + ?Sized>(
        &self,
        backend: &mut B,
        op: &OperationDescriptor,
        config: &TuningConfig,
        rounds: &[RoundSpec],
    ) -> TuneResult<TuneOutcome> {
        if rounds.is_empty() {
            return Err(TuningError::invalid("rounds", "at least one round is required"));
        }
        if let Some(round) = rounds.iter().position(|plan| plan.keep == 0) {
            return Err(TuningError::invalid(
                "keep",
                format!("round {round} must keep at least one candidate"),
            ));
        }

        let mut state = SearchState::Idle;
        let (mut candidates, skipped) = self.candidates(backend, op, config)?;
        let mut reports = Vec::with_capacity(rounds.len());
        let mut results = TimingResults::new();

        for (round, plan) in rounds.iter().enumerate() {
            transition(&mut state, SearchState::RoundSetup { round });
            results.clear();

            transition(
                &mut state,
                SearchState::Benchmarking {
                    round,
                    candidates: candidates.len(),
                },
            );
            results = self.benchmark_profiles(backend, op, plan.problem_size, &candidates)?;

            transition(&mut state, SearchState::Ranking { round });
            let Some((best_seconds, best)) = results.best() else {
                return Err(TuningError::NoUsableConfiguration { round });
            };
            info!(
                round,
                problem_size = plan.problem_size,
                measured = results.len(),
                best_seconds,
                best = ?best,
                "round ranked"
            );
            reports.push(RoundReport {
                round,
                problem_size: plan.problem_size,
                candidates: candidates.len(),
                survivors: results.len().min(plan.keep),
                best_seconds,
            });
            results.truncate(plan.keep);
            candidates = results.profiles().copied().collect();
        }

        transition(&mut state, SearchState::Done);
        Ok(TuneOutcome {
            device: backend.device().clone(),
            operation: *op,
            results,
            rounds: reports,
            skipped,
        })
    }
}
