use sparseforge_autotune::{
    OperationDescriptor, RoundSpec, StepFn, Tuner, TuningBackend, TuningConfig, TuningError,
    TuningParam, TuneResult,
};
use sparseforge_kernels::{DataType, DeviceInfo, GemmLayout, GemmProfile};
use std::collections::BTreeSet;
use std::time::Duration;

/// Deterministic backend: a profile's time is its distance from a fixed
/// optimum, scaled by the problem size.
struct MockBackend {
    device: DeviceInfo,
    problem_size: usize,
    prepared: Vec<usize>,
    timed: Vec<(usize, GemmProfile)>,
    fails: fn(&GemmProfile) -> bool,
}

impl MockBackend {
    fn new(fails: fn(&GemmProfile) -> bool) -> Self {
        Self {
            device: DeviceInfo::host(),
            problem_size: 0,
            prepared: Vec::new(),
            timed: Vec::new(),
            fails,
        }
    }

    fn cost(profile: &GemmProfile) -> u64 {
        let distance = |value: usize, target: usize| value.abs_diff(target) as u64;
        distance(profile.ml, 32) * 1000
            + distance(profile.nl, 64) * 100
            + distance(profile.kl, 16) * 10
            + distance(profile.ms, 4) * 3
            + distance(profile.ns, 2) * 5
            + distance(profile.vector, 2)
    }
}

impl TuningBackend for MockBackend {
    fn device(&self) -> &DeviceInfo {
        &self.device
    }

    fn prepare(&mut self, _op: &OperationDescriptor, problem_size: usize) -> TuneResult<()> {
        self.problem_size = problem_size;
        self.prepared.push(problem_size);
        Ok(())
    }

    fn launch(&mut self, _op: &OperationDescriptor, profile: &GemmProfile) -> TuneResult<()> {
        if (self.fails)(profile) {
            return Err(TuningError::Backend("kernel failed to build".to_string()));
        }
        Ok(())
    }

    fn finish(&mut self) -> TuneResult<()> {
        Ok(())
    }

    fn time_launch(&mut self, op: &OperationDescriptor, profile: &GemmProfile) -> TuneResult<Duration> {
        self.launch(op, profile)?;
        self.timed.push((self.problem_size, *profile));
        Ok(Duration::from_nanos(
            (Self::cost(profile) + 1) * self.problem_size as u64,
        ))
    }
}

fn small_space() -> TuneResult<TuningConfig> {
    let mut config = TuningConfig::new();
    config
        .add(TuningParam::new("ml", 16, 64, StepFn::MulByTwo)?)
        .add(TuningParam::new("nl", 16, 64, StepFn::MulByTwo)?)
        .add(TuningParam::new("kl", 16, 32, StepFn::MulByTwo)?)
        .add(TuningParam::new("ms", 2, 4, StepFn::MulByTwo)?)
        .add(TuningParam::new("ns", 2, 4, StepFn::MulByTwo)?)
        .add(TuningParam::new("ks", 2, 2, StepFn::MulByTwo)?)
        .add(TuningParam::new("vector", 1, 2, StepFn::MulByTwo)?)
        .add(TuningParam::new("lhs_storage", 1, 1, StepFn::AddOne)?)
        .add(TuningParam::new("rhs_storage", 0, 0, StepFn::AddOne)?)
        .add(TuningParam::new("unroll", 1, 1, StepFn::AddOne)?);
    Ok(config)
}

fn op() -> OperationDescriptor {
    OperationDescriptor::new(GemmLayout::AA, DataType::F32)
}

#[test]
fn two_rounds_find_the_global_minimum() -> TuneResult<()> {
    let config = small_space()?;
    let mut backend = MockBackend::new(|_| false);
    let tuner = Tuner::default().with_runs(0, 2);
    let rounds = [RoundSpec::new(64, 5), RoundSpec::new(256, 2)];
    let outcome = tuner.run(&mut backend, &op(), &config, &rounds)?;

    let (seconds, best) = outcome.best().expect("winner");
    assert_eq!((best.ml, best.nl, best.kl, best.ms, best.ns, best.vector), (32, 64, 16, 4, 2, 2));
    assert!((seconds - 256e-9).abs() < 1e-12);
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(backend.prepared, vec![64, 256]);

    // the second round only revisits the first round's survivors
    let second: BTreeSet<GemmProfile> = backend
        .timed
        .iter()
        .filter(|(size, _)| *size == 256)
        .map(|(_, profile)| *profile)
        .collect();
    assert_eq!(second.len(), 5);
    assert_eq!(outcome.rounds[0].survivors, 5);
    assert_eq!(outcome.rounds[1].candidates, 5);
    Ok(())
}

#[test]
fn failing_candidates_are_dropped() -> TuneResult<()> {
    let config = small_space()?;
    let mut backend = MockBackend::new(|profile| profile.ml == 32);
    let tuner = Tuner::default().with_runs(1, 1);
    let outcome = tuner.run(&mut backend, &op(), &config, &[RoundSpec::new(32, 3)])?;
    assert_eq!(outcome.results.len(), 3);
    assert!(outcome.results.profiles().all(|profile| profile.ml != 32));
    Ok(())
}

#[test]
fn round_without_survivors_is_an_error() -> TuneResult<()> {
    let config = small_space()?;
    let mut backend = MockBackend::new(|_| true);
    let err = Tuner::default()
        .run(&mut backend, &op(), &config, &RoundSpec::default_rounds())
        .unwrap_err();
    assert_eq!(err, TuningError::NoUsableConfiguration { round: 0 });
    Ok(())
}

#[test]
fn candidate_cap_drops_slow_profiles() -> TuneResult<()> {
    let config = small_space()?;
    let mut backend = MockBackend::new(|_| false);
    let tuner = Tuner::default()
        .with_runs(0, 1)
        .with_candidate_cap(Duration::from_nanos(100));
    let results = tuner.benchmark_space(&mut backend, &op(), &config, 10)?;
    assert!(!results.is_empty());
    assert!(results.iter().all(|(seconds, _)| seconds <= 100e-9));
    Ok(())
}

#[test]
fn benchmark_profiles_ranks_the_given_set() -> TuneResult<()> {
    let mut backend = MockBackend::new(|_| false);
    let slow = GemmProfile {
        ml: 16,
        ..GemmProfile::default()
    };
    let fast = GemmProfile {
        ml: 32,
        ..GemmProfile::default()
    };
    let results = Tuner::default().benchmark_profiles(&mut backend, &op(), 8, &[slow, fast])?;
    let order: Vec<GemmProfile> = results.profiles().copied().collect();
    assert_eq!(order, vec![fast, slow]);
    Ok(())
}

#[test]
fn zero_keep_is_rejected_before_benchmarking() -> TuneResult<()> {
    let config = small_space()?;
    let mut backend = MockBackend::new(|_| false);
    let tuner = Tuner::default();

    let err = tuner
        .run(&mut backend, &op(), &config, &[RoundSpec::new(64, 0)])
        .unwrap_err();
    assert!(matches!(err, TuningError::InvalidParameter { ref name, .. } if name == "keep"));

    let err = tuner
        .run(&mut backend, &op(), &config, &[RoundSpec::new(64, 4), RoundSpec::new(128, 0)])
        .unwrap_err();
    assert!(matches!(err, TuningError::InvalidParameter { ref name, .. } if name == "keep"));
    assert!(backend.prepared.is_empty());
    assert!(backend.timed.is_empty());
    Ok(())
}
