//! Tuning configurations: ordered parameter sets and their Cartesian product.

use crate::builder::ProfileBuilder;
use crate::error::TuneResult;
use crate::param::{StepFn, TuningParam};
use sparseforge_kernels::DeviceInfo;
use std::collections::BTreeMap;
use tracing::debug;

/// Concrete value for every parameter of a configuration, keyed by name.
pub type Assignment = BTreeMap<String, usize>;

#[derive(Debug, Clone, Default)]
pub struct TuningConfig {
    params: BTreeMap<String, TuningParam>,
}

impl TuningConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `param`, replacing any parameter of the same name.
    pub fn add(&mut self, param: TuningParam) -> &mut Self {
        self.params.insert(param.name().to_string(), param);
        self
    }

    pub fn with(mut self, param: TuningParam) -> Self {
        self.add(param);
        self
    }

    pub fn param(&self, name: &str) -> Option<&TuningParam> {
        self.params.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Number of points in the unfiltered product.
    pub fn space_size(&self) -> usize {
        if self.params.is_empty() {
            return 0;
        }
        self.params.values().map(|param| param.values().len()).product()
    }

    /// Every point of the product in name order, the last name varying
    /// fastest. An empty configuration has no points.
    pub fn assignments(&self) -> Vec<Assignment> {
        let mut odometer: Vec<TuningParam> = self.params.values().cloned().collect();
        if odometer.is_empty() {
            return Vec::new();
        }
        odometer.iter_mut().for_each(TuningParam::reset);

        let mut points: Vec<Assignment> = Vec::with_capacity(self.space_size());
        loop {
            points.push(
                odometer
                    .iter()
                    .map(|param| (param.name().to_string(), param.value()))
                    .collect(),
            );
            // carry from the last digit towards the first
            let mut digit = odometer.len();
            loop {
                if digit == 0 {
                    return points;
                }
                digit -= 1;
                if odometer[digit].advance() {
                    break;
                }
            }
        }
    }

    /// Builds every point of the product and keeps those the builder accepts
    /// for `device`. Returns the kept profiles and the number skipped.
    pub fn profiles<B: ProfileBuilder>(
        &self,
        builder: &B,
        device: &DeviceInfo,
    ) -> TuneResult<(Vec<B::Profile>, usize)> {
        let mut kept = Vec::new();
        let mut skipped = 0;
        for assignment in self.assignments() {
            let profile = builder.build(&assignment)?;
            match builder.rejection(device, &profile) {
                Some(reason) => {
                    debug!(?assignment, reason, "skipping invalid configuration");
                    skipped += 1;
                }
                None => kept.push(profile),
            }
        }
        Ok((kept, skipped))
    }
}

/// The matrix-product search space used for production tuning runs.
pub fn default_gemm_space() -> TuneResult<TuningConfig> {
    let mut config = TuningConfig::new();
    for name in ["ml", "kl", "nl"] {
        config.add(TuningParam::new(name, 16, 256, StepFn::MulByTwo)?);
    }
    for name in ["ms", "ks", "ns"] {
        config.add(TuningParam::new(name, 2, 16, StepFn::MulByTwo)?);
    }
    config
        .add(TuningParam::new("vector", 1, 4, StepFn::MulByTwo)?)
        .add(TuningParam::new("lhs_storage", 1, 1, StepFn::MulByTwo)?)
        .add(TuningParam::new("rhs_storage", 0, 0, StepFn::MulByTwo)?)
        .add(TuningParam::new("unroll", 1, 1, StepFn::MulByTwo)?);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GemmProfileBuilder;
    use crate::error::TuningError;
    use sparseforge_kernels::DataType;

    #[test]
    fn odometer_varies_last_name_fastest() {
        let config = TuningConfig::new()
            .with(TuningParam::new("b", 1, 2, StepFn::AddOne).expect("b"))
            .with(TuningParam::new("a", 10, 20, StepFn::Custom(|v| v + 10)).expect("a"));
        let points: Vec<(usize, usize)> = config
            .assignments()
            .iter()
            .map(|point| (point["a"], point["b"]))
            .collect();
        assert_eq!(points, vec![(10, 1), (10, 2), (20, 1), (20, 2)]);
        assert_eq!(config.space_size(), 4);
    }

    #[test]
    fn empty_configuration_has_no_points() {
        assert!(TuningConfig::new().assignments().is_empty());
    }

    #[test]
    fn default_space_filters_invalid_points() {
        let config = default_gemm_space().expect("space");
        assert_eq!(config.space_size(), 5 * 5 * 5 * 4 * 4 * 4 * 3);
        let builder = GemmProfileBuilder::new(DataType::F32);
        let (kept, skipped) = config
            .profiles(&builder, &DeviceInfo::host())
            .expect("profiles");
        assert_eq!(kept.len() + skipped, config.space_size());
        assert!(!kept.is_empty());
        assert!(skipped > 0);
        assert!(kept.iter().all(|profile| profile.lhs_local && !profile.rhs_local));
    }

    #[test]
    fn missing_parameter_surfaces_as_configuration_error() {
        let config = TuningConfig::new()
            .with(TuningParam::new("ml", 16, 32, StepFn::MulByTwo).expect("ml"))
            .with(TuningParam::new("kl", 16, 16, StepFn::MulByTwo).expect("kl"));
        let builder = GemmProfileBuilder::new(DataType::F32);
        let err = config.profiles(&builder, &DeviceInfo::host()).unwrap_err();
        assert_eq!(err, TuningError::UnknownParameter("nl".to_string()));
    }
}
