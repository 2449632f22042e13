//! Turning concrete assignments into kernel profiles.

use crate::config::Assignment;
use crate::error::{TuneResult, TuningError};
use sparseforge_kernels::{DataType, DeviceInfo, GemmProfile};
use std::fmt::Debug;

pub trait ProfileBuilder {
    type Profile: Clone + Debug;

    /// Builds the profile for a complete assignment; a missing key is a
    /// configuration error.
    fn build(&self, assignment: &Assignment) -> TuneResult<Self::Profile>;

    /// Why `profile` cannot run on `device`, if it cannot.
    fn rejection(&self, device: &DeviceInfo, profile: &Self::Profile) -> Option<&'static str>;

    /// Unbuildable assignments count as invalid.
    fn is_invalid(&self, device: &DeviceInfo, assignment: &Assignment) -> bool {
        match self.build(assignment) {
            Ok(profile) => self.rejection(device, &profile).is_some(),
            Err(_) => true,
        }
    }
}

/// Builds [`GemmProfile`]s for one element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GemmProfileBuilder {
    dtype: DataType,
}

impl GemmProfileBuilder {
    pub fn new(dtype: DataType) -> Self {
        Self { dtype }
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }
}

fn lookup(assignment: &Assignment, name: &str) -> TuneResult<usize> {
    assignment
        .get(name)
        .copied()
        .ok_or_else(|| TuningError::UnknownParameter(name.to_string()))
}

impl ProfileBuilder for GemmProfileBuilder {
    type Profile = GemmProfile;

    fn build(&self, assignment: &Assignment) -> TuneResult<GemmProfile> {
        Ok(GemmProfile {
            ml: lookup(assignment, "ml")?,
            kl: lookup(assignment, "kl")?,
            nl: lookup(assignment, "nl")?,
            ms: lookup(assignment, "ms")?,
            ks: lookup(assignment, "ks")?,
            ns: lookup(assignment, "ns")?,
            lhs_local: lookup(assignment, "lhs_storage")? == 1,
            rhs_local: lookup(assignment, "rhs_storage")? == 1,
            vector: lookup(assignment, "vector")?,
            unroll: lookup(assignment, "unroll")?,
        })
    }

    fn rejection(&self, device: &DeviceInfo, profile: &GemmProfile) -> Option<&'static str> {
        profile.rejection(device, self.dtype.element_size_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(pairs: &[(&str, usize)]) -> Assignment {
        pairs.iter().map(|&(name, value)| (name.to_string(), value)).collect()
    }

    fn full() -> Assignment {
        assignment(&[
            ("ml", 64),
            ("kl", 32),
            ("nl", 64),
            ("ms", 4),
            ("ks", 4),
            ("ns", 4),
            ("lhs_storage", 1),
            ("rhs_storage", 0),
            ("vector", 1),
            ("unroll", 1),
        ])
    }

    #[test]
    fn builds_profile_from_assignment() {
        let profile = GemmProfileBuilder::new(DataType::F32).build(&full()).expect("profile");
        assert_eq!(profile, GemmProfile::default());
    }

    #[test]
    fn missing_key_is_a_configuration_error() {
        let mut partial = full();
        partial.remove("unroll");
        let builder = GemmProfileBuilder::new(DataType::F32);
        assert_eq!(
            builder.build(&partial),
            Err(TuningError::UnknownParameter("unroll".to_string()))
        );
        assert!(builder.is_invalid(&DeviceInfo::host(), &partial));
    }

    #[test]
    fn element_width_feeds_the_predicate() {
        let device = DeviceInfo {
            supports_f64: false,
            ..DeviceInfo::host()
        };
        assert!(!GemmProfileBuilder::new(DataType::F32).is_invalid(&device, &full()));
        assert!(GemmProfileBuilder::new(DataType::F64).is_invalid(&device, &full()));
    }
}
