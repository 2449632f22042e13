//! Persisted tuning winners, one per device and operation.

use crate::tuner::{OperationDescriptor, TuneOutcome};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use sparseforge_kernels::{DeviceInfo, GemmProfile};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedProfile {
    pub profile: GemmProfile,
    pub seconds: f64,
    pub problem_size: usize,
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileCache {
    profiles: BTreeMap<String, CachedProfile>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self {
            profiles: BTreeMap::new(),
        }
    }

    pub fn get(&self, device: &DeviceInfo, op: &OperationDescriptor) -> Option<&CachedProfile> {
        self.profiles.get(&cache_key(device, op))
    }

    pub fn insert(&mut self, device: &DeviceInfo, op: &OperationDescriptor, entry: CachedProfile) {
        self.profiles.insert(cache_key(device, op), entry);
    }

    /// Stores the winner of `outcome`; returns `false` when it has none.
    pub fn record(&mut self, outcome: &TuneOutcome) -> bool {
        let Some((seconds, profile)) = outcome.best() else {
            return false;
        };
        let problem_size = outcome.rounds.last().map_or(0, |round| round.problem_size);
        self.insert(
            &outcome.device,
            &outcome.operation,
            CachedProfile {
                profile: *profile,
                seconds,
                problem_size,
            },
        );
        true
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = fs::read(path)?;
        let cache = serde_json::from_slice(&data)?;
        Ok(cache)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let blob = serde_json::to_vec_pretty(self)?;
        fs::write(path, blob)?;
        Ok(())
    }
}

fn cache_key(device: &DeviceInfo, op: &OperationDescriptor) -> String {
    format!("{}|{}", device.key(), op.key())
}
