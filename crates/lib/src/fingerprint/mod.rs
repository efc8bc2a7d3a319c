//! Change detection for helper executions.
//!
//! A `Fingerprint` captures everything a previous run depended on: the
//! helper artifact checksum, the resolved environment overrides, the values
//! of tracked environment variables, and the content hashes of declared
//! rerun-trigger paths. It is recomputed every run and compared against the
//! persisted record to decide whether the helper must execute again.

pub mod store;
pub mod types;

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::debug;

use crate::attrs::RerunTriggerSet;
use crate::script::HelperArtifact;

pub use store::FingerprintStore;
pub use types::{Fingerprint, FingerprintError, FingerprintRecord, Freshness, StaleReason, TriggerState};

/// Compute the current fingerprint for a unit.
///
/// Trigger paths that point at directories are hashed deterministically
/// over their contents; missing paths are recorded as absent (a path that
/// later appears is itself a change).
pub fn compute_fingerprint(
  artifact: &HelperArtifact,
  env_overrides: &BTreeMap<String, String>,
  triggers: &RerunTriggerSet,
) -> Fingerprint {
  let mut files = BTreeMap::new();
  for path in &triggers.paths {
    files.insert(path.clone(), trigger_state(path));
  }

  let mut tracked_env = BTreeMap::new();
  for key in &triggers.env_keys {
    tracked_env.insert(key.clone(), std::env::var(key).ok());
  }

  Fingerprint {
    helper_checksum: artifact.checksum.clone(),
    env: env_overrides.clone(),
    tracked_env,
    files,
  }
}

fn trigger_state(path: &PathBuf) -> TriggerState {
  if path.is_dir() {
    match crate::util::hash::hash_directory(path, &[]) {
      Ok(hash) => TriggerState::Present(hash),
      Err(_) => TriggerState::Missing,
    }
  } else if path.is_file() {
    match crate::util::hash::hash_file(path) {
      Ok(hash) => TriggerState::Present(hash),
      Err(_) => TriggerState::Missing,
    }
  } else {
    TriggerState::Missing
  }
}

/// Decide whether a cached run can be reused.
///
/// No stored record means the first run: always `Stale`. Otherwise the
/// first tracked input that differs names the reason; identical inputs are
/// `Fresh`.
pub fn evaluate(stored: Option<&Fingerprint>, current: &Fingerprint) -> Freshness {
  let Some(stored) = stored else {
    return Freshness::Stale(StaleReason::FirstRun);
  };

  if stored.helper_checksum != current.helper_checksum {
    return Freshness::Stale(StaleReason::HelperChanged);
  }

  if stored.env != current.env {
    let key = first_map_difference(&stored.env, &current.env);
    return Freshness::Stale(StaleReason::EnvChanged(key));
  }

  if stored.tracked_env != current.tracked_env {
    let key = first_map_difference(&stored.tracked_env, &current.tracked_env);
    return Freshness::Stale(StaleReason::EnvChanged(key));
  }

  if stored.files != current.files {
    let path = first_map_difference(&stored.files, &current.files);
    return Freshness::Stale(StaleReason::TriggerChanged(path));
  }

  debug!("fingerprint unchanged");
  Freshness::Fresh
}

/// First key whose value differs (or exists on only one side) between two
/// ordered maps. Both maps differ when called, so a key always exists.
fn first_map_difference<K: Ord + Clone, V: PartialEq>(a: &BTreeMap<K, V>, b: &BTreeMap<K, V>) -> K {
  for (key, value) in a {
    match b.get(key) {
      Some(other) if other == value => continue,
      _ => return key.clone(),
    }
  }
  b.keys()
    .find(|key| !a.contains_key(*key))
    .cloned()
    .expect("maps compared unequal")
}
