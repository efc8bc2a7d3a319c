//! Fingerprint data model.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attrs::AttributeSet;
use crate::util::hash::{ContentHash, ObjectHash};

/// Current record format version.
pub const FINGERPRINT_RECORD_VERSION: u32 = 1;

/// State of one rerun-trigger path at fingerprint time.
///
/// A missing path is recorded explicitly so its later appearance counts
/// as a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "hash", rename_all = "lowercase")]
pub enum TriggerState {
  Present(ContentHash),
  Missing,
}

/// Everything a helper run depended on, hashed and resolved.
///
/// Two fingerprints compare equal exactly when re-running the helper would
/// be redundant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
  /// Checksum of the compiled helper artifact bytes.
  pub helper_checksum: ContentHash,
  /// Resolved environment overrides the helper would run with.
  pub env: BTreeMap<String, String>,
  /// Values of tracked environment variables; `None` when unset.
  pub tracked_env: BTreeMap<String, Option<String>>,
  /// Content state of each declared rerun-trigger path.
  pub files: BTreeMap<PathBuf, TriggerState>,
}

/// One persisted record: the fingerprint plus the attribute set it
/// produced, so a fresh unit never re-executes to recover its output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
  pub version: u32,
  pub unit: ObjectHash,
  pub fingerprint: Fingerprint,
  pub attrs: AttributeSet,
  /// Unix timestamp (seconds) when the record was written.
  pub recorded_at: u64,
}

impl FingerprintRecord {
  pub fn new(unit: ObjectHash, fingerprint: Fingerprint, attrs: AttributeSet) -> Self {
    let recorded_at = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map(|d| d.as_secs())
      .unwrap_or(0);
    Self {
      version: FINGERPRINT_RECORD_VERSION,
      unit,
      fingerprint,
      attrs,
      recorded_at,
    }
  }
}

/// Gate decision for one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
  /// Cached attributes may be reused; the helper does not run.
  Fresh,
  /// The helper must execute.
  Stale(StaleReason),
}

/// Why the gate decided to re-execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
  /// No record exists for this unit yet.
  FirstRun,
  /// The helper artifact bytes changed.
  HelperChanged,
  /// An environment override or tracked variable changed.
  EnvChanged(String),
  /// A rerun-trigger path changed, appeared, or disappeared.
  TriggerChanged(PathBuf),
}

impl std::fmt::Display for StaleReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      StaleReason::FirstRun => write!(f, "no previous run recorded"),
      StaleReason::HelperChanged => write!(f, "helper binary changed"),
      StaleReason::EnvChanged(key) => write!(f, "environment variable '{}' changed", key),
      StaleReason::TriggerChanged(path) => write!(f, "tracked path '{}' changed", path.display()),
    }
  }
}

/// Errors from fingerprint persistence.
#[derive(Debug, Error)]
pub enum FingerprintError {
  #[error("failed to create fingerprint directory: {0}")]
  CreateDir(#[source] std::io::Error),

  #[error("failed to read fingerprint record: {0}")]
  Read(#[source] std::io::Error),

  #[error("failed to write fingerprint record: {0}")]
  Write(#[source] std::io::Error),

  #[error("failed to parse fingerprint record: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize fingerprint record: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("unsupported fingerprint record version: {0}")]
  UnsupportedVersion(u32),
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::hash::hash_bytes;

  #[test]
  fn record_round_trips_through_json() {
    let record = FingerprintRecord::new(
      ObjectHash("abc123".to_string()),
      Fingerprint {
        helper_checksum: hash_bytes(b"helper"),
        env: BTreeMap::from([("CC".to_string(), "gcc".to_string())]),
        tracked_env: BTreeMap::from([("PKG_CONFIG_PATH".to_string(), None)]),
        files: BTreeMap::from([(PathBuf::from("src/gen.rs"), TriggerState::Missing)]),
      },
      AttributeSet::default(),
    );

    let json = serde_json::to_string(&record).unwrap();
    let back: FingerprintRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(record, back);
  }

  #[test]
  fn stale_reason_display_names_the_input() {
    let reason = StaleReason::EnvChanged("CC".to_string());
    assert_eq!(reason.to_string(), "environment variable 'CC' changed");

    let reason = StaleReason::TriggerChanged(PathBuf::from("a.h"));
    assert_eq!(reason.to_string(), "tracked path 'a.h' changed");
  }
}
