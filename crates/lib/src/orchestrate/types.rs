//! Orchestration types.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::attrs::AttributeSet;
use crate::consts::DEFAULT_TIMEOUT_SECS;
use crate::fingerprint::{FingerprintError, Freshness};
use crate::script::{HelperCompiler, RustcCompiler, ScriptError};
use crate::util::hash::{HashError, ObjectHash};

/// Configuration for a unit orchestration run.
#[derive(Clone)]
pub struct OrchestrateConfig {
  /// Maximum number of units executing concurrently.
  pub parallelism: usize,

  /// Wall-clock budget for one helper execution.
  pub timeout: Duration,

  /// Root for fingerprint records and per-unit working directories.
  pub state_dir: PathBuf,

  /// Target triple assumed for units that do not declare one.
  pub host_target: String,

  /// The host-build-system seam producing helper executables.
  pub compiler: Arc<dyn HelperCompiler>,
}

impl OrchestrateConfig {
  pub fn new(state_dir: PathBuf) -> Self {
    Self {
      parallelism: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
      timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
      state_dir,
      host_target: default_host_target(),
      compiler: Arc::new(RustcCompiler::new()),
    }
  }
}

impl std::fmt::Debug for OrchestrateConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("OrchestrateConfig")
      .field("parallelism", &self.parallelism)
      .field("timeout", &self.timeout)
      .field("state_dir", &self.state_dir)
      .field("host_target", &self.host_target)
      .finish_non_exhaustive()
  }
}

/// Best-effort host triple when a unit does not declare a target.
pub fn default_host_target() -> String {
  format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS)
}

/// Outcome of one unit that ran (or was reused) successfully.
#[derive(Debug, Clone)]
pub struct UnitResult {
  pub unit: ObjectHash,
  pub name: String,

  /// The merged attribute set the unit's compilation step consumes:
  /// own directives plus re-exports from `links` dependencies.
  pub attrs: AttributeSet,

  /// The set this unit re-exports to dependents. `Some` only when the
  /// unit declared a `links` marker.
  pub exported: Option<AttributeSet>,

  /// Whether the helper actually ran or the cached set was reused.
  pub freshness: Freshness,

  pub duration: Duration,
}

/// Result of orchestrating a unit manifest.
///
/// At most one unit fails; the first failure stops new waves from being
/// scheduled, and everything downstream of the failure lands in `skipped`.
#[derive(Debug, Default)]
pub struct OrchestrationResult {
  /// Units that produced an attribute set, keyed by identity hash.
  pub completed: HashMap<ObjectHash, UnitResult>,

  /// The unit that failed, if any, with its error.
  pub failed: Option<(ObjectHash, OrchestrateError)>,

  /// Units skipped because a dependency failed, mapped to that dependency.
  pub skipped: HashMap<ObjectHash, ObjectHash>,
}

impl OrchestrationResult {
  pub fn is_success(&self) -> bool {
    self.failed.is_none() && self.skipped.is_empty()
  }

  pub fn total(&self) -> usize {
    self.completed.len() + self.skipped.len() + usize::from(self.failed.is_some())
  }
}

/// Errors from unit graph construction and orchestration.
#[derive(Debug, Error)]
pub enum OrchestrateError {
  #[error("dependency cycle detected in unit graph")]
  CycleDetected,

  #[error("duplicate unit name: {0}")]
  DuplicateUnit(String),

  #[error("unit '{unit}' depends on unknown unit '{dep}'")]
  UnknownDependency { unit: String, dep: String },

  #[error("unit not found: {0}")]
  UnitNotFound(ObjectHash),

  #[error("failed to hash unit definition: {0}")]
  Hash(#[from] HashError),

  #[error(transparent)]
  Script(#[from] ScriptError),

  #[error(transparent)]
  Fingerprint(#[from] FingerprintError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}
