//! Types for helper compilation and execution.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::directive::ParseError;
use crate::util::hash::ContentHash;

/// Everything needed to compile one helper executable.
///
/// Every recognized option is an explicit typed field; unknown keys are
/// rejected at decode time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompileSpec {
  /// Helper source files. The first entry is the crate root handed to the
  /// compiler; the rest are pulled in from there and tracked as inputs.
  pub sources: Vec<PathBuf>,

  /// Feature names, surfaced to the helper as `--cfg feature="..."`.
  #[serde(default)]
  pub features: Vec<String>,

  /// Environment overrides for the compiler invocation.
  #[serde(default)]
  pub env: BTreeMap<String, String>,

  /// Target triple, if cross-compiling the helper.
  #[serde(default)]
  pub target: Option<String>,

  /// Optimization level passed to the compiler ("0" if unset).
  #[serde(default = "default_opt_level")]
  pub opt_level: String,
}

fn default_opt_level() -> String {
  "0".to_string()
}

/// A compiled helper: where it is and what its bytes hash to.
///
/// The checksum feeds the change-detection fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperArtifact {
  pub path: PathBuf,
  pub checksum: ContentHash,
}

/// Informational variables injected into every helper environment.
#[derive(Debug, Clone)]
pub struct HelperEnv {
  pub pkg_name: String,
  pub pkg_version: String,
  pub target: String,
  pub out_dir: PathBuf,
  pub opt_level: String,
}

/// Captured outcome of one successful helper execution.
///
/// Owned by the executor for the duration of one invocation; consumed by
/// the directive parser and discarded.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
  pub exit_code: i32,
  pub stdout_lines: Vec<String>,
  pub stderr_lines: Vec<String>,
  pub duration: Duration,
}

impl ExecutionResult {
  /// The stdout capture as one string, for the directive parser.
  pub fn stdout(&self) -> String {
    self.stdout_lines.join("\n")
  }
}

/// Errors from the helper lifecycle.
///
/// None of these are retried: execution is assumed deterministic given
/// identical inputs, so the remediation is always a code or environment fix.
#[derive(Debug, Error)]
pub enum ScriptError {
  /// The helper failed to build. Compiler diagnostics preserved verbatim.
  #[error("helper failed to compile: {diagnostics}")]
  Compile { diagnostics: String },

  /// The helper ran but exited non-zero. Stderr preserved verbatim.
  #[error("helper exited with code {exit_code:?}")]
  Execution { exit_code: Option<i32>, stderr: String },

  /// The helper exceeded its time budget and was killed.
  #[error("helper timed out after {limit:?}")]
  Timeout { limit: Duration },

  /// The helper emitted a malformed recognized directive.
  #[error(transparent)]
  Parse(#[from] ParseError),

  /// I/O error while setting up or tearing down an invocation.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}
