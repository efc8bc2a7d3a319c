//! The helper stdout line protocol.
//!
//! A helper program talks back to the orchestrator by printing one directive
//! per line. Each directive has exactly one canonical line form, so parsing
//! and re-serializing a valid sequence reproduces it byte-for-byte. Lines
//! that match no recognized prefix are ordinary log output and are never an
//! error.

pub mod parse;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use parse::{ParseError, ParsedOutput, parse_line, parse_output};

/// How a library should be linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
  Static,
  Dylib,
  Framework,
}

impl LinkKind {
  pub fn as_str(self) -> &'static str {
    match self {
      LinkKind::Static => "static",
      LinkKind::Dylib => "dylib",
      LinkKind::Framework => "framework",
    }
  }
}

impl std::fmt::Display for LinkKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl std::str::FromStr for LinkKind {
  type Err = ();

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "static" => Ok(LinkKind::Static),
      "dylib" => Ok(LinkKind::Dylib),
      "framework" => Ok(LinkKind::Framework),
      _ => Err(()),
    }
  }
}

/// One structured instruction emitted by a helper.
///
/// Produced by parsing one stdout line; immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "directive", rename_all = "kebab-case")]
pub enum BuildDirective {
  /// An opaque flag passed through to the compiler invocation.
  CompilerFlag { value: String },

  /// A library search path (`-L`).
  LinkSearchPath { path: PathBuf },

  /// A library to link (`-l`). `kind: None` means the linker default.
  LinkLibrary { name: String, kind: Option<LinkKind> },

  /// An environment variable set for the compilation step.
  EnvVar { key: String, value: String },

  /// A file or directory whose change invalidates the cached run.
  RerunIfChanged { path: PathBuf },

  /// An environment variable whose change invalidates the cached run.
  RerunIfEnvChanged { key: String },

  /// A warning surfaced to the user after the run.
  Warning { text: String },

  /// Key-value metadata re-exported to dependent units.
  Metadata { key: String, value: String },
}

impl std::fmt::Display for BuildDirective {
  /// Serializes the directive back to its canonical line form.
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      BuildDirective::CompilerFlag { value } => write!(f, "flag:{}", value),
      BuildDirective::LinkSearchPath { path } => write!(f, "flag:-L{}", path.display()),
      BuildDirective::LinkLibrary { name, kind: None } => write!(f, "flag:-l{}", name),
      BuildDirective::LinkLibrary {
        name,
        kind: Some(kind),
      } => write!(f, "link-lib:{}={}", kind, name),
      BuildDirective::EnvVar { key, value } => write!(f, "env:{}={}", key, value),
      BuildDirective::RerunIfChanged { path } => write!(f, "rerun-if-changed:{}", path.display()),
      BuildDirective::RerunIfEnvChanged { key } => write!(f, "rerun-if-env-changed:{}", key),
      BuildDirective::Warning { text } => write!(f, "warning:{}", text),
      BuildDirective::Metadata { key, value } => write!(f, "metadata:{}={}", key, value),
    }
  }
}
