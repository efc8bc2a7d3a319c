//! Helper compilation.
//!
//! `HelperCompiler` is the seam to the host build system: anything that can
//! turn a `CompileSpec` into an executable artifact satisfies it. The
//! shipped implementation drives `rustc` directly.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use tokio::process::Command;
use tracing::{debug, info};

use crate::util::hash::hash_file;

use super::types::{CompileSpec, HelperArtifact, ScriptError};

/// Builds a helper executable from a compile spec.
///
/// Implementations must be side-effect free beyond artifact creation under
/// `out_dir`.
pub trait HelperCompiler: Send + Sync {
  fn compile<'a>(
    &'a self,
    spec: &'a CompileSpec,
    out_dir: &'a Path,
  ) -> Pin<Box<dyn Future<Output = Result<HelperArtifact, ScriptError>> + Send + 'a>>;
}

/// The default compiler: invokes `rustc` on the `CompileSpec` crate root.
#[derive(Debug, Clone, Default)]
pub struct RustcCompiler {
  /// Path to the `rustc` binary; `None` resolves through PATH.
  pub rustc: Option<String>,
}

impl RustcCompiler {
  pub fn new() -> Self {
    Self::default()
  }

  fn binary_name() -> &'static str {
    #[cfg(windows)]
    {
      "helper.exe"
    }
    #[cfg(not(windows))]
    {
      "helper"
    }
  }
}

impl HelperCompiler for RustcCompiler {
  fn compile<'a>(
    &'a self,
    spec: &'a CompileSpec,
    out_dir: &'a Path,
  ) -> Pin<Box<dyn Future<Output = Result<HelperArtifact, ScriptError>> + Send + 'a>> {
    Box::pin(async move {
      let Some(root) = spec.sources.first() else {
        return Err(ScriptError::Compile {
          diagnostics: "compile spec has no sources".to_string(),
        });
      };

      tokio::fs::create_dir_all(out_dir).await?;
      let artifact_path = out_dir.join(Self::binary_name());

      let rustc = self.rustc.as_deref().unwrap_or("rustc");
      let mut command = Command::new(rustc);
      command
        .arg("--edition")
        .arg("2021")
        .arg("--crate-name")
        .arg("helper")
        .arg("-C")
        .arg(format!("opt-level={}", spec.opt_level))
        .arg("-o")
        .arg(&artifact_path)
        .arg(root);

      for feature in &spec.features {
        command.arg("--cfg").arg(format!("feature=\"{}\"", feature));
      }

      if let Some(target) = &spec.target {
        command.arg("--target").arg(target);
      }

      for (key, value) in &spec.env {
        command.env(key, value);
      }

      debug!(rustc = %rustc, root = %root.display(), "compiling helper");

      let output = command.output().await?;

      if !output.status.success() {
        let diagnostics = String::from_utf8_lossy(&output.stderr).to_string();
        return Err(ScriptError::Compile { diagnostics });
      }

      let checksum = hash_file(&artifact_path).map_err(|e| ScriptError::Compile {
        diagnostics: format!("failed to checksum artifact: {}", e),
      })?;

      info!(path = %artifact_path.display(), checksum = %checksum, "helper compiled");

      Ok(HelperArtifact {
        path: artifact_path,
        checksum,
      })
    })
  }
}
