//! Sandboxed helper execution.
//!
//! Runs a compiled helper in an isolated working directory with a cleared
//! environment, captures stdout/stderr, and enforces exit-code success
//! within a wall-clock budget.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::consts::{ENV_OPT_LEVEL, ENV_OUT_DIR, ENV_PKG_NAME, ENV_PKG_VERSION, ENV_TARGET};

use super::types::{ExecutionResult, HelperArtifact, HelperEnv, ScriptError};

/// Run a compiled helper to completion.
///
/// The helper runs in `work_dir` with a cleared environment:
/// - HOME is pointed at a nonexistent location and TMPDIR at a scratch
///   directory under `work_dir`, so nothing leaks in from the caller
/// - the fixed informational variables (package name/version, target,
///   OUT_DIR, OPT_LEVEL) are set from `info`
/// - caller-declared `overrides` are merged last and win
///
/// Files the helper creates under `work_dir` are the generated-output root
/// and are left in place. On a non-zero exit the stderr capture is returned
/// verbatim in the error. If `timeout` elapses the subprocess is killed and
/// the invocation fails with `Timeout`; nothing is partially applied.
pub async fn run_helper(
  artifact: &HelperArtifact,
  work_dir: &Path,
  info: &HelperEnv,
  overrides: &BTreeMap<String, String>,
  timeout: Duration,
) -> Result<ExecutionResult, ScriptError> {
  info!(helper = %artifact.path.display(), work_dir = %work_dir.display(), "executing helper");

  let tmp_dir = work_dir.join("tmp");
  tokio::fs::create_dir_all(&tmp_dir).await?;

  let mut command = Command::new(&artifact.path);
  command
    .current_dir(work_dir)
    .env_clear()
    .env("HOME", "/homeless-shelter")
    .env("TMPDIR", &tmp_dir)
    .env("TMP", &tmp_dir)
    .env("TEMP", &tmp_dir)
    .env("LANG", "C")
    .env("LC_ALL", "C")
    .env(ENV_PKG_NAME, &info.pkg_name)
    .env(ENV_PKG_VERSION, &info.pkg_version)
    .env(ENV_TARGET, &info.target)
    .env(ENV_OUT_DIR, &info.out_dir)
    .env(ENV_OPT_LEVEL, &info.opt_level)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

  // Overrides are merged last so callers can shadow the fixed set.
  for (key, value) in overrides {
    command.env(key, value);
  }

  let start = Instant::now();
  let mut child = command.spawn()?;

  let stdout = child
    .stdout
    .take()
    .ok_or_else(|| std::io::Error::other("helper stdout was not captured"))?;
  let stderr = child
    .stderr
    .take()
    .ok_or_else(|| std::io::Error::other("helper stderr was not captured"))?;
  let stdout_task = tokio::spawn(read_lines(stdout));
  let stderr_task = tokio::spawn(read_lines(stderr));

  let status = match tokio::time::timeout(timeout, child.wait()).await {
    Ok(status) => status?,
    Err(_) => {
      warn!(helper = %artifact.path.display(), "helper exceeded time budget, killing");
      child.start_kill().ok();
      child.wait().await.ok();
      stdout_task.abort();
      stderr_task.abort();
      return Err(ScriptError::Timeout { limit: timeout });
    }
  };

  let duration = start.elapsed();
  let stdout_lines = stdout_task.await.unwrap_or_default();
  let stderr_lines = stderr_task.await.unwrap_or_default();

  if !status.success() {
    let stderr_text = stderr_lines.join("\n");
    debug!(exit_code = ?status.code(), stderr = %stderr_text, "helper failed");
    return Err(ScriptError::Execution {
      exit_code: status.code(),
      stderr: stderr_text,
    });
  }

  debug!(
    lines = stdout_lines.len(),
    elapsed_ms = duration.as_millis() as u64,
    "helper finished"
  );

  Ok(ExecutionResult {
    exit_code: status.code().unwrap_or(0),
    stdout_lines,
    stderr_lines,
    duration,
  })
}

/// Drain a pipe into a line vector.
async fn read_lines<R: AsyncRead + Unpin>(reader: R) -> Vec<String> {
  let mut lines = Vec::new();
  let mut reader = BufReader::new(reader).lines();
  while let Ok(Some(line)) = reader.next_line().await {
    lines.push(line);
  }
  lines
}
