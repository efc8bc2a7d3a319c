//! Clean command implementation.

use anyhow::{Context, Result};
use std::io;
use std::path::Path;

use quarry_lib::consts::WORK_DIR;
use quarry_lib::orchestrate::{OrchestrateConfig, fingerprint_store};

use crate::output::print_success;

pub fn cmd_clean(state_dir: &Path) -> Result<()> {
  let config = OrchestrateConfig::new(state_dir.to_path_buf());
  fingerprint_store(&config).clear().context("failed to clear fingerprints")?;

  let work_dir = state_dir.join(WORK_DIR);
  match std::fs::remove_dir_all(&work_dir) {
    Ok(()) => {}
    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
    Err(e) => return Err(e).with_context(|| format!("failed to remove {}", work_dir.display())),
  }

  print_success(&format!("Cleaned state directory: {}", state_dir.display()));
  Ok(())
}
