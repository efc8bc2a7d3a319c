//! Run command implementation.
//!
//! Orchestrates a manifest and reports per-unit outcomes in declaration
//! order: reused from cache, executed, skipped, or failed.

use anyhow::{Result, bail};
use std::path::Path;
use std::time::Duration;

use quarry_lib::fingerprint::Freshness;
use quarry_lib::orchestrate::{OrchestrateConfig, OrchestrateError, UnitManifest, run_units};
use quarry_lib::script::ScriptError;
use quarry_lib::util::hash::ObjectHash;

use crate::output::{format_duration, print_error, print_info, print_stat, print_success, print_warning};

pub async fn cmd_run(manifest_path: &Path, state_dir: &Path, jobs: Option<usize>, timeout: Option<u64>) -> Result<()> {
  let manifest = super::load_manifest(manifest_path)?;

  let mut config = OrchestrateConfig::new(state_dir.to_path_buf());
  if let Some(jobs) = jobs {
    config.parallelism = jobs.max(1);
  }
  if let Some(secs) = timeout {
    config.timeout = Duration::from_secs(secs);
  }

  let result = run_units(&manifest, &config).await?;

  for def in &manifest.units {
    let unit = def.unit_id()?;
    if let Some(unit_result) = result.completed.get(&unit) {
      match &unit_result.freshness {
        Freshness::Fresh => print_info(&format!("{} fresh (cached)", def.name)),
        Freshness::Stale(_) => print_success(&format!(
          "{} ran in {}",
          def.name,
          format_duration(unit_result.duration)
        )),
      }
    } else if let Some(dep) = result.skipped.get(&unit) {
      print_warning(&format!(
        "{} skipped (dependency {} failed)",
        def.name,
        unit_name(&manifest, dep)
      ));
    } else {
      print_warning(&format!("{} not run (orchestration halted)", def.name));
    }
  }

  if let Some((unit, error)) = &result.failed {
    print_error(&format!("{} failed: {}", unit_name(&manifest, unit), error));
    if let OrchestrateError::Script(ScriptError::Execution { stderr, .. }) = error
      && !stderr.is_empty()
    {
      eprintln!("{}", stderr);
    }
    bail!("orchestration failed");
  }

  print_stat("Units", &result.completed.len().to_string());
  Ok(())
}

fn unit_name(manifest: &UnitManifest, unit: &ObjectHash) -> String {
  manifest
    .units
    .iter()
    .find(|def| def.unit_id().ok().as_ref() == Some(unit))
    .map(|def| def.name.clone())
    .unwrap_or_else(|| unit.to_string())
}
