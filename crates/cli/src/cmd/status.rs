//! Status command implementation.
//!
//! Evaluates every unit's change-detection gate against the persisted
//! fingerprints without compiling or executing anything.

use anyhow::Result;
use std::path::Path;

use quarry_lib::fingerprint::Freshness;
use quarry_lib::orchestrate::{OrchestrateConfig, fingerprint_store, gate_status};

use crate::output::{print_info, print_success};

pub fn cmd_status(manifest_path: &Path, state_dir: &Path) -> Result<()> {
  let manifest = super::load_manifest(manifest_path)?;
  let config = OrchestrateConfig::new(state_dir.to_path_buf());
  let store = fingerprint_store(&config);

  for def in &manifest.units {
    let unit = def.unit_id()?;
    match gate_status(def, &unit, &store)? {
      Freshness::Fresh => print_success(&format!("{} fresh", def.name)),
      Freshness::Stale(reason) => print_info(&format!("{} stale: {}", def.name, reason)),
    }
  }

  Ok(())
}
