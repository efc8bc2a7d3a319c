mod clean;
mod run;
mod status;

pub use clean::cmd_clean;
pub use run::cmd_run;
pub use status::cmd_status;

use anyhow::{Context, Result};
use std::path::Path;

use quarry_lib::orchestrate::UnitManifest;

/// Load a JSON unit manifest from disk.
pub(crate) fn load_manifest(path: &Path) -> Result<UnitManifest> {
  let content =
    std::fs::read_to_string(path).with_context(|| format!("failed to read manifest: {}", path.display()))?;
  serde_json::from_str(&content).with_context(|| format!("invalid unit manifest: {}", path.display()))
}
