//! Unit definitions and the per-unit pipeline.
//!
//! One unit runs five strictly sequential steps: compile the helper,
//! evaluate the change-detection gate, execute (if stale), parse the
//! directive output, and merge with dependency exports. The fingerprint
//! record is written only after the whole pipeline succeeds.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::attrs::{AttributeSet, merge_exports};
use crate::consts::{FINGERPRINTS_DIR, WORK_DIR};
use crate::directive::parse_output;
use crate::fingerprint::{
  Fingerprint, FingerprintRecord, FingerprintStore, Freshness, StaleReason, compute_fingerprint, evaluate,
};
use crate::script::{CompileSpec, HelperEnv, run_helper};
use crate::util::hash::{Hashable, ObjectHash};

use super::types::{OrchestrateConfig, OrchestrateError, UnitResult};

/// One compilation unit's build-script declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnitDef {
  pub name: String,

  #[serde(default = "default_version")]
  pub version: String,

  /// Helper source files; the first entry is the crate root.
  pub sources: Vec<PathBuf>,

  #[serde(default)]
  pub features: Vec<String>,

  /// Environment overrides for the helper execution. Part of the
  /// fingerprint.
  #[serde(default)]
  pub env: BTreeMap<String, String>,

  /// Dependencies by unit name, in declaration order. Declaration order
  /// is the merge order.
  #[serde(default)]
  pub deps: Vec<String>,

  /// Native-library marker. A unit re-exports its attribute set to
  /// dependents only when this is set.
  #[serde(default)]
  pub links: Option<String>,

  #[serde(default)]
  pub target: Option<String>,

  #[serde(default = "default_opt_level")]
  pub opt_level: String,
}

fn default_version() -> String {
  "0.0.0".to_string()
}

fn default_opt_level() -> String {
  "0".to_string()
}

impl Hashable for UnitDef {}

impl UnitDef {
  /// Stable identity of this definition; keys fingerprints and work dirs.
  pub fn unit_id(&self) -> Result<ObjectHash, OrchestrateError> {
    Ok(self.compute_hash()?)
  }

  fn compile_spec(&self) -> CompileSpec {
    CompileSpec {
      sources: self.sources.clone(),
      features: self.features.clone(),
      env: BTreeMap::new(),
      target: self.target.clone(),
      opt_level: self.opt_level.clone(),
    }
  }

  fn helper_env(&self, out_dir: PathBuf, config: &OrchestrateConfig) -> HelperEnv {
    HelperEnv {
      pkg_name: self.name.clone(),
      pkg_version: self.version.clone(),
      target: self.target.clone().unwrap_or_else(|| config.host_target.clone()),
      out_dir,
      opt_level: self.opt_level.clone(),
    }
  }
}

/// A collection of units to orchestrate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitManifest {
  pub units: Vec<UnitDef>,
}

/// Open the fingerprint store for a state directory.
pub fn fingerprint_store(config: &OrchestrateConfig) -> FingerprintStore {
  FingerprintStore::new(config.state_dir.join(FINGERPRINTS_DIR))
}

fn unit_work_dir(unit: &ObjectHash, config: &OrchestrateConfig) -> PathBuf {
  config.state_dir.join(WORK_DIR).join(&unit.0)
}

/// Run one unit's full pipeline.
///
/// `dep_exports` are the exported attribute sets of this unit's `links`
/// dependencies, already in declaration order. All dependencies have
/// completed by the time this is called; the wave scheduler guarantees it.
pub async fn run_unit(
  def: &UnitDef,
  unit: &ObjectHash,
  dep_exports: &[AttributeSet],
  config: &OrchestrateConfig,
) -> Result<UnitResult, OrchestrateError> {
  let start = Instant::now();
  let work_dir = unit_work_dir(unit, config);
  let helper_dir = work_dir.join("helper");
  let out_dir = work_dir.join("out");

  info!(unit = %unit, name = %def.name, "running unit");

  let artifact = config.compiler.compile(&def.compile_spec(), &helper_dir).await?;

  let store = fingerprint_store(config);
  let stored = store.load(unit)?;

  // Trigger paths come from the previous run's output; a first run has
  // nothing to track yet.
  let known_triggers = stored.as_ref().map(|r| r.attrs.triggers.clone()).unwrap_or_default();
  let current = compute_fingerprint(&artifact, &def.env, &known_triggers);
  let freshness = evaluate(stored.as_ref().map(|r| &r.fingerprint), &current);

  let own = match &freshness {
    Freshness::Fresh => {
      let record = stored.ok_or_else(|| OrchestrateError::UnitNotFound(unit.clone()))?;
      info!(unit = %unit, "reusing cached attributes");
      record.attrs
    }
    Freshness::Stale(reason) => {
      debug!(unit = %unit, reason = %reason, "executing helper");
      tokio::fs::create_dir_all(&out_dir).await?;

      let env = def.helper_env(out_dir.clone(), config);
      let execution = run_helper(&artifact, &out_dir, &env, &def.env, config.timeout).await?;
      let parsed = parse_output(&execution.stdout()).map_err(crate::script::ScriptError::Parse)?;
      let attrs = AttributeSet::from_directives(&parsed.directives);

      for warning in &attrs.warnings {
        warn!(unit = %unit, name = %def.name, "{}", warning);
      }

      // Triggers may differ from the previous run; fingerprint what this
      // run actually declared.
      let fingerprint = compute_fingerprint(&artifact, &def.env, &attrs.triggers);
      store.save(&FingerprintRecord::new(unit.clone(), fingerprint, attrs.clone()))?;
      attrs
    }
  };

  let dep_refs: Vec<&AttributeSet> = dep_exports.iter().collect();
  let attrs = merge_exports(&own, &dep_refs);
  let exported = def.links.is_some().then(|| own);

  Ok(UnitResult {
    unit: unit.clone(),
    name: def.name.clone(),
    attrs,
    exported,
    freshness,
    duration: start.elapsed(),
  })
}

/// Evaluate a unit's gate without compiling or executing anything.
///
/// Uses the stored helper checksum as-is, so a helper source edit is only
/// visible to a real run; file and environment triggers are re-checked.
pub fn gate_status(def: &UnitDef, unit: &ObjectHash, store: &FingerprintStore) -> Result<Freshness, OrchestrateError> {
  let Some(record) = store.load(unit)? else {
    return Ok(Freshness::Stale(StaleReason::FirstRun));
  };

  let mut tracked_env = BTreeMap::new();
  for key in &record.attrs.triggers.env_keys {
    tracked_env.insert(key.clone(), std::env::var(key).ok());
  }

  let probe = compute_fingerprint(
    &crate::script::HelperArtifact {
      path: PathBuf::new(),
      checksum: record.fingerprint.helper_checksum.clone(),
    },
    &def.env,
    &record.attrs.triggers,
  );
  let probe = Fingerprint { tracked_env, ..probe };

  Ok(evaluate(Some(&record.fingerprint), &probe))
}
