//! Unit orchestration.
//!
//! Entry point for running a manifest of units: builds the dependency
//! graph, computes parallel waves, and runs each unit's pipeline on a
//! bounded worker pool. The first failure stops new waves from being
//! scheduled; everything downstream of it is skipped and recorded.

pub mod graph;
pub mod types;
pub mod unit;

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::attrs::AttributeSet;
use crate::util::hash::ObjectHash;

pub use graph::UnitGraph;
pub use types::{OrchestrateConfig, OrchestrateError, OrchestrationResult, UnitResult};
pub use unit::{UnitDef, UnitManifest, fingerprint_store, gate_status, run_unit};

/// Run every unit in a manifest.
///
/// Waves execute in order; units within a wave run concurrently, bounded
/// by the configured parallelism. A unit merges its dependencies' exports
/// inside its own task, after the wave schedule has guaranteed those
/// dependencies completed.
pub async fn run_units(manifest: &UnitManifest, config: &OrchestrateConfig) -> Result<OrchestrationResult, OrchestrateError> {
  info!(unit_count = manifest.units.len(), "starting orchestration");

  let graph = UnitGraph::from_manifest(manifest)?;
  let waves = graph.waves()?;

  info!(wave_count = waves.len(), "computed execution waves");

  let mut result = OrchestrationResult::default();
  let mut failed_units: HashSet<ObjectHash> = HashSet::new();
  let mut halted = false;
  let semaphore = Arc::new(Semaphore::new(config.parallelism));

  for (wave_idx, wave) in waves.iter().enumerate() {
    debug!(wave = wave_idx, units = wave.len(), "executing wave");

    // Skip bookkeeping keeps running after a failure so every unit
    // downstream of it is recorded with the dependency that sank it.
    let mut ready = Vec::new();
    for unit in wave {
      let failed_dep = graph.dependencies(unit).into_iter().find(|dep| failed_units.contains(dep));

      if let Some(dep) = failed_dep {
        warn!(unit = %unit, failed_dep = %dep, "skipping unit due to failed dependency");
        failed_units.insert(unit.clone());
        result.skipped.insert(unit.clone(), dep);
      } else {
        ready.push(unit.clone());
      }
    }

    if halted || ready.is_empty() {
      continue;
    }

    let mut join_set = JoinSet::new();

    for unit in ready {
      let def = graph
        .def(&unit)
        .ok_or_else(|| OrchestrateError::UnitNotFound(unit.clone()))?
        .clone();

      // Exports from `links` dependencies, in declaration order.
      let dep_exports: Vec<AttributeSet> = graph
        .dependencies(&unit)
        .iter()
        .filter_map(|dep| result.completed.get(dep))
        .filter_map(|dep_result| dep_result.exported.clone())
        .collect();

      let config = config.clone();
      let semaphore = semaphore.clone();

      join_set.spawn(async move {
        let _permit = semaphore.acquire().await.expect("semaphore closed");
        let outcome = run_unit(&def, &unit, &dep_exports, &config).await;
        (unit, outcome)
      });
    }

    let mut wave_failure = None;

    while let Some(join_result) = join_set.join_next().await {
      match join_result {
        Ok((unit, Ok(unit_result))) => {
          info!(unit = %unit, name = %unit_result.name, "unit succeeded");
          result.completed.insert(unit, unit_result);
        }
        Ok((unit, Err(e))) => {
          error!(unit = %unit, error = %e, "unit failed");
          failed_units.insert(unit.clone());
          if wave_failure.is_none() {
            wave_failure = Some((unit, e));
          }
        }
        Err(e) => {
          error!(error = %e, "unit task panicked");
        }
      }
    }

    if let Some(failure) = wave_failure {
      result.failed = Some(failure);
      halted = true;
    }
  }

  info!(
    completed = result.completed.len(),
    failed = result.failed.is_some(),
    skipped = result.skipped.len(),
    "orchestration complete"
  );

  Ok(result)
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
  use super::*;
  use crate::fingerprint::{Freshness, StaleReason};
  use crate::script::{CompileSpec, HelperArtifact, HelperCompiler, ScriptError};
  use crate::util::hash::hash_file;
  use std::collections::BTreeMap;
  use std::fs;
  use std::future::Future;
  use std::os::unix::fs::PermissionsExt;
  use std::path::{Path, PathBuf};
  use std::pin::Pin;
  use std::time::Duration;
  use tempfile::TempDir;

  struct ScriptCompiler;

  impl HelperCompiler for ScriptCompiler {
    fn compile<'a>(
      &'a self,
      spec: &'a CompileSpec,
      out_dir: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<HelperArtifact, ScriptError>> + Send + 'a>> {
      Box::pin(async move {
        let source = spec.sources.first().ok_or_else(|| ScriptError::Compile {
          diagnostics: "no sources".to_string(),
        })?;
        let body = tokio::fs::read_to_string(source).await?;

        tokio::fs::create_dir_all(out_dir).await?;
        let path = out_dir.join("helper");
        tokio::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).await?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;

        let checksum = hash_file(&path).map_err(|e| ScriptError::Compile {
          diagnostics: e.to_string(),
        })?;
        Ok(HelperArtifact { path, checksum })
      })
    }
  }

  fn test_config(state_dir: &Path) -> OrchestrateConfig {
    OrchestrateConfig {
      parallelism: 4,
      timeout: Duration::from_secs(10),
      state_dir: state_dir.to_path_buf(),
      host_target: "x86_64-linux".to_string(),
      compiler: std::sync::Arc::new(ScriptCompiler),
    }
  }

  fn write_unit(dir: &Path, name: &str, body: &str, deps: &[&str]) -> UnitDef {
    let source = dir.join(format!("{}.sh", name));
    fs::write(&source, body).unwrap();
    UnitDef {
      name: name.to_string(),
      version: "0.0.0".to_string(),
      sources: vec![source],
      features: vec![],
      env: BTreeMap::new(),
      deps: deps.iter().map(|s| s.to_string()).collect(),
      links: None,
      target: None,
      opt_level: "0".to_string(),
    }
  }

  #[tokio::test]
  async fn empty_manifest_succeeds() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp.path().join("state"));

    let result = run_units(&UnitManifest::default(), &config).await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.total(), 0);
  }

  #[tokio::test]
  async fn independent_units_all_complete() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp.path().join("state"));
    let manifest = UnitManifest {
      units: vec![
        write_unit(temp.path(), "a", "echo 'env:A=1'", &[]),
        write_unit(temp.path(), "b", "echo 'env:B=1'", &[]),
        write_unit(temp.path(), "c", "echo 'env:C=1'", &[]),
      ],
    };

    let result = run_units(&manifest, &config).await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.completed.len(), 3);
  }

  #[tokio::test]
  async fn links_exports_flow_to_dependents() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp.path().join("state"));

    let mut zlib = write_unit(
      temp.path(),
      "zlib",
      "echo 'flag:-L/opt/zlib/lib'\necho 'flag:-lz'\necho 'metadata:root=/opt/zlib'",
      &[],
    );
    zlib.links = Some("z".to_string());
    let app = write_unit(temp.path(), "app", "echo 'flag:-L/app'", &["zlib"]);
    let app_id = app.unit_id().unwrap();

    let manifest = UnitManifest {
      units: vec![zlib, app],
    };
    let result = run_units(&manifest, &config).await.unwrap();
    assert!(result.is_success());

    let app_result = &result.completed[&app_id];
    assert_eq!(
      app_result.attrs.link_search_paths,
      vec![PathBuf::from("/app"), PathBuf::from("/opt/zlib/lib")]
    );
    assert_eq!(app_result.attrs.metadata, vec![("root".to_string(), "/opt/zlib".to_string())]);
  }

  #[tokio::test]
  async fn non_links_dependency_exports_nothing() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp.path().join("state"));

    let dep = write_unit(temp.path(), "dep", "echo 'flag:-L/dep'", &[]);
    let app = write_unit(temp.path(), "app", "echo 'flag:-L/app'", &["dep"]);
    let app_id = app.unit_id().unwrap();

    let manifest = UnitManifest { units: vec![dep, app] };
    let result = run_units(&manifest, &config).await.unwrap();

    assert_eq!(
      result.completed[&app_id].attrs.link_search_paths,
      vec![PathBuf::from("/app")]
    );
  }

  #[tokio::test]
  async fn failure_skips_dependents_transitively() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp.path().join("state"));

    let bad = write_unit(temp.path(), "bad", "exit 1", &[]);
    let mid = write_unit(temp.path(), "mid", "echo 'env:M=1'", &["bad"]);
    let top = write_unit(temp.path(), "top", "echo 'env:T=1'", &["mid"]);
    let bad_id = bad.unit_id().unwrap();
    let mid_id = mid.unit_id().unwrap();
    let top_id = top.unit_id().unwrap();

    let manifest = UnitManifest {
      units: vec![bad, mid, top],
    };
    let result = run_units(&manifest, &config).await.unwrap();

    assert!(!result.is_success());
    let (failed, _) = result.failed.as_ref().unwrap();
    assert_eq!(failed, &bad_id);
    assert_eq!(result.skipped.get(&mid_id), Some(&bad_id));
    assert_eq!(result.skipped.get(&top_id), Some(&mid_id));
    assert!(result.completed.is_empty());
  }

  #[tokio::test]
  async fn failure_does_not_stop_siblings_in_same_wave() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp.path().join("state"));

    let bad = write_unit(temp.path(), "bad", "exit 1", &[]);
    let good = write_unit(temp.path(), "good", "echo 'env:G=1'", &[]);
    let good_id = good.unit_id().unwrap();

    let manifest = UnitManifest { units: vec![bad, good] };
    let result = run_units(&manifest, &config).await.unwrap();

    assert!(result.failed.is_some());
    assert!(result.completed.contains_key(&good_id));
  }

  #[tokio::test]
  async fn failure_stops_scheduling_later_waves() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp.path().join("state"));

    // `bad` and `base` share the first wave; `leaf` only depends on
    // `base`, but the failure halts scheduling before its wave runs.
    let bad = write_unit(temp.path(), "bad", "exit 1", &[]);
    let base = write_unit(temp.path(), "base", "echo 'env:B=1'", &[]);
    let leaf = write_unit(temp.path(), "leaf", "echo 'env:L=1'", &["base"]);
    let base_id = base.unit_id().unwrap();
    let leaf_id = leaf.unit_id().unwrap();

    let manifest = UnitManifest {
      units: vec![bad, base, leaf],
    };
    let result = run_units(&manifest, &config).await.unwrap();

    assert!(result.failed.is_some());
    assert!(result.completed.contains_key(&base_id));
    assert!(!result.completed.contains_key(&leaf_id));
    assert!(!result.skipped.contains_key(&leaf_id));
  }

  #[tokio::test]
  async fn second_orchestration_reuses_every_unit() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp.path().join("state"));

    let mut zlib = write_unit(temp.path(), "zlib", "echo 'flag:-lz'", &[]);
    zlib.links = Some("z".to_string());
    let app = write_unit(temp.path(), "app", "echo 'env:A=1'", &["zlib"]);
    let app_id = app.unit_id().unwrap();

    let manifest = UnitManifest {
      units: vec![zlib, app],
    };

    let first = run_units(&manifest, &config).await.unwrap();
    assert!(first.completed.values().all(|r| matches!(
      r.freshness,
      Freshness::Stale(StaleReason::FirstRun)
    )));

    let second = run_units(&manifest, &config).await.unwrap();
    assert!(second.completed.values().all(|r| r.freshness == Freshness::Fresh));

    // Fresh units still merge exports for dependents.
    assert_eq!(
      second.completed[&app_id].attrs.link_libraries.len(),
      1
    );
  }

  #[tokio::test]
  async fn diamond_merge_follows_declaration_order() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp.path().join("state"));

    let mut left = write_unit(temp.path(), "left", "echo 'env:SHARED=left'", &[]);
    left.links = Some("left".to_string());
    let mut right = write_unit(temp.path(), "right", "echo 'env:SHARED=right'", &[]);
    right.links = Some("right".to_string());
    let app = write_unit(temp.path(), "app", "echo 'env:OWN=1'", &["left", "right"]);
    let app_id = app.unit_id().unwrap();

    let manifest = UnitManifest {
      units: vec![left, right, app],
    };
    let result = run_units(&manifest, &config).await.unwrap();

    // Last declared dependency wins for duplicate env keys, no matter
    // which unit finished first.
    assert_eq!(result.completed[&app_id].attrs.env_value("SHARED"), Some("right"));
  }

  #[tokio::test]
  async fn cycle_fails_before_anything_runs() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp.path().join("state"));
    let manifest = UnitManifest {
      units: vec![
        write_unit(temp.path(), "a", "echo hi", &["b"]),
        write_unit(temp.path(), "b", "echo hi", &["a"]),
      ],
    };

    let result = run_units(&manifest, &config).await;
    assert!(matches!(result, Err(OrchestrateError::CycleDetected)));
  }
}
