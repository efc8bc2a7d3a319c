//! Fingerprint persistence.
//!
//! One JSON record per unit under the state directory:
//!
//! ```text
//! {state_dir}/fingerprints/
//! └── <unit-hash>.json    # FingerprintRecord
//! ```
//!
//! Records are keyed by unit identity hash, so concurrent units never
//! contend for the same file.

use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::debug;

use crate::util::hash::ObjectHash;

use super::types::{FINGERPRINT_RECORD_VERSION, FingerprintError, FingerprintRecord};

/// Manages fingerprint records on disk.
///
/// Uses atomic write operations (temp file, then rename) so a crash never
/// leaves a half-written record behind.
#[derive(Debug, Clone)]
pub struct FingerprintStore {
  base_path: PathBuf,
}

impl FingerprintStore {
  pub fn new(base_path: PathBuf) -> Self {
    Self { base_path }
  }

  pub fn base_path(&self) -> &PathBuf {
    &self.base_path
  }

  fn record_path(&self, unit: &ObjectHash) -> PathBuf {
    self.base_path.join(format!("{}.json", unit))
  }

  fn ensure_dir(&self) -> Result<(), FingerprintError> {
    fs::create_dir_all(&self.base_path).map_err(FingerprintError::CreateDir)
  }

  /// Load the record for a unit.
  ///
  /// Returns `Ok(None)` when no record exists, which the gate treats as a
  /// first run.
  pub fn load(&self, unit: &ObjectHash) -> Result<Option<FingerprintRecord>, FingerprintError> {
    let path = self.record_path(unit);

    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(FingerprintError::Read(e)),
    };

    let record: FingerprintRecord = serde_json::from_str(&content).map_err(FingerprintError::Parse)?;

    if record.version != FINGERPRINT_RECORD_VERSION {
      return Err(FingerprintError::UnsupportedVersion(record.version));
    }

    Ok(Some(record))
  }

  /// Persist a record atomically.
  ///
  /// Called only after a fully successful run; a unit that fails at any
  /// stage keeps its previous record (or none) untouched.
  pub fn save(&self, record: &FingerprintRecord) -> Result<(), FingerprintError> {
    self.ensure_dir()?;

    let path = self.record_path(&record.unit);
    let temp_path = self.base_path.join(format!("{}.json.tmp", record.unit));

    let content = serde_json::to_string_pretty(record).map_err(FingerprintError::Serialize)?;
    fs::write(&temp_path, &content).map_err(FingerprintError::Write)?;
    fs::rename(&temp_path, &path).map_err(FingerprintError::Write)?;

    debug!(unit = %record.unit, path = %path.display(), "fingerprint record written");
    Ok(())
  }

  /// Delete the record for a unit. Missing records are not an error.
  pub fn delete(&self, unit: &ObjectHash) -> Result<(), FingerprintError> {
    match fs::remove_file(self.record_path(unit)) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(FingerprintError::Write(e)),
    }
  }

  /// List the unit hashes that have records.
  pub fn list(&self) -> Result<Vec<ObjectHash>, FingerprintError> {
    let entries = match fs::read_dir(&self.base_path) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(FingerprintError::Read(e)),
    };

    let mut units = Vec::new();
    for entry in entries {
      let entry = entry.map_err(FingerprintError::Read)?;
      let name = entry.file_name();
      let Some(name) = name.to_str() else { continue };
      if let Some(stem) = name.strip_suffix(".json") {
        units.push(ObjectHash(stem.to_string()));
      }
    }
    units.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(units)
  }

  /// Remove every record.
  pub fn clear(&self) -> Result<(), FingerprintError> {
    match fs::remove_dir_all(&self.base_path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(FingerprintError::Write(e)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::attrs::AttributeSet;
  use crate::fingerprint::types::Fingerprint;
  use crate::util::hash::hash_bytes;
  use std::collections::BTreeMap;
  use tempfile::TempDir;

  fn temp_store() -> (TempDir, FingerprintStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = FingerprintStore::new(temp_dir.path().join("fingerprints"));
    (temp_dir, store)
  }

  fn make_record(unit: &str) -> FingerprintRecord {
    FingerprintRecord::new(
      ObjectHash(unit.to_string()),
      Fingerprint {
        helper_checksum: hash_bytes(unit.as_bytes()),
        env: BTreeMap::new(),
        tracked_env: BTreeMap::new(),
        files: BTreeMap::new(),
      },
      AttributeSet::default(),
    )
  }

  #[test]
  fn load_returns_none_when_no_record_exists() {
    let (_temp, store) = temp_store();
    let result = store.load(&ObjectHash("missing".to_string())).unwrap();
    assert!(result.is_none());
  }

  #[test]
  fn save_and_load_roundtrip() {
    let (_temp, store) = temp_store();
    let record = make_record("unit1");

    store.save(&record).unwrap();
    let loaded = store.load(&record.unit).unwrap().unwrap();

    assert_eq!(loaded, record);
  }

  #[test]
  fn records_are_independent_per_unit() {
    let (_temp, store) = temp_store();
    store.save(&make_record("unit1")).unwrap();
    store.save(&make_record("unit2")).unwrap();

    let a = store.load(&ObjectHash("unit1".to_string())).unwrap().unwrap();
    let b = store.load(&ObjectHash("unit2".to_string())).unwrap().unwrap();
    assert_ne!(a.fingerprint.helper_checksum, b.fingerprint.helper_checksum);
  }

  #[test]
  fn save_overwrites_previous_record() {
    let (_temp, store) = temp_store();
    let mut record = make_record("unit1");
    store.save(&record).unwrap();

    record.fingerprint.env.insert("CC".to_string(), "clang".to_string());
    store.save(&record).unwrap();

    let loaded = store.load(&record.unit).unwrap().unwrap();
    assert_eq!(loaded.fingerprint.env["CC"], "clang");
  }

  #[test]
  fn delete_removes_record() {
    let (_temp, store) = temp_store();
    let record = make_record("unit1");
    store.save(&record).unwrap();

    store.delete(&record.unit).unwrap();
    assert!(store.load(&record.unit).unwrap().is_none());
  }

  #[test]
  fn delete_nonexistent_succeeds() {
    let (_temp, store) = temp_store();
    store.delete(&ObjectHash("missing".to_string())).unwrap();
  }

  #[test]
  fn list_returns_sorted_unit_hashes() {
    let (_temp, store) = temp_store();
    store.save(&make_record("bbb")).unwrap();
    store.save(&make_record("aaa")).unwrap();

    let units = store.list().unwrap();
    assert_eq!(units, vec![ObjectHash("aaa".to_string()), ObjectHash("bbb".to_string())]);
  }

  #[test]
  fn list_on_missing_dir_is_empty() {
    let (_temp, store) = temp_store();
    assert!(store.list().unwrap().is_empty());
  }

  #[test]
  fn clear_removes_all_records() {
    let (_temp, store) = temp_store();
    store.save(&make_record("unit1")).unwrap();
    store.save(&make_record("unit2")).unwrap();

    store.clear().unwrap();
    assert!(store.list().unwrap().is_empty());
  }

  #[test]
  fn load_handles_corrupted_json() {
    let (_temp, store) = temp_store();
    fs::create_dir_all(store.base_path()).unwrap();
    fs::write(store.base_path().join("corrupt.json"), "not valid json {{{").unwrap();

    let result = store.load(&ObjectHash("corrupt".to_string()));
    assert!(matches!(result, Err(FingerprintError::Parse(_))));
  }

  #[test]
  fn load_handles_empty_file() {
    let (_temp, store) = temp_store();
    fs::create_dir_all(store.base_path()).unwrap();
    fs::write(store.base_path().join("empty.json"), "").unwrap();

    let result = store.load(&ObjectHash("empty".to_string()));
    assert!(result.is_err());
  }

  #[test]
  fn load_handles_unsupported_version() {
    let (_temp, store) = temp_store();
    let mut record = make_record("unit1");
    record.version = 99;
    store.save(&record).unwrap();

    let result = store.load(&record.unit);
    assert!(matches!(result, Err(FingerprintError::UnsupportedVersion(99))));
  }

  #[test]
  fn no_temp_file_remains_after_save() {
    let (_temp, store) = temp_store();
    let record = make_record("unit1");
    store.save(&record).unwrap();

    let leftovers: Vec<_> = fs::read_dir(store.base_path())
      .unwrap()
      .filter_map(|e| e.ok())
      .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
      .collect();
    assert!(leftovers.is_empty());
  }
}
