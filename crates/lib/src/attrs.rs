//! Aggregated build attributes.
//!
//! An `AttributeSet` is the ordered collection of directives a unit's helper
//! produced, folded by kind. The aggregator merges a unit's own set with the
//! exported sets of its dependencies into the single set the compilation
//! step consumes.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::directive::{BuildDirective, LinkKind};

/// A library to link, deduplicated by exact name+kind match during merges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkLibrary {
  pub name: String,
  pub kind: Option<LinkKind>,
}

/// Files and environment variables whose change invalidates a cached run.
///
/// Recomputed on every run and compared against the persisted fingerprint.
/// Insertion-ordered, duplicates collapsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerunTriggerSet {
  pub paths: Vec<PathBuf>,
  pub env_keys: Vec<String>,
}

impl RerunTriggerSet {
  pub fn is_empty(&self) -> bool {
    self.paths.is_empty() && self.env_keys.is_empty()
  }

  fn add_path(&mut self, path: PathBuf) {
    if !self.paths.contains(&path) {
      self.paths.push(path);
    }
  }

  fn add_env_key(&mut self, key: String) {
    if !self.env_keys.contains(&key) {
      self.env_keys.push(key);
    }
  }
}

/// The aggregated, ordered collection of directives feeding the compilation
/// step.
///
/// Ordering within each kind is insertion order and is what guarantees
/// reproducible compiler invocations. Warnings and rerun triggers belong to
/// the unit that emitted them and are never inherited through a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSet {
  pub compiler_flags: Vec<String>,
  pub link_search_paths: Vec<PathBuf>,
  pub link_libraries: Vec<LinkLibrary>,
  /// Ordered key-value pairs; keys are unique (last write wins, first
  /// insertion position kept).
  pub env: Vec<(String, String)>,
  pub metadata: Vec<(String, String)>,
  pub warnings: Vec<String>,
  pub triggers: RerunTriggerSet,
}

impl AttributeSet {
  /// Fold a parsed directive sequence into an attribute set.
  pub fn from_directives<'a, I>(directives: I) -> Self
  where
    I: IntoIterator<Item = &'a BuildDirective>,
  {
    let mut set = Self::default();
    for directive in directives {
      set.insert(directive);
    }
    set
  }

  /// Fold one directive into the set.
  pub fn insert(&mut self, directive: &BuildDirective) {
    match directive {
      BuildDirective::CompilerFlag { value } => self.compiler_flags.push(value.clone()),
      BuildDirective::LinkSearchPath { path } => self.link_search_paths.push(path.clone()),
      BuildDirective::LinkLibrary { name, kind } => self.link_libraries.push(LinkLibrary {
        name: name.clone(),
        kind: *kind,
      }),
      BuildDirective::EnvVar { key, value } => self.set_env(key, value),
      BuildDirective::RerunIfChanged { path } => self.triggers.add_path(path.clone()),
      BuildDirective::RerunIfEnvChanged { key } => self.triggers.add_env_key(key.clone()),
      BuildDirective::Warning { text } => self.warnings.push(text.clone()),
      BuildDirective::Metadata { key, value } => self.metadata.push((key.clone(), value.clone())),
    }
  }

  fn set_env(&mut self, key: &str, value: &str) {
    if let Some(entry) = self.env.iter_mut().find(|(k, _)| k == key) {
      entry.1 = value.to_string();
    } else {
      self.env.push((key.to_string(), value.to_string()));
    }
  }

  /// Look up an env var by key.
  pub fn env_value(&self, key: &str) -> Option<&str> {
    self.env.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
  }

  pub fn is_empty(&self) -> bool {
    self.compiler_flags.is_empty()
      && self.link_search_paths.is_empty()
      && self.link_libraries.is_empty()
      && self.env.is_empty()
      && self.metadata.is_empty()
      && self.warnings.is_empty()
      && self.triggers.is_empty()
  }
}

/// Merge a unit's own attributes with its dependencies' exported attributes.
///
/// Merge order is own directives first, then each dependency in declaration
/// order. The result depends only on that declared order, never on the order
/// dependency units happened to be scheduled. Duplicate `EnvVar` keys: last
/// write wins. `LinkLibrary` entries are treated as a set keyed by exact
/// name+kind; duplicates collapse, distinct entries are all preserved.
/// Warnings and rerun triggers are not inherited.
pub fn merge_exports(own: &AttributeSet, deps: &[&AttributeSet]) -> AttributeSet {
  let mut merged = own.clone();

  // Rebuild the library list keyed by exact name+kind, own entries first.
  let mut seen_libs: HashSet<LinkLibrary> = HashSet::new();
  merged.link_libraries = Vec::new();
  for lib in &own.link_libraries {
    if seen_libs.insert(lib.clone()) {
      merged.link_libraries.push(lib.clone());
    }
  }

  for dep in deps {
    merged.compiler_flags.extend(dep.compiler_flags.iter().cloned());
    merged.link_search_paths.extend(dep.link_search_paths.iter().cloned());

    for lib in &dep.link_libraries {
      if seen_libs.insert(lib.clone()) {
        merged.link_libraries.push(lib.clone());
      }
    }

    for (key, value) in &dep.env {
      merged.set_env(key, value);
    }

    merged.metadata.extend(dep.metadata.iter().cloned());
  }

  merged
}
