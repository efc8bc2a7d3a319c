//! Unit dependency graph and wave computation.

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::util::hash::ObjectHash;

use super::types::OrchestrateError;
use super::unit::{UnitDef, UnitManifest};

/// A DAG over the units of one manifest.
///
/// Edges run from a dependency to its dependents. The graph drives the
/// wave schedule; merge ordering never comes from graph traversal, it
/// always follows each unit's declared dependency list.
pub struct UnitGraph {
  graph: DiGraph<ObjectHash, ()>,
  nodes: HashMap<ObjectHash, NodeIndex>,
  defs: HashMap<ObjectHash, UnitDef>,
  by_name: HashMap<String, ObjectHash>,
}

impl UnitGraph {
  /// Build a graph from a manifest.
  ///
  /// Rejects duplicate unit names, references to undeclared units, and
  /// dependency cycles.
  pub fn from_manifest(manifest: &UnitManifest) -> Result<Self, OrchestrateError> {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();
    let mut defs = HashMap::new();
    let mut by_name = HashMap::new();

    for def in &manifest.units {
      if by_name.contains_key(&def.name) {
        return Err(OrchestrateError::DuplicateUnit(def.name.clone()));
      }
      let unit = def.unit_id()?;
      let idx = graph.add_node(unit.clone());
      nodes.insert(unit.clone(), idx);
      by_name.insert(def.name.clone(), unit.clone());
      defs.insert(unit, def.clone());
    }

    for def in &manifest.units {
      let dependent_idx = nodes[&by_name[&def.name]];
      for dep_name in &def.deps {
        let dep = by_name.get(dep_name).ok_or_else(|| OrchestrateError::UnknownDependency {
          unit: def.name.clone(),
          dep: dep_name.clone(),
        })?;
        graph.add_edge(nodes[dep], dependent_idx, ());
      }
    }

    let unit_graph = Self {
      graph,
      nodes,
      defs,
      by_name,
    };
    unit_graph.verify_acyclic()?;
    Ok(unit_graph)
  }

  fn verify_acyclic(&self) -> Result<(), OrchestrateError> {
    toposort(&self.graph, None).map_err(|_| OrchestrateError::CycleDetected)?;
    Ok(())
  }

  /// Units grouped into parallel execution waves.
  ///
  /// Each wave contains units whose dependencies all sit in earlier waves,
  /// computed with a Kahn's-algorithm level pass.
  pub fn waves(&self) -> Result<Vec<Vec<ObjectHash>>, OrchestrateError> {
    let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
    let mut node_level: HashMap<NodeIndex, usize> = HashMap::new();

    for idx in self.graph.node_indices() {
      in_degree.insert(idx, self.graph.neighbors_directed(idx, Direction::Incoming).count());
    }

    let mut current_level = 0;
    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();

    while !remaining.is_empty() {
      let ready: Vec<NodeIndex> = remaining.iter().filter(|&&idx| in_degree[&idx] == 0).copied().collect();

      if ready.is_empty() {
        return Err(OrchestrateError::CycleDetected);
      }

      for &idx in &ready {
        node_level.insert(idx, current_level);
        remaining.remove(&idx);

        for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&neighbor) {
            *deg = deg.saturating_sub(1);
          }
        }
      }

      current_level += 1;
    }

    let max_level = node_level.values().copied().max().unwrap_or(0);
    let mut waves: Vec<Vec<ObjectHash>> = vec![Vec::new(); max_level + 1];

    for (unit, &idx) in &self.nodes {
      if let Some(&level) = node_level.get(&idx) {
        waves[level].push(unit.clone());
      }
    }

    waves.retain(|w| !w.is_empty());
    Ok(waves)
  }

  /// Direct dependencies of a unit, in declaration order.
  pub fn dependencies(&self, unit: &ObjectHash) -> Vec<ObjectHash> {
    let Some(def) = self.defs.get(unit) else {
      return Vec::new();
    };

    def
      .deps
      .iter()
      .filter_map(|name| self.by_name.get(name).cloned())
      .collect()
  }

  pub fn def(&self, unit: &ObjectHash) -> Option<&UnitDef> {
    self.defs.get(unit)
  }

  pub fn unit_count(&self) -> usize {
    self.nodes.len()
  }

  pub fn all_units(&self) -> impl Iterator<Item = &ObjectHash> {
    self.nodes.keys()
  }
}
