//! Import graph for build scheduling.
//!
//! Nodes are packages, edges run from a dependency to its dependent. The
//! graph schedules parallel compile waves and answers closure queries.

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::types::{ArchiveSet, Package};

use super::types::BuildError;

/// A DAG of packages keyed by import path.
#[derive(Debug, Default)]
pub struct ImportGraph {
  graph: DiGraph<String, ()>,
  nodes: HashMap<String, NodeIndex>,
}

impl ImportGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build a graph from loaded packages.
  ///
  /// Imports of packages outside the set are treated as already built and get
  /// no node.
  pub fn from_packages<'a>(packages: impl IntoIterator<Item = &'a Package>) -> Result<Self, BuildError> {
    let packages: Vec<&Package> = packages.into_iter().collect();
    let mut dag = Self::new();

    for pkg in &packages {
      dag.add_package(&pkg.import_path);
    }
    for pkg in &packages {
      for import in &pkg.imports {
        if dag.nodes.contains_key(import) {
          dag.add_edge(import, &pkg.import_path);
        }
      }
    }

    dag.verify_acyclic()?;
    Ok(dag)
  }

  /// Build a graph from compiled units and the dependencies they recorded.
  pub fn from_archives(archives: &ArchiveSet) -> Self {
    let mut dag = Self::new();
    for (import_path, archive) in archives {
      dag.add_package(import_path);
      for dependency in &archive.dependencies {
        dag.add_edge(dependency, import_path);
      }
    }
    dag
  }

  /// Add a node, returning its index. Adding twice is a no-op.
  pub fn add_package(&mut self, import_path: &str) -> NodeIndex {
    if let Some(&idx) = self.nodes.get(import_path) {
      return idx;
    }
    let idx = self.graph.add_node(import_path.to_string());
    self.nodes.insert(import_path.to_string(), idx);
    idx
  }

  /// Record that `dependent` imports `dependency`.
  pub fn add_edge(&mut self, dependency: &str, dependent: &str) {
    let from = self.add_package(dependency);
    let to = self.add_package(dependent);
    if self.graph.find_edge(from, to).is_none() {
      self.graph.add_edge(from, to, ());
    }
  }

  fn verify_acyclic(&self) -> Result<(), BuildError> {
    toposort(&self.graph, None).map_err(|_| BuildError::CycleDetected)?;
    Ok(())
  }

  /// Packages grouped into waves that can be compiled in parallel.
  ///
  /// Every package's dependencies sit in earlier waves. Each wave is sorted
  /// so scheduling is deterministic.
  pub fn waves(&self) -> Result<Vec<Vec<String>>, BuildError> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();

    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let ready: Vec<NodeIndex> = remaining.iter().filter(|&&idx| in_degree[&idx] == 0).copied().collect();
      if ready.is_empty() {
        return Err(BuildError::CycleDetected);
      }

      for &idx in &ready {
        remaining.remove(&idx);
        for dependent in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&dependent) {
            *deg = deg.saturating_sub(1);
          }
        }
      }

      let mut wave: Vec<String> = ready.into_iter().map(|idx| self.graph[idx].clone()).collect();
      wave.sort();
      waves.push(wave);
    }

    Ok(waves)
  }

  /// Transitive closure of `roots`, roots included.
  pub fn closure<'a>(&self, roots: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<NodeIndex> = roots.into_iter().filter_map(|r| self.nodes.get(r).copied()).collect();

    while let Some(idx) = stack.pop() {
      if !seen.insert(self.graph[idx].clone()) {
        continue;
      }
      stack.extend(self.graph.neighbors_directed(idx, Direction::Incoming));
    }
    seen
  }

  pub fn contains(&self, import_path: &str) -> bool {
    self.nodes.contains_key(import_path)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use super::*;

  fn pkg(path: &str, imports: &[&str]) -> Package {
    Package {
      import_path: path.to_string(),
      files: BTreeMap::new(),
      imports: imports.iter().map(|s| s.to_string()).collect(),
    }
  }

  #[test]
  fn empty_graph() {
    let dag = ImportGraph::new();
    assert!(dag.is_empty());
    assert!(dag.waves().unwrap().is_empty());
    assert!(dag.closure(["main"]).is_empty());
  }

  #[test]
  fn waves_respect_dependencies() {
    let pkgs = [
      pkg("main", &["helperlib", "fmt"]),
      pkg("helperlib", &["fmt"]),
      pkg("fmt", &["io"]),
      pkg("io", &[]),
      pkg("os", &[]),
    ];
    let dag = ImportGraph::from_packages(&pkgs).unwrap();

    let waves = dag.waves().unwrap();
    assert_eq!(
      waves,
      vec![
        vec!["io".to_string(), "os".to_string()],
        vec!["fmt".to_string()],
        vec!["helperlib".to_string()],
        vec!["main".to_string()],
      ]
    );
  }

  #[test]
  fn cycle_is_detected() {
    let pkgs = [pkg("a", &["b"]), pkg("b", &["a"])];
    assert!(matches!(ImportGraph::from_packages(&pkgs), Err(BuildError::CycleDetected)));
  }

  #[test]
  fn imports_outside_the_set_are_ignored() {
    let pkgs = [pkg("main", &["fmt"])];
    let dag = ImportGraph::from_packages(&pkgs).unwrap();
    assert!(!dag.contains("fmt"));
    assert_eq!(dag.closure(["main"]).len(), 1);
  }

  #[test]
  fn closure_is_transitive_and_exact() {
    let pkgs = [
      pkg("main", &["a"]),
      pkg("a", &["b"]),
      pkg("b", &[]),
      pkg("unrelated", &["b"]),
    ];
    let dag = ImportGraph::from_packages(&pkgs).unwrap();

    let closure = dag.closure(["main"]);
    assert_eq!(closure.into_iter().collect::<Vec<_>>(), vec!["a", "b", "main"]);
    assert_eq!(dag.closure(["unrelated"]).len(), 2);
  }

  #[test]
  fn duplicate_edges_collapse() {
    let mut dag = ImportGraph::new();
    dag.add_edge("fmt", "main");
    dag.add_edge("fmt", "main");
    assert_eq!(dag.len(), 2);
    assert_eq!(dag.waves().unwrap(), vec![vec!["fmt".to_string()], vec!["main".to_string()]]);
  }

  #[test]
  fn archive_graph_follows_recorded_dependencies() {
    let archive = |path: &str, deps: &[&str]| {
      (
        path.to_string(),
        std::sync::Arc::new(crate::types::Archive {
          import_path: path.to_string(),
          payload: Vec::new(),
          dependencies: deps.iter().map(|d| d.to_string()).collect(),
        }),
      )
    };
    let archives: ArchiveSet = [
      archive("io", &[]),
      archive("fmt", &["io"]),
      archive("os", &[]),
      archive("main", &["fmt"]),
    ]
    .into_iter()
    .collect();

    let dag = ImportGraph::from_archives(&archives);
    assert_eq!(dag.len(), 4);
    assert_eq!(dag.closure(["main"]).into_iter().collect::<Vec<_>>(), vec!["fmt", "io", "main"]);
  }
}
