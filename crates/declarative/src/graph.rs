//! Dependency graph and topological levels

use crate::error::CompileError;
use indexmap::{IndexMap, IndexSet};

/// Name → set of names it depends on, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: IndexMap<String, IndexSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a node's dependency set
    pub fn insert(&mut self, name: impl Into<String>, dependencies: IndexSet<String>) {
        self.edges.insert(name.into(), dependencies);
    }

    /// Overlay `other` on top of this graph; its edges win on conflict
    pub fn merge(&mut self, other: &DependencyGraph) {
        for (name, deps) in &other.edges {
            self.edges.insert(name.clone(), deps.clone());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    pub fn dependencies(&self, name: &str) -> Option<&IndexSet<String>> {
        self.edges.get(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Group nodes into levels
    ///
    /// Level `i` holds exactly the nodes whose dependencies all sit in
    /// levels `0..i`. Within a level nodes keep insertion order.
    pub fn topological_levels(&self) -> Result<Vec<Vec<String>>, CompileError> {
        for (name, deps) in &self.edges {
            if let Some(missing) = deps.iter().find(|dep| !self.edges.contains_key(*dep)) {
                return Err(CompileError::UnknownDependency {
                    resource: name.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        let mut placed: IndexSet<&str> = IndexSet::new();
        let mut levels = Vec::new();

        while placed.len() < self.edges.len() {
            let level: Vec<String> = self
                .edges
                .iter()
                .filter(|(name, _)| !placed.contains(name.as_str()))
                .filter(|(name, deps)| {
                    deps.iter()
                        .all(|dep| dep == *name || placed.contains(dep.as_str()))
                })
                .map(|(name, _)| name.clone())
                .collect();

            if level.is_empty() {
                let members = self
                    .edges
                    .keys()
                    .filter(|name| !placed.contains(name.as_str()))
                    .cloned()
                    .collect();
                return Err(CompileError::CyclicDependency { members });
            }

            for name in &level {
                if let Some((key, _)) = self.edges.get_key_value(name) {
                    placed.insert(key.as_str());
                }
            }
            levels.push(level);
        }

        Ok(levels)
    }
}
