//! Asset dependency graph: registration, validation and execution order.

use crate::assets::{Asset, AssetSpec};
use crate::error::{LakeError, Result};
use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Which assets a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSelection {
    All,
    Keys(Vec<String>),
    Group(String),
    /// The inner selection plus everything it transitively depends on.
    Upstream(Box<AssetSelection>),
}

impl AssetSelection {
    pub fn keys<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Keys(names.into_iter().map(Into::into).collect())
    }

    pub fn with_upstream(self) -> Self {
        Self::Upstream(Box::new(self))
    }
}

/// Graph of registered assets. Edges point from a dependency to its dependent.
#[derive(Default)]
pub struct AssetGraph {
    graph: DiGraph<Arc<dyn Asset>, ()>,
    name_index: HashMap<String, NodeIndex>,
}

impl AssetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an asset. Names must be unique across the graph.
    pub fn register(&mut self, asset: Arc<dyn Asset>) -> Result<()> {
        let name = asset.spec().name();
        if self.name_index.contains_key(&name) {
            return Err(LakeError::DuplicateAsset(name));
        }
        let idx = self.graph.add_node(asset);
        self.name_index.insert(name.clone(), idx);

        let deps: Vec<NodeIndex> = self.graph[idx]
            .spec()
            .deps
            .iter()
            .filter_map(|dep| self.name_index.get(&dep.to_identifier()).copied())
            .collect();
        for dep in deps {
            self.graph.add_edge(dep, idx, ());
        }

        // Assets registered earlier may already name this one as a dependency.
        let dependents: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&other| other != idx)
            .filter(|&other| {
                self.graph[other]
                    .spec()
                    .deps
                    .iter()
                    .any(|dep| dep.to_identifier() == name)
            })
            .collect();
        for dependent in dependents {
            self.graph.add_edge(idx, dependent, ());
        }
        Ok(())
    }

    pub fn register_all(&mut self, assets: impl IntoIterator<Item = Arc<dyn Asset>>) -> Result<()> {
        assets.into_iter().try_for_each(|asset| self.register(asset))
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Asset>> {
        self.name_index.get(name).map(|&idx| &self.graph[idx])
    }

    /// Specs in registration order.
    pub fn specs(&self) -> Vec<&AssetSpec> {
        self.graph
            .node_indices()
            .map(|idx| self.graph[idx].spec())
            .collect()
    }

    /// Check that every dependency is registered and that there are no cycles.
    pub fn validate(&self) -> Result<()> {
        for spec in self.specs() {
            for dep in &spec.deps {
                if !self.name_index.contains_key(&dep.to_identifier()) {
                    return Err(LakeError::UnknownDependency {
                        asset: spec.name(),
                        dependency: dep.to_string(),
                    });
                }
            }
        }
        self.topological().map(|_| ())
    }

    fn topological(&self) -> Result<Vec<NodeIndex>> {
        toposort(&self.graph, None)
            .map_err(|cycle| LakeError::Cycle(self.graph[cycle.node_id()].spec().name()))
    }

    /// Selected assets, dependencies before dependents.
    pub fn execution_order(&self, selection: &AssetSelection) -> Result<Vec<Arc<dyn Asset>>> {
        self.validate()?;
        let selected = self.resolve(selection)?;
        Ok(self
            .topological()?
            .into_iter()
            .filter(|idx| selected.contains(idx))
            .map(|idx| Arc::clone(&self.graph[idx]))
            .collect())
    }

    fn resolve(&self, selection: &AssetSelection) -> Result<HashSet<NodeIndex>> {
        match selection {
            AssetSelection::All => Ok(self.graph.node_indices().collect()),
            AssetSelection::Keys(names) => names
                .iter()
                .map(|name| {
                    self.name_index
                        .get(name)
                        .copied()
                        .ok_or_else(|| LakeError::UnknownAsset(name.clone()))
                })
                .collect(),
            AssetSelection::Group(group) => Ok(self
                .graph
                .node_indices()
                .filter(|&idx| self.graph[idx].spec().group.as_deref() == Some(group.as_str()))
                .collect()),
            AssetSelection::Upstream(inner) => {
                let mut visited = HashSet::new();
                let mut stack: Vec<NodeIndex> = self.resolve(inner)?.into_iter().collect();
                while let Some(idx) = stack.pop() {
                    if visited.insert(idx) {
                        stack.extend(self.graph.neighbors_directed(idx, Direction::Incoming));
                    }
                }
                Ok(visited)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetContext, Tier};
    use crate::frame::Frame;
    use async_trait::async_trait;

    struct Stub(AssetSpec);

    #[async_trait]
    impl Asset for Stub {
        fn spec(&self) -> &AssetSpec {
            &self.0
        }

        async fn materialize(&self, _ctx: &AssetContext) -> Result<Option<Frame>> {
            Ok(None)
        }
    }

    fn stub(name: &str, deps: &[&str]) -> Arc<dyn Asset> {
        let spec = deps
            .iter()
            .fold(AssetSpec::new(name, Tier::Raw).group("test"), |spec, dep| spec.dep(*dep));
        Arc::new(Stub(spec))
    }

    fn names(order: &[Arc<dyn Asset>]) -> Vec<String> {
        order.iter().map(|a| a.spec().name()).collect()
    }

    #[test]
    fn test_order_respects_dependencies_registered_late() {
        let mut graph = AssetGraph::new();
        graph.register(stub("enriched", &["pbp", "players"])).unwrap();
        graph.register(stub("pbp", &[])).unwrap();
        graph.register(stub("players", &[])).unwrap();

        let order = names(&graph.execution_order(&AssetSelection::All).unwrap());
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(pos("pbp") < pos("enriched"));
        assert!(pos("players") < pos("enriched"));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut graph = AssetGraph::new();
        graph.register(stub("a", &[])).unwrap();
        let err = graph.register(stub("a", &[])).unwrap_err();
        assert!(matches!(err, LakeError::DuplicateAsset(name) if name == "a"));
    }

    #[test]
    fn test_unknown_dependency_is_reported() {
        let mut graph = AssetGraph::new();
        graph.register(stub("a", &["ghost"])).unwrap();
        let err = graph.validate().unwrap_err();
        assert!(matches!(err, LakeError::UnknownDependency { dependency, .. } if dependency == "ghost"));
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut graph = AssetGraph::new();
        graph.register(stub("a", &["b"])).unwrap();
        graph.register(stub("b", &["a"])).unwrap();
        assert!(matches!(graph.validate().unwrap_err(), LakeError::Cycle(_)));
    }

    #[test]
    fn test_key_selection_with_upstream() {
        let mut graph = AssetGraph::new();
        graph.register(stub("a", &[])).unwrap();
        graph.register(stub("b", &["a"])).unwrap();
        graph.register(stub("c", &["b"])).unwrap();
        graph.register(stub("unrelated", &[])).unwrap();

        let only = graph.execution_order(&AssetSelection::keys(["c"])).unwrap();
        assert_eq!(names(&only), vec!["c"]);

        let upstream = graph
            .execution_order(&AssetSelection::keys(["c"]).with_upstream())
            .unwrap();
        assert_eq!(names(&upstream), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unknown_key_selection_fails() {
        let mut graph = AssetGraph::new();
        graph.register(stub("a", &[])).unwrap();
        let err = graph
            .execution_order(&AssetSelection::keys(["nope"]))
            .err()
            .unwrap();
        assert!(matches!(err, LakeError::UnknownAsset(_)));
    }

    #[test]
    fn test_group_selection() {
        let mut graph = AssetGraph::new();
        graph.register(stub("a", &[])).unwrap();
        assert_eq!(graph.execution_order(&AssetSelection::Group("test".into())).unwrap().len(), 1);
        assert!(graph.execution_order(&AssetSelection::Group("other".into())).unwrap().is_empty());
    }
}
