//! Template dependency graph
//!
//! Directed graph keyed by template id, edge = "depends on". The graph is
//! the sole authority for cycle detection: an update that would close a
//! cycle is rejected and nothing is committed. Fill order comes from a
//! depth-first topological sort over an id's dependency closure.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::error::TemplateError;

/// Directed dependency graph over template ids
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Outgoing edges: id -> ids it depends on
    edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute the outgoing edges for an id, rejecting cycles
    ///
    /// On rejection the graph is left exactly as before the call.
    pub fn add_or_update(&mut self, id: &str, deps: &[String]) -> Result<(), TemplateError> {
        let previous = self.edges.insert(id.to_string(), deps.to_vec());

        if let Some(cycle) = self.find_cycle() {
            // Roll back: a new edge that closes a cycle commits nothing
            match previous {
                Some(old) => {
                    self.edges.insert(id.to_string(), old);
                }
                None => {
                    self.edges.remove(id);
                }
            }
            debug!(%id, ?cycle, "rejected dependency update closing a cycle");
            return Err(TemplateError::CyclicDependency { cycle });
        }

        Ok(())
    }

    /// Drop an id and its outgoing edges
    pub fn remove(&mut self, id: &str) {
        self.edges.remove(id);
    }

    /// Direct dependencies of an id
    pub fn deps_of(&self, id: &str) -> &[String] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Transitive closure of templates affected by a change to `id`
    ///
    /// Sorted ascending so callers render deterministic warnings.
    pub fn dependents(&self, id: &str) -> Vec<String> {
        let mut affected = BTreeSet::new();
        let mut frontier = vec![id.to_string()];

        while let Some(current) = frontier.pop() {
            for (candidate, deps) in &self.edges {
                if deps.iter().any(|d| d == &current) && affected.insert(candidate.clone()) {
                    frontier.push(candidate.clone());
                }
            }
        }

        affected.into_iter().collect()
    }

    /// Topological order over `id`'s dependency closure, dependencies
    /// first and `id` itself last
    pub fn fill_order(&self, id: &str) -> Result<Vec<String>, TemplateError> {
        if let Some(cycle) = self.find_cycle_from(id) {
            return Err(TemplateError::CyclicDependency { cycle });
        }

        let mut visited = HashSet::new();
        let mut order = Vec::new();
        self.topo_dfs(id, &mut visited, &mut order);
        Ok(order)
    }

    /// DFS post-order: dependencies land before their dependents
    fn topo_dfs(&self, id: &str, visited: &mut HashSet<String>, order: &mut Vec<String>) {
        if !visited.insert(id.to_string()) {
            return;
        }
        for dep in self.deps_of(id) {
            self.topo_dfs(dep, visited, order);
        }
        order.push(id.to_string());
    }

    /// Find any cycle in the whole graph
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();

        for start in self.edges.keys() {
            if visited.contains(start.as_str()) {
                continue;
            }
            let mut rec_stack = HashSet::new();
            let mut path = Vec::new();
            if self.cycle_dfs(start, &mut visited, &mut rec_stack, &mut path) {
                return Some(path);
            }
        }

        None
    }

    /// Find a cycle reachable from a specific id
    fn find_cycle_from(&self, id: &str) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();
        if self.cycle_dfs(id, &mut visited, &mut rec_stack, &mut path) {
            return Some(path);
        }
        None
    }

    /// DFS helper for cycle detection; on detection `path` holds the cycle
    fn cycle_dfs(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> bool {
        visited.insert(node.to_string());
        rec_stack.insert(node.to_string());
        path.push(node.to_string());

        for dep in self.deps_of(node) {
            if !visited.contains(dep.as_str()) {
                if self.edges.contains_key(dep.as_str()) && self.cycle_dfs(dep, visited, rec_stack, path) {
                    return true;
                }
            } else if rec_stack.contains(dep.as_str()) {
                path.push(dep.clone());
                return true;
            }
        }

        rec_stack.remove(node);
        path.pop();
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_or_update("a", &[]).unwrap();
        graph.add_or_update("b", &deps(&["a"])).unwrap();
        graph.add_or_update("c", &deps(&["a", "b"])).unwrap();
        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn test_cycle_rejected_and_rolled_back() {
        let mut graph = DependencyGraph::new();
        graph.add_or_update("a", &deps(&["b"])).unwrap();
        graph.add_or_update("b", &[]).unwrap();

        let err = graph.add_or_update("b", &deps(&["a"])).unwrap_err();
        assert!(matches!(err, TemplateError::CyclicDependency { .. }));

        // Rolled back: b keeps its previous (empty) edge set
        assert!(graph.deps_of("b").is_empty());
        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn test_new_node_closing_cycle_is_not_inserted() {
        let mut graph = DependencyGraph::new();
        graph.add_or_update("a", &deps(&["b"])).unwrap();

        // b is unknown until now; inserting it with an edge back to a closes the loop
        let err = graph.add_or_update("b", &deps(&["a"])).unwrap_err();
        assert!(matches!(err, TemplateError::CyclicDependency { .. }));
        assert!(graph.deps_of("b").is_empty());
    }

    #[test]
    fn test_self_cycle_rejected() {
        let mut graph = DependencyGraph::new();
        let err = graph.add_or_update("a", &deps(&["a"])).unwrap_err();
        assert!(matches!(err, TemplateError::CyclicDependency { .. }));
    }

    #[test]
    fn test_transitive_cycle_rejected() {
        let mut graph = DependencyGraph::new();
        graph.add_or_update("a", &deps(&["b"])).unwrap();
        graph.add_or_update("b", &deps(&["c"])).unwrap();
        let err = graph.add_or_update("c", &deps(&["a"])).unwrap_err();

        match err {
            TemplateError::CyclicDependency { cycle } => {
                assert!(cycle.len() >= 3);
            }
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_dependents_transitive() {
        let mut graph = DependencyGraph::new();
        graph.add_or_update("base", &[]).unwrap();
        graph.add_or_update("mid", &deps(&["base"])).unwrap();
        graph.add_or_update("top", &deps(&["mid"])).unwrap();
        graph.add_or_update("other", &[]).unwrap();

        assert_eq!(graph.dependents("base"), vec!["mid".to_string(), "top".to_string()]);
        assert!(graph.dependents("top").is_empty());
    }

    #[test]
    fn test_fill_order_dependencies_first() {
        let mut graph = DependencyGraph::new();
        graph.add_or_update("base", &[]).unwrap();
        graph.add_or_update("mid", &deps(&["base"])).unwrap();
        graph.add_or_update("top", &deps(&["mid", "base"])).unwrap();

        let order = graph.fill_order("top").unwrap();
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();

        assert!(pos("base") < pos("mid"));
        assert!(pos("mid") < pos("top"));
        assert_eq!(order.last().map(String::as_str), Some("top"));
    }

    #[test]
    fn test_fill_order_diamond() {
        let mut graph = DependencyGraph::new();
        graph.add_or_update("a", &[]).unwrap();
        graph.add_or_update("b", &deps(&["a"])).unwrap();
        graph.add_or_update("c", &deps(&["a"])).unwrap();
        graph.add_or_update("d", &deps(&["b", "c"])).unwrap();

        let order = graph.fill_order("d").unwrap();
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();

        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_fill_order_ignores_unrelated_nodes() {
        let mut graph = DependencyGraph::new();
        graph.add_or_update("a", &[]).unwrap();
        graph.add_or_update("b", &deps(&["a"])).unwrap();
        graph.add_or_update("island", &[]).unwrap();

        let order = graph.fill_order("b").unwrap();
        assert_eq!(order, vec!["a".to_string(), "b".to_string()]);
    }
}
