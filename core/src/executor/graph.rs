use std::collections::{HashMap, HashSet};

use crate::error::GraphError;
use crate::executor::types::TaskLike;

/// Step dependency graph (DAG)
///
/// Cloning produces an independent working copy; the executor mutates a
/// clone and leaves the canonical graph untouched.
#[derive(Debug, Clone)]
pub struct StepGraph<T: TaskLike> {
    /// Step nodes: step_id -> Step
    pub nodes: HashMap<String, T>,

    /// Dependency edges: step_id -> list of direct dependencies
    pub edges: HashMap<String, Vec<String>>,

    /// Reverse edges: step_id -> list of steps that depend on it directly
    pub reverse_edges: HashMap<String, Vec<String>>,

    /// Original insertion order (for stable sorting)
    insertion_order: Vec<String>,
}

impl<T: TaskLike> Default for StepGraph<T> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            reverse_edges: HashMap::new(),
            insertion_order: Vec::new(),
        }
    }
}

impl<T: TaskLike> StepGraph<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct and validate a graph from a step list.
    pub fn from_tasks(tasks: &[T]) -> Result<Self, GraphError> {
        let mut graph = Self::new();

        for task in tasks {
            graph.add_node(task.clone())?;
        }

        for task in tasks {
            for dep in task.dependencies() {
                graph.add_dependency(task.id(), dep);
            }
        }

        graph.validate()?;
        Ok(graph)
    }

    pub fn add_node(&mut self, task: T) -> Result<(), GraphError> {
        let task_id = task.id().to_string();
        if self.nodes.contains_key(&task_id) {
            return Err(GraphError::DuplicateStepId(task_id));
        }

        self.nodes.insert(task_id.clone(), task);
        self.edges.entry(task_id.clone()).or_default();
        self.insertion_order.push(task_id);
        Ok(())
    }

    /// Record that `task_id` depends on `dep`.
    ///
    /// Unknown ids are accepted here and reported by [`validate`](Self::validate).
    pub fn add_dependency(&mut self, task_id: &str, dep: &str) {
        let deps = self.edges.entry(task_id.to_string()).or_default();
        if deps.iter().any(|d| d == dep) {
            return;
        }
        deps.push(dep.to_string());
        self.reverse_edges
            .entry(dep.to_string())
            .or_default()
            .push(task_id.to_string());
    }

    /// Validate dependency relationships
    pub fn validate(&self) -> Result<(), GraphError> {
        // Check all dependencies exist, in insertion order for stable errors
        for task_id in &self.insertion_order {
            for dep in self.direct_dependencies_of(task_id) {
                if !self.nodes.contains_key(dep) {
                    return Err(GraphError::UnknownDependency {
                        step_id: task_id.clone(),
                        missing_dep: dep.clone(),
                    });
                }
            }
        }

        // Detect circular dependencies
        if let Some(cycle) = self.detect_cycle() {
            return Err(GraphError::Cycle(cycle));
        }

        Ok(())
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.nodes.contains_key(task_id)
    }

    pub fn get(&self, task_id: &str) -> Option<&T> {
        self.nodes.get(task_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = &String> {
        self.insertion_order
            .iter()
            .filter(|id| self.nodes.contains_key(*id))
    }

    pub fn direct_dependencies_of(&self, task_id: &str) -> &[String] {
        self.edges.get(task_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn direct_dependants_of(&self, task_id: &str) -> &[String] {
        self.reverse_edges
            .get(task_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All transitive dependencies of a node, dependencies first.
    pub fn dependencies_of(&self, task_id: &str) -> Result<Vec<String>, GraphError> {
        if !self.contains(task_id) {
            return Err(GraphError::StepNotFound(task_id.to_string()));
        }
        let mut visited = HashSet::new();
        let mut out = Vec::new();
        for dep in self.direct_dependencies_of(task_id) {
            self.collect_dependencies(dep, &mut visited, &mut out);
        }
        Ok(out)
    }

    fn collect_dependencies(&self, node: &str, visited: &mut HashSet<String>, out: &mut Vec<String>) {
        if !visited.insert(node.to_string()) {
            return;
        }
        for dep in self.direct_dependencies_of(node) {
            self.collect_dependencies(dep, visited, out);
        }
        out.push(node.to_string());
    }

    /// All transitive dependants of a node, in breadth-first order.
    pub fn dependants_of(&self, task_id: &str) -> Result<Vec<String>, GraphError> {
        if !self.contains(task_id) {
            return Err(GraphError::StepNotFound(task_id.to_string()));
        }
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: Vec<&str> = vec![task_id];
        let mut out = Vec::new();
        while !queue.is_empty() {
            let current = queue.remove(0);
            for dependant in self.direct_dependants_of(current) {
                if self.contains(dependant) && visited.insert(dependant.as_str()) {
                    out.push(dependant.clone());
                    queue.push(dependant.as_str());
                }
            }
        }
        Ok(out)
    }

    /// Nodes with no remaining dependencies inside this graph.
    pub fn leaf_nodes(&self) -> Vec<String> {
        self.node_ids()
            .filter(|id| {
                self.direct_dependencies_of(id)
                    .iter()
                    .all(|dep| !self.contains(dep))
            })
            .cloned()
            .collect()
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, task_id: &str) -> Option<T> {
        let task = self.nodes.remove(task_id)?;

        if let Some(deps) = self.edges.remove(task_id) {
            for dep in deps {
                if let Some(dependants) = self.reverse_edges.get_mut(&dep) {
                    dependants.retain(|d| d != task_id);
                }
            }
        }
        if let Some(dependants) = self.reverse_edges.remove(task_id) {
            for dependant in dependants {
                if let Some(deps) = self.edges.get_mut(&dependant) {
                    deps.retain(|d| d != task_id);
                }
            }
        }
        self.insertion_order.retain(|id| id != task_id);

        Some(task)
    }

    /// Topological order of every node (dependencies before dependants).
    pub fn overall_order(&self) -> Result<Vec<String>, GraphError> {
        Ok(self.topological_stages()?.into_iter().flatten().collect())
    }

    /// Topological sort using Kahn's algorithm
    ///
    /// Returns stages where nodes in the same stage have no dependencies on
    /// each other.
    ///
    /// # Time Complexity
    ///
    /// O(V + E) where V = number of steps, E = number of dependencies
    pub fn topological_stages(&self) -> Result<Vec<Vec<String>>, GraphError> {
        let position: HashMap<&str, usize> = self
            .insertion_order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let by_insertion = |ids: &mut Vec<String>| {
            ids.sort_by_key(|id| position.get(id.as_str()).copied().unwrap_or(usize::MAX));
        };

        // edges[A] = [B, C] means A depends on B and C, so A's in-degree = 2
        let mut in_degree: HashMap<&str, usize> = self
            .nodes
            .keys()
            .map(|id| {
                let degree = self
                    .direct_dependencies_of(id)
                    .iter()
                    .filter(|dep| self.contains(dep))
                    .count();
                (id.as_str(), degree)
            })
            .collect();

        let mut stages: Vec<Vec<String>> = Vec::new();
        let mut current_stage: Vec<String> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(id, _)| id.to_string())
            .collect();
        by_insertion(&mut current_stage);

        let mut processed = 0;

        while !current_stage.is_empty() {
            processed += current_stage.len();

            let mut next_stage = Vec::new();
            for task_id in &current_stage {
                for dependent in self.direct_dependants_of(task_id) {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            next_stage.push(dependent.clone());
                        }
                    }
                }
            }
            by_insertion(&mut next_stage);

            stages.push(std::mem::replace(&mut current_stage, next_stage));
        }

        // Verify all nodes processed (no cycles)
        if processed != self.nodes.len() {
            return Err(GraphError::Cycle(
                "Unable to complete topological sort (cycle detected)".to_string(),
            ));
        }

        Ok(stages)
    }

    /// Detect circular dependencies using DFS
    fn detect_cycle(&self) -> Option<String> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for task_id in &self.insertion_order {
            if !visited.contains(task_id) && self.dfs_cycle(task_id, &mut visited, &mut stack) {
                return Some(format_cycle_path(&stack));
            }
        }

        None
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
    ) -> bool {
        visited.insert(node.to_string());
        stack.push(node.to_string());

        for dep in self.direct_dependencies_of(node) {
            // Check if dependency is in current path (cycle detected)
            if let Some(pos) = stack.iter().position(|x| x == dep) {
                stack.push(dep.clone());
                *stack = stack[pos..].to_vec();
                return true;
            }

            // Recursively check unvisited dependencies
            if !visited.contains(dep) && self.dfs_cycle(dep, visited, stack) {
                return true;
            }
        }

        stack.pop();
        false
    }
}

fn format_cycle_path(stack: &[String]) -> String {
    stack.join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone)]
    struct Node {
        id: String,
        deps: Vec<String>,
    }

    impl TaskLike for Node {
        fn id(&self) -> &str {
            &self.id
        }

        fn dependencies(&self) -> &[String] {
            &self.deps
        }
    }

    fn task(id: &str, deps: &[&str]) -> Node {
        Node {
            id: id.to_string(),
            deps: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    fn assert_topological(graph: &StepGraph<Node>, order: &[String]) {
        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        assert_eq!(position.len(), graph.len());
        for id in graph.node_ids() {
            for dep in graph.direct_dependencies_of(id) {
                assert!(
                    position[dep.as_str()] < position[id.as_str()],
                    "{dep} must come before {id}"
                );
            }
        }
    }

    #[test]
    fn overall_order_is_topological() {
        let graph = StepGraph::from_tasks(&[
            task("d", &["b", "c"]),
            task("b", &["a"]),
            task("c", &["a"]),
            task("a", &[]),
            task("e", &[]),
        ])
        .unwrap();

        let order = graph.overall_order().unwrap();
        assert_topological(&graph, &order);
        assert_eq!(order, vec!["a", "e", "b", "c", "d"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let err = StepGraph::from_tasks(&[
            task("a", &["c"]),
            task("b", &["a"]),
            task("c", &["b"]),
        ])
        .unwrap_err();
        match err {
            GraphError::Cycle(path) => assert!(path.contains("a") && path.contains("->")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let err = StepGraph::from_tasks(&[task("a", &["a"])]).unwrap_err();
        assert!(matches!(err, GraphError::Cycle(_)));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let err = StepGraph::from_tasks(&[task("a", &[]), task("b", &["missing"])]).unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownDependency {
                step_id: "b".to_string(),
                missing_dep: "missing".to_string(),
            }
        );
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let err = StepGraph::from_tasks(&[task("a", &[]), task("a", &[])]).unwrap_err();
        assert_eq!(err, GraphError::DuplicateStepId("a".to_string()));
    }

    #[test]
    fn transitive_queries() {
        let graph = StepGraph::from_tasks(&[
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["b"]),
            task("x", &[]),
        ])
        .unwrap();

        assert_eq!(graph.dependencies_of("c").unwrap(), vec!["a", "b"]);
        assert_eq!(graph.dependants_of("a").unwrap(), vec!["b", "c"]);
        assert!(graph.dependants_of("x").unwrap().is_empty());
        assert_eq!(graph.leaf_nodes(), vec!["a", "x"]);
        assert!(graph.dependencies_of("nope").is_err());
    }

    #[test]
    fn removing_from_a_clone_leaves_original_intact() {
        let graph =
            StepGraph::from_tasks(&[task("a", &[]), task("b", &["a"]), task("c", &["b"])]).unwrap();

        let mut working = graph.clone();
        assert!(working.remove_node("a").is_some());
        assert_eq!(working.leaf_nodes(), vec!["b"]);
        assert!(working.remove_node("a").is_none());

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.leaf_nodes(), vec!["a"]);
        assert_eq!(graph.direct_dependencies_of("b"), &["a".to_string()]);
    }
}
