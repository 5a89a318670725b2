//! Dependency graph construction and cycle analysis.
//!
//! The graph is built over schedulable activities only: summaries are
//! presentation, so an edge touching a summary is expanded to the summary's
//! leaf descendants before scheduling. Both adjacency directions are kept
//! and rebuilt from scratch after any edge mutation; the engine simply
//! constructs a fresh graph.

use std::collections::{HashMap, HashSet, VecDeque};

use chronoplan_core::{ActivityId, ActivityMap, Dependency, DependencyKind, EngineError};

/// A resolved leaf-to-leaf edge
#[derive(Debug, Clone, PartialEq)]
pub struct GraphEdge {
    /// Predecessor activity id
    pub predecessor: ActivityId,
    /// Successor activity id
    pub successor: ActivityId,
    /// Link type
    pub kind: DependencyKind,
    /// Lag in working days (negative for lead time)
    pub lag: i64,
}

/// Forward and reverse adjacency over schedulable activities
#[derive(Debug, Default)]
pub struct DependencyGraph {
    successors: HashMap<ActivityId, Vec<GraphEdge>>,
    predecessors: HashMap<ActivityId, Vec<GraphEdge>>,
    /// Schedulable activity ids in insertion order
    order: Vec<ActivityId>,
}

impl DependencyGraph {
    /// Build the graph from the activity collection and dependency list.
    /// Edges referencing summaries are expanded to their leaf descendants;
    /// edges referencing unknown activities are dropped (the validator
    /// reports those as errors before scheduling).
    pub fn build(activities: &ActivityMap, dependencies: &[Dependency]) -> Self {
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for activity in activities.values() {
            if let Some(parent) = &activity.parent {
                children.entry(parent.as_str()).or_default().push(&activity.id);
            }
        }

        let order: Vec<ActivityId> = activities
            .values()
            .filter(|a| !a.is_summary())
            .map(|a| a.id.clone())
            .collect();

        let mut successors: HashMap<ActivityId, Vec<GraphEdge>> = HashMap::new();
        let mut predecessors: HashMap<ActivityId, Vec<GraphEdge>> = HashMap::new();
        for id in &order {
            successors.insert(id.clone(), Vec::new());
            predecessors.insert(id.clone(), Vec::new());
        }

        for dep in dependencies {
            let preds = expand_endpoint(&dep.predecessor, activities, &children);
            let succs = expand_endpoint(&dep.successor, activities, &children);
            for pred in &preds {
                for succ in &succs {
                    if pred == succ {
                        continue;
                    }
                    let edge = GraphEdge {
                        predecessor: pred.clone(),
                        successor: succ.clone(),
                        kind: dep.kind,
                        lag: dep.lag,
                    };
                    if let Some(out) = successors.get_mut(pred) {
                        out.push(edge.clone());
                    }
                    if let Some(inc) = predecessors.get_mut(succ) {
                        inc.push(edge);
                    }
                }
            }
        }

        Self {
            successors,
            predecessors,
            order,
        }
    }

    /// Schedulable activity ids in insertion order
    pub fn order(&self) -> &[ActivityId] {
        &self.order
    }

    /// Incoming edges of an activity
    pub fn predecessors(&self, id: &str) -> &[GraphEdge] {
        match self.predecessors.get(id) {
            Some(edges) => edges,
            None => &[],
        }
    }

    /// Outgoing edges of an activity
    pub fn successors(&self, id: &str) -> &[GraphEdge] {
        match self.successors.get(id) {
            Some(edges) => edges,
            None => &[],
        }
    }

    /// Check whether adding `predecessor -> successor` would close a cycle.
    /// Walks the existing graph from the proposed successor; if the proposed
    /// predecessor is reachable, returns the offending path (closed on the
    /// predecessor) for diagnostics.
    pub fn would_create_cycle(
        &self,
        predecessor: &str,
        successor: &str,
    ) -> Option<Vec<ActivityId>> {
        if predecessor == successor {
            return Some(vec![predecessor.to_string(), predecessor.to_string()]);
        }
        let mut path = vec![successor.to_string()];
        let mut visited = HashSet::new();
        if self.reach(successor, predecessor, &mut visited, &mut path) {
            let mut cycle = vec![predecessor.to_string()];
            cycle.extend(path);
            return Some(cycle);
        }
        None
    }

    fn reach(
        &self,
        from: &str,
        target: &str,
        visited: &mut HashSet<ActivityId>,
        path: &mut Vec<ActivityId>,
    ) -> bool {
        if from == target {
            return true;
        }
        if !visited.insert(from.to_string()) {
            return false;
        }
        for edge in self.successors(from) {
            path.push(edge.successor.clone());
            if self.reach(&edge.successor, target, visited, path) {
                return true;
            }
            path.pop();
        }
        false
    }

    /// Topological order over the schedulable activities (Kahn's algorithm).
    /// Ties break by the original insertion order, which makes every solver
    /// run deterministic. A cycle yields `EngineError::Cycle` with the
    /// offending path.
    pub fn topo_order(&self) -> Result<Vec<ActivityId>, EngineError> {
        let position: HashMap<&ActivityId, usize> =
            self.order.iter().enumerate().map(|(i, id)| (id, i)).collect();

        let mut in_degree: HashMap<&ActivityId, usize> =
            self.order.iter().map(|id| (id, 0)).collect();
        for edges in self.successors.values() {
            for edge in edges {
                if let Some(deg) = in_degree.get_mut(&edge.successor) {
                    *deg += 1;
                }
            }
        }

        // Ready set kept sorted by insertion position
        let mut ready: VecDeque<&ActivityId> = self
            .order
            .iter()
            .filter(|id| in_degree.get(*id) == Some(&0))
            .collect();

        let mut sorted = Vec::with_capacity(self.order.len());
        while let Some(id) = ready.pop_front() {
            sorted.push(id.clone());
            let mut unlocked: Vec<&ActivityId> = Vec::new();
            for edge in self.successors(id) {
                if let Some((key, deg)) = in_degree.get_key_value(&edge.successor).map(|(k, v)| (*k, *v)) {
                    if deg > 0 {
                        let deg = in_degree.get_mut(&edge.successor).unwrap();
                        *deg -= 1;
                        if *deg == 0 {
                            unlocked.push(key);
                        }
                    }
                }
            }
            unlocked.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));
            for id in unlocked {
                ready.push_back(id);
            }
        }

        if sorted.len() != self.order.len() {
            let cycle = self.find_cycle_among(
                self.order
                    .iter()
                    .filter(|id| !sorted.contains(*id))
                    .cloned()
                    .collect(),
            );
            return Err(EngineError::Cycle(cycle));
        }

        Ok(sorted)
    }

    /// Extract one concrete cycle path from the given residue of Kahn's
    /// algorithm, for diagnostics.
    fn find_cycle_among(&self, remaining: Vec<ActivityId>) -> Vec<ActivityId> {
        let residue: HashSet<&ActivityId> = remaining.iter().collect();
        let Some(start) = remaining.first() else {
            return Vec::new();
        };

        let mut path = vec![start.clone()];
        let mut seen: HashMap<ActivityId, usize> = HashMap::new();
        seen.insert(start.clone(), 0);
        let mut current = start.clone();
        loop {
            let Some(next) = self
                .successors(&current)
                .iter()
                .find(|e| residue.contains(&e.successor))
            else {
                return remaining;
            };
            if let Some(&pos) = seen.get(&next.successor) {
                let mut cycle: Vec<ActivityId> = path[pos..].to_vec();
                cycle.push(next.successor.clone());
                return cycle;
            }
            seen.insert(next.successor.clone(), path.len());
            path.push(next.successor.clone());
            current = path.last().expect("path is non-empty").clone();
        }
    }
}

/// Resolve a dependency endpoint to schedulable activity ids: a leaf maps to
/// itself, a summary expands to every leaf underneath it (recursively).
fn expand_endpoint(
    id: &str,
    activities: &ActivityMap,
    children: &HashMap<&str, Vec<&str>>,
) -> Vec<ActivityId> {
    let Some(activity) = activities.get(id) else {
        return Vec::new();
    };
    if !activity.is_summary() {
        return vec![activity.id.clone()];
    }
    let mut leaves = Vec::new();
    let mut stack: Vec<&str> = children.get(id).cloned().unwrap_or_default();
    while let Some(node) = stack.pop() {
        let Some(activity) = activities.get(node) else {
            continue;
        };
        if activity.is_summary() {
            stack.extend(children.get(node).cloned().unwrap_or_default());
        } else {
            leaves.push(activity.id.clone());
        }
    }
    leaves.sort();
    leaves
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chronoplan_core::{Activity, Dependency};
    use pretty_assertions::assert_eq;

    fn plan(tasks: Vec<Activity>) -> ActivityMap {
        let mut map = ActivityMap::new();
        for task in tasks {
            map.insert(task.id.clone(), task);
        }
        map
    }

    #[test]
    fn adjacency_both_directions() {
        let activities = plan(vec![Activity::new("a"), Activity::new("b")]);
        let deps = vec![Dependency::new("d1", "a", "b")];
        let graph = DependencyGraph::build(&activities, &deps);

        assert_eq!(graph.successors("a").len(), 1);
        assert_eq!(graph.successors("a")[0].successor, "b");
        assert_eq!(graph.predecessors("b").len(), 1);
        assert_eq!(graph.predecessors("b")[0].predecessor, "a");
        assert!(graph.predecessors("a").is_empty());
        assert!(graph.successors("b").is_empty());
    }

    #[test]
    fn summaries_are_not_scheduled() {
        let activities = plan(vec![
            Activity::new("phase").summary(),
            Activity::new("a").parent("phase"),
            Activity::new("b").parent("phase"),
        ]);
        let graph = DependencyGraph::build(&activities, &[]);
        assert_eq!(graph.order(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn summary_endpoint_expands_to_leaves() {
        let activities = plan(vec![
            Activity::new("phase").summary(),
            Activity::new("a").parent("phase"),
            Activity::new("b").parent("phase"),
            Activity::new("c"),
        ]);
        let deps = vec![Dependency::new("d1", "phase", "c")];
        let graph = DependencyGraph::build(&activities, &deps);

        let preds: Vec<&str> = graph
            .predecessors("c")
            .iter()
            .map(|e| e.predecessor.as_str())
            .collect();
        assert_eq!(preds, vec!["a", "b"]);
    }

    #[test]
    fn topo_order_respects_edges_and_insertion() {
        let activities = plan(vec![
            Activity::new("c"),
            Activity::new("a"),
            Activity::new("b"),
        ]);
        let deps = vec![Dependency::new("d1", "a", "c")];
        let graph = DependencyGraph::build(&activities, &deps);

        // a must come before c; the c/a/b insertion order breaks the tie
        // between the two roots a and b.
        let order = graph.topo_order().unwrap();
        assert_eq!(order, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn topo_order_reports_cycle_path() {
        let activities = plan(vec![
            Activity::new("a"),
            Activity::new("b"),
            Activity::new("c"),
        ]);
        let deps = vec![
            Dependency::new("d1", "a", "b"),
            Dependency::new("d2", "b", "c"),
            Dependency::new("d3", "c", "a"),
        ];
        let graph = DependencyGraph::build(&activities, &deps);

        match graph.topo_order() {
            Err(EngineError::Cycle(path)) => {
                assert_eq!(path.first(), path.last());
                assert!(path.len() >= 3);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn would_create_cycle_detects_back_edge() {
        let activities = plan(vec![
            Activity::new("a"),
            Activity::new("b"),
            Activity::new("c"),
        ]);
        let deps = vec![
            Dependency::new("d1", "a", "b"),
            Dependency::new("d2", "b", "c"),
        ];
        let graph = DependencyGraph::build(&activities, &deps);

        // c -> a closes a cycle through the chain a -> b -> c
        let path = graph.would_create_cycle("c", "a").expect("cycle expected");
        assert_eq!(path.first().map(String::as_str), Some("c"));
        assert_eq!(path.last().map(String::as_str), Some("c"));

        // a -> c is just a shortcut, no cycle
        assert!(graph.would_create_cycle("a", "c").is_none());

        // Self-loop
        assert!(graph.would_create_cycle("a", "a").is_some());
    }

    #[test]
    fn add_then_remove_restores_graph() {
        let activities = plan(vec![Activity::new("a"), Activity::new("b")]);
        let before = DependencyGraph::build(&activities, &[]);

        let mut deps = vec![Dependency::new("d1", "a", "b")];
        deps.retain(|d| d.id != "d1");
        let after = DependencyGraph::build(&activities, &deps);

        assert_eq!(before.successors("a"), after.successors("a"));
        assert_eq!(before.predecessors("b"), after.predecessors("b"));
    }
}
