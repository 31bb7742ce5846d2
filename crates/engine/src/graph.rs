//! Dependency graph: tasks plus directed upstream → downstream edges.
//!
//! Rules enforced by `validate`, before anything executes:
//! 1. Task IDs must be unique within the graph.
//! 2. Every edge must reference declared task IDs (both endpoints).
//! 3. The directed graph must be acyclic (topological sort must succeed).
//!
//! The graph is immutable once a run starts; per-task state lives in the
//! scheduler and is the only thing that changes during execution.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::GraphError;
use crate::models::{Task, TaskState};

/// Tasks in declaration order plus the dependency edge set.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    tasks: Vec<Task>,
    edges: Vec<(String, String)>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a task. Declaration order is the scheduling tie-break order.
    pub fn add_task(&mut self, task: Task) -> &mut Self {
        self.tasks.push(task);
        self
    }

    /// Declare that `downstream` may only run after `upstream` succeeds.
    pub fn add_dependency(
        &mut self,
        upstream: impl Into<String>,
        downstream: impl Into<String>,
    ) -> &mut Self {
        self.edges.push((upstream.into(), downstream.into()));
        self
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Validate uniqueness, edge endpoints, and acyclicity.
    ///
    /// # Errors
    /// - [`GraphError::DuplicateTask`] if two tasks share an ID.
    /// - [`GraphError::UnknownTask`] if an edge references a missing ID.
    /// - [`GraphError::Cycle`] if the graph is not acyclic.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut seen: HashSet<&str> = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.id.as_str()) {
                return Err(GraphError::DuplicateTask(task.id.clone()));
            }
        }

        for (upstream, downstream) in &self.edges {
            if !seen.contains(upstream.as_str()) {
                return Err(GraphError::UnknownTask {
                    task_id: upstream.clone(),
                    side: "upstream",
                });
            }
            if !seen.contains(downstream.as_str()) {
                return Err(GraphError::UnknownTask {
                    task_id: downstream.clone(),
                    side: "downstream",
                });
            }
        }

        // Kahn's algorithm; if we can't visit every task there is a cycle.
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for task in &self.tasks {
            in_degree.entry(task.id.as_str()).or_insert(0);
            adjacency.entry(task.id.as_str()).or_default();
        }
        for (upstream, downstream) in &self.edges {
            adjacency
                .entry(upstream.as_str())
                .or_default()
                .push(downstream.as_str());
            *in_degree.entry(downstream.as_str()).or_insert(0) += 1;
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut visited = 0usize;
        while let Some(task_id) = queue.pop_front() {
            visited += 1;
            if let Some(neighbours) = adjacency.get(task_id) {
                for &neighbour in neighbours {
                    let degree = in_degree.entry(neighbour).or_insert(0);
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(neighbour);
                    }
                }
            }
        }

        if visited != self.tasks.len() {
            return Err(GraphError::Cycle);
        }

        Ok(())
    }

    /// Direct upstream IDs of a task.
    pub fn upstream_of<'a>(&'a self, task_id: &'a str) -> impl Iterator<Item = &'a str> {
        self.edges
            .iter()
            .filter(move |(_, downstream)| downstream == task_id)
            .map(|(upstream, _)| upstream.as_str())
    }

    /// IDs whose state is Pending and whose every upstream is Success,
    /// in declaration order.
    ///
    /// Recomputed after every state transition rather than derived from a
    /// static order: a permanent failure makes downstream nodes unreachable,
    /// which a one-shot topological sort cannot express.
    pub fn ready_set(&self, states: &HashMap<String, TaskState>) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|task| states.get(&task.id) == Some(&TaskState::Pending))
            .filter(|task| {
                self.upstream_of(&task.id)
                    .all(|up| states.get(up) == Some(&TaskState::Success))
            })
            .map(|task| task.id.clone())
            .collect()
    }

    /// Every task reachable from `task_id` via dependency edges, in
    /// breadth-first order (the UpstreamFailed cascade).
    pub fn downstream_closure(&self, task_id: &str) -> Vec<String> {
        let mut closure = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(task_id);
        seen.insert(task_id);

        while let Some(current) = queue.pop_front() {
            for (upstream, downstream) in &self.edges {
                if upstream == current && seen.insert(downstream.as_str()) {
                    closure.push(downstream.clone());
                    queue.push_back(downstream.as_str());
                }
            }
        }

        closure
    }
}
