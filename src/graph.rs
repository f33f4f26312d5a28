use std::collections::HashMap;
use std::fmt::Display;

use crate::error::{GraphError, KumitateError};
use crate::task::{Prerequisite, TaskId, TaskNode};
use crate::toolchain::Scheduler;

/// The complete set of generated tasks, in creation order.
///
/// Construction is strictly forward: a node may only reference generated
/// tasks that are already part of the graph. Scheduler-facing names are
/// unique too, two distinct ids never render to the same name.
#[derive(Debug, Default)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    index: HashMap<TaskId, usize>,
    names: HashMap<String, usize>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, node: TaskNode) -> Result<(), GraphError> {
        if self.index.contains_key(node.id()) {
            return Err(GraphError::DuplicateTask(node.id().clone()));
        }

        let name = node.id().to_string();
        if let Some(&i) = self.names.get(&name) {
            return Err(GraphError::NameClash {
                task: node.id().clone(),
                existing: self.nodes[i].id().clone(),
            });
        }

        if let Some(missing) = node.prerequisites().tasks().find(|id| !self.contains(id)) {
            return Err(GraphError::MissingPrerequisite {
                task: node.id().clone(),
                prerequisite: missing.clone(),
            });
        }

        tracing::debug!(task = %name, "adding task");
        self.index.insert(node.id().clone(), self.nodes.len());
        self.names.insert(name, self.nodes.len());
        self.nodes.push(node);

        Ok(())
    }

    pub fn get(&self, id: &TaskId) -> Option<&TaskNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Looks a task up by its scheduler-facing name, e.g. `app:code:verify`.
    pub fn find(&self, name: &str) -> Option<&TaskNode> {
        self.names.get(name).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TaskNode> {
        self.nodes.iter()
    }

    /// Scheduler-facing names of every task, in creation order.
    pub fn names(&self) -> Vec<String> {
        self.nodes.iter().map(|node| node.id().to_string()).collect()
    }

    /// All tasks belonging to a single bundle.
    pub fn bundle<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a TaskNode> + 'a {
        self.nodes
            .iter()
            .filter(move |node| node.id().bundle() == Some(name))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Hands every node over to the scheduler, in creation order.
    pub fn register(&self, scheduler: &mut dyn Scheduler) -> Result<(), KumitateError> {
        for node in &self.nodes {
            let name = node.id().to_string();
            let prerequisites = node.prerequisites().iter().map(ToString::to_string).collect();

            scheduler
                .register(name.clone(), prerequisites, node.action().cloned())
                .map_err(|err| KumitateError::Register(name, err))?;
        }

        Ok(())
    }
}

impl<'a> IntoIterator for &'a TaskGraph {
    type Item = &'a TaskNode;
    type IntoIter = std::slice::Iter<'a, TaskNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

/// Renders the graph as a Mermaid flowchart.
impl Display for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "graph LR")?;

        for (i, node) in self.nodes.iter().enumerate() {
            writeln!(f, "    {i}[\"{}\"]", node.id())?;
        }

        let mut external = Vec::new();

        for (i, node) in self.nodes.iter().enumerate() {
            for prerequisite in node.prerequisites() {
                match prerequisite {
                    Prerequisite::Task(id) => {
                        let source = self.index[id];
                        writeln!(f, "    {source} --> {i}")?;
                    }
                    Prerequisite::External(id) => {
                        let name = id.replace('"', "\\\"");
                        if !external.contains(&name) {
                            writeln!(f, "    ext{}([\"{name}\"])", external.len())?;
                            external.push(name.clone());
                        }
                        let source = external.iter().position(|e| *e == name).unwrap_or(0);
                        writeln!(f, "    ext{source} --> {i}")?;
                    }
                }
            }
        }

        Ok(())
    }
}
