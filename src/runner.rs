//! A small in-process scheduler.
//!
//! [`LocalScheduler`] collects the registrations produced by
//! [`crate::generate`] and runs the prerequisite closure of a requested task
//! on the `rayon` thread pool.
mod diagnostics;

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::channel;
use std::time::{Duration, Instant};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::error::RunError;
use crate::task::Action;
use crate::toolchain::Scheduler;
use crate::utils::{as_overhead, get_style_run, get_style_task};

pub use diagnostics::{Diagnostics, TaskExecution};

struct Registration {
    prerequisites: Vec<String>,
    action: Option<Action>,
}

/// Scheduler keeping every registration in memory.
///
/// Registering a name again replaces the earlier definition but keeps its
/// original position.
#[derive(Default)]
pub struct LocalScheduler {
    order: Vec<String>,
    tasks: HashMap<String, Registration>,
}

impl Scheduler for LocalScheduler {
    fn register(
        &mut self,
        id: String,
        prerequisites: Vec<String>,
        action: Option<Action>,
    ) -> anyhow::Result<()> {
        let mut unique = Vec::with_capacity(prerequisites.len());
        for prerequisite in prerequisites {
            if !unique.contains(&prerequisite) {
                unique.push(prerequisite);
            }
        }

        let registration = Registration {
            prerequisites: unique,
            action,
        };

        if self.tasks.insert(id.clone(), registration).is_some() {
            tracing::debug!(task = %id, "replacing task definition");
        } else {
            self.order.push(id);
        }

        Ok(())
    }
}

impl LocalScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered names, in first registration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn prerequisites(&self, name: &str) -> Option<&[String]> {
        self.tasks.get(name).map(|task| task.prerequisites.as_slice())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Runs `target` and everything it transitively requires.
    ///
    /// Missing tasks and cycles are reported before anything runs. A failing
    /// task prevents its dependents from starting, unrelated tasks still run
    /// to completion.
    pub fn run(&self, target: &str) -> Result<Diagnostics, RunError> {
        let s = Instant::now();
        let closure = self.closure(target)?;

        let mut graph = DiGraph::<&str, ()>::with_capacity(closure.len(), 0);
        let nodes: HashMap<&str, NodeIndex> = closure
            .iter()
            .map(|&name| (name, graph.add_node(name)))
            .collect();

        for &name in &closure {
            for prerequisite in &self.tasks[name].prerequisites {
                graph.add_edge(nodes[prerequisite.as_str()], nodes[name], ());
            }
        }

        petgraph::algo::toposort(&graph, None)
            .map_err(|cycle| RunError::Cycle(graph[cycle.node_id()].to_string()))?;

        let diagnostics = self.execute(&graph);

        if diagnostics.is_success() {
            tracing::info!("Finished {target} {}", as_overhead(s));
            Ok(diagnostics)
        } else {
            Err(RunError::Failed(Box::new(diagnostics)))
        }
    }

    /// Names reachable from `target` through prerequisites, `target` first.
    fn closure<'a>(&'a self, target: &str) -> Result<Vec<&'a str>, RunError> {
        let Some((name, _)) = self.tasks.get_key_value(target) else {
            return Err(RunError::UnknownTask(target.to_string()));
        };

        let mut seen = HashSet::new();
        let mut stack = vec![name.as_str()];
        let mut found = Vec::new();

        while let Some(name) = stack.pop() {
            if !seen.insert(name) {
                continue;
            }
            found.push(name);

            for prerequisite in &self.tasks[name].prerequisites {
                let Some((key, _)) = self.tasks.get_key_value(prerequisite) else {
                    return Err(RunError::UnknownPrerequisite {
                        task: name.to_string(),
                        prerequisite: prerequisite.clone(),
                    });
                };
                stack.push(key.as_str());
            }
        }

        Ok(found)
    }

    /// Executes the graph using the `rayon` thread pool. A task is spawned as
    /// soon as every one of its prerequisites has succeeded, results come back
    /// to the calling thread through a channel.
    fn execute(&self, graph: &DiGraph<&str, ()>) -> Diagnostics {
        let mut dependency_counts: HashMap<NodeIndex, usize> = graph
            .node_indices()
            .map(|i| (i, graph.neighbors_directed(i, Direction::Incoming).count()))
            .collect();

        let total_tasks = graph.node_count();
        let mut finished = 0;
        let mut skipped = HashSet::new();
        let mut diagnostics = Diagnostics::default();

        let root_span = tracing::span!(Level::INFO, "running_tasks");
        root_span.pb_set_length(total_tasks as u64);
        if let Ok(style) = get_style_run() {
            root_span.pb_set_style(&style);
        }
        root_span.pb_set_message("Running tasks...");
        let _enter = root_span.enter();

        let pb_style = get_style_task().ok();

        // The loop below blocks on the channel, so it must not occupy one of
        // the pool's workers.
        rayon::in_place_scope(|s| {
            let (result_sender, result_receiver) =
                channel::<(NodeIndex, anyhow::Result<()>, Instant, Duration)>();

            let spawn_task = |index: NodeIndex| {
                let name = graph[index];
                let action = self.tasks[name].action.clone();
                let sender = result_sender.clone();
                let pb_style = pb_style.clone();

                s.spawn(move |_| {
                    let span = tracing::span!(Level::INFO, "task", name);
                    if let Some(style) = &pb_style {
                        span.pb_set_style(style);
                    }
                    span.pb_set_message(&format!("Running {name}"));
                    let _enter = span.enter();

                    let start_time = Instant::now();

                    // Actions only share immutable, reference-counted state, a
                    // panic can't leave anything half-updated.
                    let result = match action {
                        None => Ok(()),
                        Some(action) => std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| action()))
                            .unwrap_or_else(|panic| {
                                let msg = if let Some(text) = panic.downcast_ref::<&str>() {
                                    format!("Task panicked: {text}")
                                } else if let Some(text) = panic.downcast_ref::<String>() {
                                    format!("Task panicked: {text}")
                                } else {
                                    String::from("Task panicked with unknown payload")
                                };
                                Err(anyhow::anyhow!(msg))
                            }),
                    };

                    let elapsed = start_time.elapsed();
                    let _ = sender.send((index, result, start_time, elapsed));
                });
            };

            for index in graph.node_indices() {
                if dependency_counts[&index] == 0 {
                    spawn_task(index);
                }
            }

            while finished < total_tasks {
                let Ok((index, result, start, duration)) = result_receiver.recv() else {
                    break;
                };

                let name = graph[index];
                finished += 1;
                root_span.pb_inc(1);
                diagnostics
                    .execution_times
                    .insert(name.to_string(), TaskExecution { start, duration });

                match result {
                    Ok(()) => {
                        tracing::debug!(task = name, "finished in {duration:.2?}");

                        for dependent in graph.neighbors_directed(index, Direction::Outgoing) {
                            if let Some(count) = dependency_counts.get_mut(&dependent) {
                                *count -= 1;
                                if *count == 0 && !skipped.contains(&dependent) {
                                    spawn_task(dependent);
                                }
                            }
                        }
                    }
                    Err(err) => {
                        tracing::error!(task = name, "{err:#}");
                        diagnostics.failed.push((name.to_string(), format!("{err:#}")));

                        // Nothing depending on a failed task can have started yet.
                        let mut dfs = Dfs::new(graph, index);
                        while let Some(next) = dfs.next(graph) {
                            if next != index && skipped.insert(next) {
                                finished += 1;
                                root_span.pb_inc(1);
                                diagnostics.skipped.push(graph[next].to_string());
                            }
                        }
                    }
                }
            }
        });

        diagnostics.failed.sort();
        diagnostics.skipped.sort();
        diagnostics
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    fn logging(log: &Log, name: &str) -> Option<Action> {
        let log = log.clone();
        let name = name.to_string();
        Some(Arc::new(move || -> anyhow::Result<()> {
            log.lock().unwrap().push(name.clone());
            Ok(())
        }))
    }

    fn failing() -> Option<Action> {
        Some(Arc::new(|| -> anyhow::Result<()> { anyhow::bail!("compiler exited with 1") }))
    }

    fn register(scheduler: &mut LocalScheduler, name: &str, prerequisites: &[&str], action: Option<Action>) {
        let prerequisites = prerequisites.iter().map(ToString::to_string).collect();
        scheduler.register(name.to_string(), prerequisites, action).unwrap();
    }

    #[test]
    fn test_runs_in_dependency_order() {
        let log = Log::default();
        let mut scheduler = LocalScheduler::new();
        register(&mut scheduler, "app:preBuild", &[], logging(&log, "app:preBuild"));
        register(&mut scheduler, "app:code:verify", &["app:preBuild"], logging(&log, "app:code:verify"));
        register(&mut scheduler, "app:code:compile", &["app:code:verify"], logging(&log, "app:code:compile"));
        register(&mut scheduler, "unrelated", &[], logging(&log, "unrelated"));

        let diagnostics = scheduler.run("app:code:compile").unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            ["app:preBuild", "app:code:verify", "app:code:compile"]
        );
        assert!(!diagnostics.ran("unrelated"));
        assert_eq!(diagnostics.execution_times.len(), 3);
    }

    #[test]
    fn test_failure_skips_dependents_only() {
        let log = Log::default();
        let mut scheduler = LocalScheduler::new();
        register(&mut scheduler, "core:styles", &[], failing());
        register(&mut scheduler, "app:styles", &["core:styles"], logging(&log, "app:styles"));
        register(&mut scheduler, "core:assets", &[], logging(&log, "core:assets"));
        register(&mut scheduler, "build", &["app:styles", "core:assets"], None);

        let err = scheduler.run("build").unwrap_err();
        let RunError::Failed(diagnostics) = err else {
            panic!("expected a failed run");
        };

        assert_eq!(diagnostics.failed.len(), 1);
        assert_eq!(diagnostics.failed[0].0, "core:styles");
        assert!(diagnostics.failed[0].1.contains("compiler exited with 1"));
        assert_eq!(diagnostics.skipped, ["app:styles", "build"]);
        assert_eq!(*log.lock().unwrap(), ["core:assets"]);
    }

    #[test]
    fn test_panic_is_reported() {
        let mut scheduler = LocalScheduler::new();
        register(&mut scheduler, "boom", &[], Some(Arc::new(|| -> anyhow::Result<()> { panic!("kaboom") })));

        let Err(RunError::Failed(diagnostics)) = scheduler.run("boom") else {
            panic!("expected a failed run");
        };
        assert!(diagnostics.failed[0].1.contains("Task panicked: kaboom"));
    }

    #[test]
    fn test_unknown_tasks() {
        let mut scheduler = LocalScheduler::new();
        register(&mut scheduler, "app:preBuild", &["lint"], None);

        assert!(matches!(scheduler.run("nope"), Err(RunError::UnknownTask(_))));
        assert!(matches!(
            scheduler.run("app:preBuild"),
            Err(RunError::UnknownPrerequisite { ref prerequisite, .. }) if prerequisite == "lint"
        ));
    }

    #[test]
    fn test_cycle() {
        let mut scheduler = LocalScheduler::new();
        register(&mut scheduler, "a", &["b"], None);
        register(&mut scheduler, "b", &["a"], None);

        assert!(matches!(scheduler.run("a"), Err(RunError::Cycle(_))));
    }

    #[test]
    fn test_redefinition_replaces() {
        let log = Log::default();
        let mut scheduler = LocalScheduler::new();
        register(&mut scheduler, "app:build", &[], logging(&log, "old"));
        register(&mut scheduler, "lint", &[], logging(&log, "lint"));
        register(&mut scheduler, "app:build", &["lint", "lint"], logging(&log, "new"));

        assert_eq!(scheduler.names(), ["app:build", "lint"]);
        assert_eq!(scheduler.prerequisites("app:build").unwrap(), ["lint"]);

        scheduler.run("app:build").unwrap();
        assert_eq!(*log.lock().unwrap(), ["lint", "new"]);
    }
}
