use camino::Utf8PathBuf;
use thiserror::Error;

use crate::runner::Diagnostics;
use crate::task::TaskId;

/// Top level error returned by [`crate::generate`].
#[derive(Debug, Error)]
pub enum KumitateError {
    #[error("Invalid configuration:\n{0}")]
    Config(#[from] ConfigError),

    #[error("Error while assembling the task graph:\n{0}")]
    Graph(#[from] GraphError),

    #[error("Scheduler rejected task '{0}':\n{1}")]
    Register(String, anyhow::Error),

    #[error("Dev server for bundle '{0}':\n{1}")]
    DevServer(String, anyhow::Error),
}

/// Problems with the declarative configuration, detected before any task is
/// created.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read configuration file '{0}'.\n{1}")]
    Io(Utf8PathBuf, std::io::Error),

    #[error("Couldn't parse configuration.\n{0}")]
    Parse(#[from] serde_json::Error),

    #[error("Bundle at position {0} has an empty name")]
    EmptyName(usize),

    #[error("Bundle '{0}' is declared more than once")]
    DuplicateBundle(String),

    #[error("Bundle '{bundle}' has an unknown bundle dependency '{dependency}'")]
    UnknownDependency { bundle: String, dependency: String },

    #[error("Bundle '{0}' depends on itself")]
    SelfDependency(String),

    #[error("Bundle dependency cycle detected at '{0}'")]
    Cycle(String),

    #[error("Bundle '{bundle}' depends on '{dependency}', which is declared after it")]
    ForwardReference { bundle: String, dependency: String },
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Task '{0}' is defined more than once")]
    DuplicateTask(TaskId),

    #[error("Task name '{existing}' is used by two different tasks")]
    NameClash { task: TaskId, existing: TaskId },

    #[error("Task '{task}' requires '{prerequisite}', which doesn't exist yet")]
    MissingPrerequisite { task: TaskId, prerequisite: TaskId },
}

/// Failure of a single stage action, tagged with the bundle and the task so
/// the user can find the convention file responsible for it.
#[derive(Debug, Error)]
#[error("Task '{task}' of bundle '{bundle}' failed:\n{source:#}")]
pub struct StageError {
    pub bundle: String,
    pub task: String,
    pub source: anyhow::Error,
}

impl StageError {
    pub(crate) fn new(task: &TaskId, source: anyhow::Error) -> Self {
        Self {
            bundle: task.bundle().unwrap_or("*").to_string(),
            task: task.to_string(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Task '{0}' is not registered")]
    UnknownTask(String),

    #[error("Task '{task}' requires '{prerequisite}', which is not registered")]
    UnknownPrerequisite { task: String, prerequisite: String },

    #[error("Cycle detected in task graph at '{0}'")]
    Cycle(String),

    #[error("{} task(s) failed:\n{}", .0.failed.len(), .0.render_failures())]
    Failed(Box<Diagnostics>),
}
