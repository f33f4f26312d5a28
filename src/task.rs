//! Task identities and the immutable nodes of the task graph.
//!
//! Every generated task is addressed by a structured [`TaskId`]. The string
//! form handed to a scheduler (`app:code:verify`, `app:spec:chrome:debug`) is
//! produced in exactly one place, the `Display` implementation, so internal
//! comparisons never depend on string concatenation.
use std::fmt::{Debug, Display};
use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::error::StageError;

/// Atomic reference-counted string type used for identifiers.
pub(crate) type ArcStr = Arc<str>;

/// Zero-argument operation run by the scheduler once all prerequisites of its
/// task have completed.
pub type Action = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// A single named step in the build of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Clean,
    PreBuild,
    Templates,
    Images,
    Assets,
    Styles,
    CodeVerify,
    CodeCompile,
    BuildTasks,
    Build,
    SpecInject,
    SpecVerify,
    SpecCompile,
    /// Single test run of a preset, the qualifier holds the preset key.
    Test,
    /// Interactive test run of a preset, the qualifier holds the preset key.
    Debug,
    Run,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Clean => "clean",
            Stage::PreBuild => "preBuild",
            Stage::Templates => "templates",
            Stage::Images => "images",
            Stage::Assets => "assets",
            Stage::Styles => "styles",
            Stage::CodeVerify => "code:verify",
            Stage::CodeCompile => "code:compile",
            Stage::BuildTasks => "build-tasks",
            Stage::Build => "build",
            Stage::SpecInject => "spec:inject",
            Stage::SpecVerify => "spec:verify",
            Stage::SpecCompile => "spec:compile",
            Stage::Test => "spec",
            Stage::Debug => "spec:debug",
            Stage::Run => "run",
        }
    }
}

/// Structured identity of a task: `{bundle, stage, qualifier}`.
///
/// Global tasks (`clean`, `build`, `spec`) carry no bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId {
    bundle: Option<ArcStr>,
    stage: Stage,
    qualifier: Option<ArcStr>,
}

impl TaskId {
    pub fn new(bundle: &str, stage: Stage) -> Self {
        Self {
            bundle: Some(bundle.into()),
            stage,
            qualifier: None,
        }
    }

    pub fn global(stage: Stage) -> Self {
        Self {
            bundle: None,
            stage,
            qualifier: None,
        }
    }

    pub fn with_qualifier(mut self, qualifier: &str) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    pub fn bundle(&self) -> Option<&str> {
        self.bundle.as_deref()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(bundle) = &self.bundle {
            write!(f, "{bundle}:")?;
        }

        match (self.stage, &self.qualifier) {
            (Stage::Test, Some(key)) => write!(f, "{key}"),
            (Stage::Debug, Some(key)) => write!(f, "{key}:debug"),
            (stage, Some(qualifier)) => write!(f, "{}:{qualifier}", stage.as_str()),
            (stage, None) => f.write_str(stage.as_str()),
        }
    }
}

/// Something a task waits for. External ids come from user configuration
/// (`beforeBuild`, `beforeClean`) and are opaque to the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Prerequisite {
    Task(TaskId),
    External(ArcStr),
}

impl Prerequisite {
    pub fn external(id: &str) -> Self {
        Prerequisite::External(id.into())
    }

    pub fn as_task(&self) -> Option<&TaskId> {
        match self {
            Prerequisite::Task(id) => Some(id),
            Prerequisite::External(_) => None,
        }
    }
}

impl From<TaskId> for Prerequisite {
    fn from(value: TaskId) -> Self {
        Prerequisite::Task(value)
    }
}

impl Display for Prerequisite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Prerequisite::Task(id) => Display::fmt(id, f),
            Prerequisite::External(id) => f.write_str(id),
        }
    }
}

/// Insertion-ordered set of prerequisites.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prerequisites(Vec<Prerequisite>);

impl Prerequisites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry unless it is already present. Returns whether it was
    /// added.
    pub fn insert(&mut self, item: impl Into<Prerequisite>) -> bool {
        let item = item.into();
        if self.0.contains(&item) {
            return false;
        }
        self.0.push(item);
        true
    }

    pub fn contains(&self, item: &Prerequisite) -> bool {
        self.0.contains(item)
    }

    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.tasks().any(|task| task == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Prerequisite> {
        self.0.iter()
    }

    /// Only the generated task ids, skipping external ones.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskId> {
        self.0.iter().filter_map(Prerequisite::as_task)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<P: Into<Prerequisite>> Extend<P> for Prerequisites {
    fn extend<T: IntoIterator<Item = P>>(&mut self, iter: T) {
        for item in iter {
            self.insert(item);
        }
    }
}

impl<P: Into<Prerequisite>> FromIterator<P> for Prerequisites {
    fn from_iter<T: IntoIterator<Item = P>>(iter: T) -> Self {
        let mut set = Prerequisites::new();
        set.extend(iter);
        set
    }
}

impl<'a> IntoIterator for &'a Prerequisites {
    type Item = &'a Prerequisite;
    type IntoIter = std::slice::Iter<'a, Prerequisite>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A node of the task graph. Nodes are assembled once by the builder and
/// never mutated after being inserted into a [`crate::TaskGraph`].
#[derive(Clone)]
pub struct TaskNode {
    id: TaskId,
    prerequisites: Prerequisites,
    inputs: Vec<Utf8PathBuf>,
    action: Option<Action>,
}

impl TaskNode {
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            prerequisites: Prerequisites::new(),
            inputs: Vec::new(),
            action: None,
        }
    }

    pub fn with_prerequisites(mut self, prerequisites: impl IntoIterator<Item = impl Into<Prerequisite>>) -> Self {
        self.prerequisites.extend(prerequisites);
        self
    }

    /// Files the action consumes, resolved when the node is created.
    pub fn with_inputs(mut self, inputs: Vec<Utf8PathBuf>) -> Self {
        self.inputs = inputs;
        self
    }

    /// Errors returned by the action are wrapped in a [`StageError`] naming
    /// this task and its bundle.
    pub fn with_action<F>(mut self, action: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.id.clone();
        self.action = Some(Arc::new(move || {
            action().map_err(|err| StageError::new(&id, err).into())
        }));
        self
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn prerequisites(&self) -> &Prerequisites {
        &self.prerequisites
    }

    pub fn inputs(&self) -> &[Utf8PathBuf] {
        &self.inputs
    }

    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }

    /// Runs the action, if any. Pure aggregation nodes complete immediately.
    pub fn run(&self) -> anyhow::Result<()> {
        match &self.action {
            Some(action) => action(),
            None => Ok(()),
        }
    }
}

impl Debug for TaskNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.id.to_string())
            .field("prerequisites", &self.prerequisites)
            .field("inputs", &self.inputs)
            .field("action", &self.action.as_ref().map(|_| "*"))
            .finish()
    }
}
