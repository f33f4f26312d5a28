//! External collaborators.
//!
//! The task graph never compiles, bundles, or tests anything on its own. Each
//! stage action delegates to one of the narrow traits below, so any of them can
//! be swapped for a different tool or a test double. [`Toolchain::default`]
//! wires up the implementations shipped with this crate.
mod cache;
mod esbuild;
#[cfg(feature = "grass")]
mod grass;
mod karma;
mod sass;
#[cfg(feature = "server")]
mod server;

use std::collections::BTreeMap;
use std::process::{Command, Output, Stdio};
use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::config::{BundleConfig, GlobalConfig};
use crate::matrix::Browser;
use crate::probe::SPEC_ENTRY;
use crate::task::Action;

pub use self::cache::AngularCache;
pub use self::esbuild::{Esbuild, Tsc};
#[cfg(feature = "grass")]
pub use self::grass::Grass;
pub use self::karma::Karma;
pub use self::sass::SassCli;
#[cfg(feature = "server")]
pub use self::server::StaticServer;

/// Where generated files are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Final build output, one folder per bundle.
    pub dist: Utf8PathBuf,
    /// Intermediate files such as the injected spec entries and the
    /// pre-cache modules.
    pub tmp: Utf8PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            dist: Utf8PathBuf::from("dist"),
            tmp: Utf8PathBuf::from(".tmp"),
        }
    }
}

impl Layout {
    pub fn out_dir(&self, bundle: &str) -> Utf8PathBuf {
        self.dist.join(bundle)
    }

    pub(crate) fn tmp_dir(&self, bundle: &str) -> Utf8PathBuf {
        self.tmp.join(bundle)
    }

    pub(crate) fn spec_entry(&self, bundle: &str) -> Utf8PathBuf {
        self.tmp_dir(bundle).join(SPEC_ENTRY)
    }

    pub(crate) fn spec_bundle(&self, bundle: &str) -> Utf8PathBuf {
        self.tmp.join(format!("{bundle}.spec.js"))
    }
}

/// Errors produced by the bundled tool wrappers.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool couldn't be started at all.
    #[error("Couldn't run '{0}': {1}")]
    Spawn(String, std::io::Error),

    /// The tool exited with a non-zero status.
    #[error("'{tool}' failed ({status}):\n{stderr}")]
    Failed {
        tool: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Couldn't compile glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[cfg(feature = "grass")]
    #[error("Sass compilation error: {0}")]
    Sass(#[from] Box<::grass::Error>),
}

/// Input of a single bundling run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileJob {
    pub entry: Utf8PathBuf,
    pub out_file: Utf8PathBuf,
    pub minify: bool,
    pub library: bool,
    /// Module specifier to global variable name.
    pub globals: BTreeMap<String, String>,
}

/// Input of a single stylesheet compilation.
#[derive(Debug, Clone)]
pub struct StyleJob {
    pub entry: Utf8PathBuf,
    /// Glob matching the partials the entry may import.
    pub partials: String,
    pub out_dir: Utf8PathBuf,
    pub minify: bool,
    pub bundle: BundleConfig,
}

/// Input of a single test runner invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRun {
    pub entries: Vec<Utf8PathBuf>,
    pub browsers: Vec<Browser>,
    /// `false` keeps the runner open for interactive debugging.
    pub single_run: bool,
}

/// Lints and type-checks sources, failing the chain on errors.
pub trait CodeVerifier: Send + Sync {
    fn verify(&self, files: &[Utf8PathBuf]) -> anyhow::Result<()>;
}

/// Produces a single bundled module from an entry file.
pub trait CodeCompiler: Send + Sync {
    fn compile(&self, job: &CompileJob) -> anyhow::Result<()>;
}

/// Produces a single stylesheet from an entry file.
pub trait StyleCompiler: Send + Sync {
    fn compile(&self, job: &StyleJob) -> anyhow::Result<()>;
}

/// Encodes templates and images into a cached-asset module.
pub trait Precacher: Send + Sync {
    fn templates(&self, files: &[Utf8PathBuf], bundle: &str) -> anyhow::Result<()>;
    fn images(&self, files: &[Utf8PathBuf], bundle: &str) -> anyhow::Result<()>;
}

pub trait TestRunner: Send + Sync {
    fn run(&self, run: &TestRun) -> anyhow::Result<()>;
}

/// Receives tasks by name, executes them later.
///
/// Registering an id twice replaces the earlier definition, which lets a
/// consumer redefine `<bundle>:build` with extra prerequisites.
pub trait Scheduler {
    fn register(
        &mut self,
        id: String,
        prerequisites: Vec<String>,
        action: Option<Action>,
    ) -> anyhow::Result<()>;
}

/// Registers run/proxy tasks for bundles with a `run` section.
pub trait DevServer: Send + Sync {
    fn generate(
        &self,
        bundle: &BundleConfig,
        global: &GlobalConfig,
        scheduler: &mut dyn Scheduler,
    ) -> anyhow::Result<()>;
}

/// Dev server that registers nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDevServer;

impl DevServer for NoDevServer {
    fn generate(&self, bundle: &BundleConfig, _: &GlobalConfig, _: &mut dyn Scheduler) -> anyhow::Result<()> {
        tracing::debug!(bundle = %bundle.name, "no dev server configured, skipping run tasks");
        Ok(())
    }
}

/// The full set of collaborators used by the generated actions, together with
/// the output layout shared by the builder and the bundled collaborators.
#[derive(Clone)]
pub struct Toolchain {
    pub layout: Layout,
    pub verifier: Arc<dyn CodeVerifier>,
    pub compiler: Arc<dyn CodeCompiler>,
    pub styles: Arc<dyn StyleCompiler>,
    pub precache: Arc<dyn Precacher>,
    pub tests: Arc<dyn TestRunner>,
    pub server: Arc<dyn DevServer>,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self::with_layout(Layout::default())
    }
}

impl Toolchain {
    /// The bundled collaborators, writing into `layout`.
    pub fn with_layout(layout: Layout) -> Self {
        #[cfg(feature = "grass")]
        let styles: Arc<dyn StyleCompiler> = Arc::new(Grass);
        #[cfg(not(feature = "grass"))]
        let styles: Arc<dyn StyleCompiler> = Arc::new(SassCli::default());

        #[cfg(feature = "server")]
        let server: Arc<dyn DevServer> = Arc::new(StaticServer::new(&layout));
        #[cfg(not(feature = "server"))]
        let server: Arc<dyn DevServer> = Arc::new(NoDevServer);

        Self {
            verifier: Arc::new(Tsc::default()),
            compiler: Arc::new(Esbuild::default()),
            styles,
            precache: Arc::new(AngularCache::new(&layout)),
            tests: Arc::new(Karma::default()),
            server,
            layout,
        }
    }
}

impl std::fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Toolchain(*)")
    }
}

/// JSON string literal, which is also a valid JavaScript string literal.
fn quote(text: &str) -> String {
    serde_json::Value::from(text).to_string()
}

/// Runs an external tool to completion, turning a non-zero exit into an error
/// carrying its stderr.
fn execute(tool: &str, command: &mut Command) -> Result<Output, ToolError> {
    tracing::debug!("running {:?}", command);

    let output = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|err| ToolError::Spawn(tool.to_string(), err))?;

    if !output.status.success() {
        let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if stderr.trim().is_empty() {
            stderr = String::from_utf8_lossy(&output.stdout).into_owned();
        }

        return Err(ToolError::Failed {
            tool: tool.to_string(),
            status: output.status,
            stderr,
        });
    }

    Ok(output)
}
