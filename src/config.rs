//! Declarative project configuration.
//!
//! The configuration is usually stored as JSON next to the project:
//!
//! ```json
//! {
//!   "minify": false,
//!   "beforeClean": ["stop-server"],
//!   "bundles": [
//!     { "name": "core", "root": "lib", "library": true },
//!     { "name": "app", "root": "src", "dependencies": ["core"], "assetFolders": ["fonts"] }
//!   ]
//! }
//! ```
use std::collections::{BTreeMap, HashMap};
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use petgraph::Graph;
use petgraph::algo::toposort;
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    /// Project-wide minification default, `true` when absent.
    #[serde(default)]
    pub minify: Option<bool>,
    /// External tasks that must finish before `clean` runs.
    #[serde(default)]
    pub before_clean: Vec<String>,
    /// Bundles in declaration order. Dependencies must be declared first.
    #[serde(default)]
    pub bundles: Vec<BundleConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleConfig {
    pub name: String,
    pub root: Utf8PathBuf,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Enables the template and image pre-cache stages, `true` when absent.
    #[serde(default)]
    pub angular: Option<bool>,
    #[serde(default)]
    pub library: bool,
    #[serde(default)]
    pub minify: Option<bool>,
    /// External tasks that must finish before this bundle is pre-built.
    #[serde(default)]
    pub before_build: Vec<String>,
    /// Folders under `root` copied verbatim into the output.
    #[serde(default)]
    pub asset_folders: Vec<String>,
    /// Module specifier to global variable name, forwarded to the compiler.
    #[serde(default)]
    pub globals: BTreeMap<String, String>,
    #[serde(default)]
    pub run: Option<RunConfig>,
}

/// Dev server settings, only read by the dev server collaborator.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    #[serde(default = "RunConfig::default_port")]
    pub port: u16,
    #[serde(default = "RunConfig::default_host")]
    pub host: String,
    #[serde(default)]
    pub https: bool,
    /// URL prefix to folder served under it.
    #[serde(default)]
    pub routes: BTreeMap<String, Utf8PathBuf>,
    #[serde(default)]
    pub environments: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub custom_headers: BTreeMap<String, String>,
}

impl RunConfig {
    fn default_port() -> u16 {
        8080
    }

    fn default_host() -> String {
        String::from("localhost")
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            port: Self::default_port(),
            host: Self::default_host(),
            https: false,
            routes: BTreeMap::new(),
            environments: BTreeMap::new(),
            custom_headers: BTreeMap::new(),
        }
    }
}

impl BundleConfig {
    pub fn new(name: impl Into<String>, root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// Absent `angular` behaves like `angular: true`.
    pub fn is_angular(&self) -> bool {
        self.angular != Some(false)
    }

    /// Bundle override, then the global default, then `true`.
    pub fn effective_minify(&self, global: &GlobalConfig) -> bool {
        self.minify.or(global.minify).unwrap_or(true)
    }
}

impl GlobalConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Utf8Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_owned(), err))?;
        Self::from_json(&text)
    }

    pub fn bundle(&self, name: &str) -> Option<&BundleConfig> {
        self.bundles.iter().find(|bundle| bundle.name == name)
    }

    /// Checks the bundle list before any task is generated.
    ///
    /// Names must be non-empty and unique, every dependency must name a known
    /// bundle, the dependency relation must be acyclic, and every dependency
    /// must be declared before the bundle using it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut graph = Graph::<&str, ()>::new();
        let mut nodes = HashMap::new();

        for (i, bundle) in self.bundles.iter().enumerate() {
            if bundle.name.is_empty() {
                return Err(ConfigError::EmptyName(i));
            }
            if nodes.contains_key(bundle.name.as_str()) {
                return Err(ConfigError::DuplicateBundle(bundle.name.clone()));
            }
            nodes.insert(bundle.name.as_str(), (i, graph.add_node(bundle.name.as_str())));
        }

        for bundle in &self.bundles {
            let (_, target) = nodes[bundle.name.as_str()];

            for dependency in &bundle.dependencies {
                if *dependency == bundle.name {
                    return Err(ConfigError::SelfDependency(bundle.name.clone()));
                }

                let Some(&(_, source)) = nodes.get(dependency.as_str()) else {
                    return Err(ConfigError::UnknownDependency {
                        bundle: bundle.name.clone(),
                        dependency: dependency.clone(),
                    });
                };

                graph.add_edge(source, target, ());
            }
        }

        if let Err(cycle) = toposort(&graph, None) {
            return Err(ConfigError::Cycle(graph[cycle.node_id()].to_string()));
        }

        for (i, bundle) in self.bundles.iter().enumerate() {
            for dependency in &bundle.dependencies {
                let (position, _) = nodes[dependency.as_str()];
                if position > i {
                    return Err(ConfigError::ForwardReference {
                        bundle: bundle.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}
