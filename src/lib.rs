#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod builder;
mod config;
mod error;
mod graph;
mod inject;
pub mod matrix;
pub mod probe;
mod registry;
pub mod runner;
mod task;
pub mod toolchain;
mod utils;

pub use crate::builder::Builder;
pub use crate::config::{BundleConfig, GlobalConfig, RunConfig};
pub use crate::error::*;
pub use crate::graph::TaskGraph;
pub use crate::inject::{render_spec_entry, write_spec_entry};
pub use crate::matrix::{Browser, Preset, TestMatrix};
pub use crate::probe::{ConventionProbe, FsProbe, MemoryProbe};
pub use crate::registry::StyleRegistry;
pub use crate::runner::{Diagnostics, LocalScheduler};
pub use crate::task::{Action, Prerequisite, Prerequisites, Stage, TaskId, TaskNode};
pub use crate::toolchain::{Layout, Scheduler, Toolchain};
#[cfg(feature = "logging")]
pub use crate::utils::init_logging;

/// Generates the task graph of a project and registers it with `scheduler`.
///
/// The configuration is validated first, nothing is registered when it is
/// invalid. After the graph, the dev server collaborator registers the run
/// tasks of every bundle with a `run` section.
pub fn generate(
    config: &GlobalConfig,
    probe: &dyn ConventionProbe,
    toolchain: &Toolchain,
    scheduler: &mut dyn Scheduler,
) -> Result<TaskGraph, KumitateError> {
    let s = std::time::Instant::now();

    let graph = Builder::new(config, probe, toolchain).build()?;
    graph.register(scheduler)?;

    for bundle in config.bundles.iter().filter(|bundle| bundle.run.is_some()) {
        toolchain
            .server
            .generate(bundle, config, scheduler)
            .map_err(|err| KumitateError::DevServer(bundle.name.clone(), err))?;
    }

    tracing::info!(
        "Registered {} tasks for {} bundles {}",
        graph.len(),
        config.bundles.len(),
        utils::as_overhead(s)
    );

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::toolchain::DevServer;
    use crate::toolchain::testing::{Call, recording};

    #[test]
    fn test_generate_and_run() {
        let config = GlobalConfig::from_json(
            r#"{
                "bundles": [
                    { "name": "core", "root": "lib", "angular": false },
                    { "name": "app", "root": "src", "dependencies": ["core"], "angular": false }
                ]
            }"#,
        )
        .unwrap();
        let probe = MemoryProbe::new().with_files(["lib/index.scss", "src/index.scss", "src/index.ts"]);
        let (toolchain, recorder) = recording(false);
        let mut scheduler = LocalScheduler::new();

        let graph = generate(&config, &probe, &toolchain, &mut scheduler).unwrap();
        assert_eq!(scheduler.len(), graph.len());
        assert_eq!(scheduler.names(), graph.names());

        scheduler.run("app:code:compile").unwrap();

        let calls = recorder.take();
        let position = |f: &dyn Fn(&Call) -> bool| calls.iter().position(|c| f(c)).unwrap();

        let core_styles = position(&|c| matches!(c, Call::Styles(entry, ..) if *entry == "lib/index.scss"));
        let app_styles = position(&|c| matches!(c, Call::Styles(entry, ..) if *entry == "src/index.scss"));
        let verify = position(&|c| matches!(c, Call::Verify(_)));
        let compile = position(&|c| matches!(c, Call::Compile(_)));

        assert!(core_styles < app_styles);
        assert!(app_styles < verify);
        assert!(verify < compile);
    }

    #[test]
    fn test_invalid_config_registers_nothing() {
        let config = GlobalConfig {
            bundles: vec![
                BundleConfig::new("app", "src").depends_on(["core"]),
                BundleConfig::new("core", "lib"),
            ],
            ..Default::default()
        };
        let (toolchain, _) = recording(false);
        let mut scheduler = LocalScheduler::new();

        let err = generate(&config, &MemoryProbe::new(), &toolchain, &mut scheduler).unwrap_err();
        assert!(matches!(err, KumitateError::Config(ConfigError::ForwardReference { .. })));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_dev_server_only_for_run_bundles() {
        struct Server(Mutex<Vec<String>>);

        impl DevServer for Server {
            fn generate(&self, bundle: &BundleConfig, _: &GlobalConfig, scheduler: &mut dyn Scheduler) -> anyhow::Result<()> {
                self.0.lock().unwrap().push(bundle.name.clone());
                scheduler.register(format!("{}:run", bundle.name), vec![format!("{}:build", bundle.name)], None)
            }
        }

        let mut app = BundleConfig::new("app", "src");
        app.run = Some(RunConfig::default());
        let config = GlobalConfig {
            bundles: vec![BundleConfig::new("core", "lib"), app],
            ..Default::default()
        };

        let server = Arc::new(Server(Mutex::new(vec![])));
        let (mut toolchain, _) = recording(false);
        toolchain.server = server.clone();

        let mut scheduler = LocalScheduler::new();
        generate(&config, &MemoryProbe::new(), &toolchain, &mut scheduler).unwrap();

        assert_eq!(*server.0.lock().unwrap(), ["app"]);
        assert_eq!(scheduler.prerequisites("app:run").unwrap(), ["app:build"]);
        assert!(scheduler.run("app:run").is_ok());
    }
}
