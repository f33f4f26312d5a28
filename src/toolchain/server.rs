use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderName, HeaderValue};
use axum::response::Response;
use camino::{Utf8Path, Utf8PathBuf};
use console::style;
use tower_http::services::ServeDir;
use tracing::info;

use super::{DevServer, Layout, Scheduler};
use crate::config::{BundleConfig, GlobalConfig, RunConfig};
use crate::task::{Action, Stage, TaskId};

/// Serves the built output of a bundle over HTTP.
///
/// Registers `<bundle>:run`, which waits for `<bundle>:build` and then keeps
/// serving `<dist>/<bundle>` until the process is terminated.
#[derive(Debug, Clone)]
pub struct StaticServer {
    pub dist: Utf8PathBuf,
}

impl StaticServer {
    pub fn new(layout: &Layout) -> Self {
        Self {
            dist: layout.dist.clone(),
        }
    }

    /// Folder served for `bundle` when no route overrides `/`.
    pub fn root(&self, bundle: &str) -> Utf8PathBuf {
        self.dist.join(bundle)
    }
}

impl Default for StaticServer {
    fn default() -> Self {
        Self::new(&Layout::default())
    }
}

impl DevServer for StaticServer {
    fn generate(
        &self,
        bundle: &BundleConfig,
        _: &GlobalConfig,
        scheduler: &mut dyn Scheduler,
    ) -> anyhow::Result<()> {
        let Some(run) = bundle.run.clone() else {
            return Ok(());
        };

        if run.https {
            tracing::warn!(bundle = %bundle.name, "https is not supported, serving plain http");
        }

        let root = self.root(&bundle.name);
        let id = TaskId::new(&bundle.name, Stage::Run);
        let build = TaskId::new(&bundle.name, Stage::Build);
        let action: Action = Arc::new(move || start(&root, &run));

        scheduler.register(id.to_string(), vec![build.to_string()], Some(action))
    }
}

fn start(root: &Utf8Path, run: &RunConfig) -> anyhow::Result<()> {
    let router = router(root, run)?;

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(serve(router, run))
}

async fn serve(router: Router, run: &RunConfig) -> anyhow::Result<()> {
    let url = style(format!("http://{}:{}/", run.host, run.port)).yellow();
    info!(url = %url, "starting a HTTP server");

    let listener = tokio::net::TcpListener::bind((run.host.as_str(), run.port)).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

fn router(root: &Utf8Path, run: &RunConfig) -> anyhow::Result<Router> {
    let mut router = Router::new();
    let mut fallback = root.to_owned();

    for (prefix, folder) in &run.routes {
        match prefix.trim_end_matches('/') {
            "" => fallback = folder.clone(),
            prefix if prefix.starts_with('/') => {
                router = router.nest_service(prefix, ServeDir::new(folder));
            }
            prefix => {
                router = router.nest_service(&format!("/{prefix}"), ServeDir::new(folder));
            }
        }
    }

    let router = router.fallback_service(ServeDir::new(fallback));

    let headers = run
        .custom_headers
        .iter()
        .map(|(name, value)| -> anyhow::Result<_> {
            Ok((
                HeaderName::try_from(name.as_str())?,
                HeaderValue::try_from(value.as_str())?,
            ))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    if headers.is_empty() {
        return Ok(router);
    }

    let headers = Arc::new(headers);
    Ok(router.layer(axum::middleware::map_response(move |mut response: Response| {
        let headers = headers.clone();
        async move {
            for (name, value) in headers.iter() {
                response.headers_mut().insert(name.clone(), value.clone());
            }
            response
        }
    })))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<(String, Vec<String>)>);

    impl Scheduler for Recorder {
        fn register(&mut self, id: String, prerequisites: Vec<String>, _: Option<Action>) -> anyhow::Result<()> {
            self.0.push((id, prerequisites));
            Ok(())
        }
    }

    #[test]
    fn test_registers_run_task() {
        let mut bundle = BundleConfig::new("app", "src");
        bundle.run = Some(RunConfig::default());

        let mut scheduler = Recorder::default();
        StaticServer::default()
            .generate(&bundle, &GlobalConfig::default(), &mut scheduler)
            .unwrap();

        assert_eq!(
            scheduler.0,
            [("app:run".to_string(), vec!["app:build".to_string()])]
        );
    }

    #[test]
    fn test_serves_layout_dist() {
        let layout = Layout {
            dist: Utf8PathBuf::from("out/www"),
            tmp: Utf8PathBuf::from("out/tmp"),
        };
        assert_eq!(StaticServer::new(&layout).root("app"), "out/www/app");
        assert_eq!(StaticServer::default().root("app"), "dist/app");
    }

    #[test]
    fn test_skips_bundle_without_run() {
        let bundle = BundleConfig::new("app", "src");
        let mut scheduler = Recorder::default();
        StaticServer::default()
            .generate(&bundle, &GlobalConfig::default(), &mut scheduler)
            .unwrap();
        assert!(scheduler.0.is_empty());
    }

    #[test]
    fn test_rejects_invalid_header() {
        let run = RunConfig {
            custom_headers: BTreeMap::from([("bad header".to_string(), "x".to_string())]),
            ..Default::default()
        };
        assert!(router(Utf8Path::new("dist/app"), &run).is_err());
    }

    #[test]
    fn test_routes() {
        let run = RunConfig {
            routes: BTreeMap::from([
                ("/".to_string(), Utf8PathBuf::from("public")),
                ("vendor".to_string(), Utf8PathBuf::from("node_modules")),
                ("/api/".to_string(), Utf8PathBuf::from("mock")),
            ]),
            custom_headers: BTreeMap::from([("X-Frame-Options".to_string(), "DENY".to_string())]),
            ..Default::default()
        };
        assert!(router(Utf8Path::new("dist/app"), &run).is_ok());
    }
}
