use std::collections::BTreeSet;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use super::{StyleCompiler, StyleJob, ToolError};

/// Compiles SCSS with the `grass` crate, no external binary needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Grass;

/// Folders holding partials, so `@use 'colors'` resolves regardless of which
/// folder of the bundle the partial lives in.
fn load_paths(job: &StyleJob) -> Result<Vec<Utf8PathBuf>, ToolError> {
    let mut paths = BTreeSet::new();

    if let Some(dir) = job.entry.parent() {
        paths.insert(dir.to_owned());
    }

    for entry in glob::glob(&job.partials)? {
        match entry {
            Ok(path) => {
                if let Some(dir) = Utf8Path::from_path(&path).and_then(Utf8Path::parent) {
                    paths.insert(dir.to_owned());
                }
            }
            Err(err) => tracing::warn!("skipping partial {}: {}", err.path().display(), err.error()),
        }
    }

    Ok(paths.into_iter().collect())
}

impl StyleCompiler for Grass {
    fn compile(&self, job: &StyleJob) -> anyhow::Result<()> {
        let load_paths = load_paths(job)?;

        let style = if job.minify {
            grass::OutputStyle::Compressed
        } else {
            grass::OutputStyle::Expanded
        };

        let options = grass::Options::default()
            .style(style)
            .load_paths(&load_paths);

        let css = grass::from_path(&job.entry, &options).map_err(ToolError::Sass)?;

        fs::create_dir_all(&job.out_dir).map_err(ToolError::Io)?;
        let out = job.out_dir.join(format!("{}.css", job.bundle.name));
        fs::write(&out, css).map_err(ToolError::Io)?;

        tracing::info!("compiled {} -> {}", job.entry, out);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BundleConfig;

    #[test]
    fn test_compile_with_partials() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().join("src")).unwrap();
        fs::create_dir_all(root.join("theme")).unwrap();
        fs::write(root.join("theme/_colors.scss"), "$main: #ff0000;").unwrap();
        fs::write(root.join("index.scss"), "@import 'colors';\nbody { color: $main; }").unwrap();

        let out_dir = Utf8PathBuf::try_from(dir.path().join("dist/app/css")).unwrap();
        let job = StyleJob {
            entry: root.join("index.scss"),
            partials: format!("{root}/**/_*.scss"),
            out_dir: out_dir.clone(),
            minify: true,
            bundle: BundleConfig::new("app", root.clone()),
        };

        Grass.compile(&job).unwrap();

        let css = fs::read_to_string(out_dir.join("app.css")).unwrap();
        assert!(css.starts_with("body{color:"));
    }

    #[test]
    fn test_compile_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        fs::write(root.join("index.scss"), "body { color: $missing; }").unwrap();

        let job = StyleJob {
            entry: root.join("index.scss"),
            partials: format!("{root}/**/_*.scss"),
            out_dir: root.join("out"),
            minify: false,
            bundle: BundleConfig::new("app", root.clone()),
        };

        let err = Grass.compile(&job).unwrap_err();
        assert!(matches!(err.downcast_ref::<ToolError>(), Some(ToolError::Sass(_))));
    }
}
