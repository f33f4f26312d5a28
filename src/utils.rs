use std::fmt::Display;
use std::fs;
use std::time::Instant;

use camino::Utf8Path;
use console::Style;
use indicatif::ProgressStyle;

const ANSI_BLUE: Style = Style::new().blue();

/// Sets up a `tracing` subscriber that cooperates with the progress bars of
/// the task runner. `RUST_LOG` overrides the default `kumitate=info` filter.
#[cfg(feature = "logging")]
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_indicatif::IndicatifLayer;
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let indicatif = IndicatifLayer::new();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kumitate=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(indicatif.get_stderr_writer()),
        )
        .with(indicatif)
        .try_init()?;

    Ok(())
}

/// Spinner style for a single running task.
pub(crate) fn get_style_task() -> anyhow::Result<ProgressStyle> {
    Ok(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?)
}

/// Progress bar style for the whole run.
pub(crate) fn get_style_run() -> anyhow::Result<ProgressStyle> {
    Ok(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
        .progress_chars("=>-"))
}

pub(crate) fn as_overhead(s: Instant) -> impl Display {
    let f = format!("(+{}ms)", s.elapsed().as_millis());
    ANSI_BLUE.apply_to(f)
}

/// Copies a directory tree, returning the number of files copied.
pub(crate) fn copy_rec(src: &Utf8Path, dst: &Utf8Path) -> std::io::Result<u64> {
    fs::create_dir_all(dst)?;
    let mut copied = 0;

    for entry in src.read_dir_utf8()? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copied += copy_rec(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), target)?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Removes a directory if it exists.
pub(crate) fn clear_dir(path: &Utf8Path) -> std::io::Result<()> {
    if fs::metadata(path).is_ok() {
        fs::remove_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn test_copy_rec() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        fs::create_dir_all(root.join("fonts/latin")).unwrap();
        fs::write(root.join("fonts/a.woff"), "a").unwrap();
        fs::write(root.join("fonts/latin/b.woff"), "b").unwrap();

        let copied = copy_rec(&root.join("fonts"), &root.join("dist/fonts")).unwrap();

        assert_eq!(copied, 2);
        assert_eq!(fs::read_to_string(root.join("dist/fonts/latin/b.woff")).unwrap(), "b");
    }

    #[test]
    fn test_clear_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        fs::create_dir_all(root.join("dist/app")).unwrap();

        clear_dir(&root.join("dist")).unwrap();
        clear_dir(&root.join("dist")).unwrap();
        assert!(!root.join("dist").exists());
    }
}
