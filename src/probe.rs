//! Convention probing.
//!
//! A bundle opts into optional stages simply by containing well-known files:
//! `index.scss`, `index.ts`, `spec.ts`, templates (`**/*.html` below the
//! root) and images (`**/*.svg` outside of asset folders). A missing
//! directory is never an error, it just means the feature is absent.
use std::collections::BTreeSet;
use std::fs;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use glob::{Pattern, glob};

pub const STYLE_ENTRY: &str = "index.scss";
pub const CODE_ENTRY: &str = "index.ts";
pub const SPEC_ENTRY: &str = "spec.ts";

/// Answers "does this optional stage apply?" and "which files feed it?".
///
/// Every method must be free of side effects, returned lists are sorted.
pub trait ConventionProbe {
    fn has_style_entry(&self, root: &Utf8Path) -> bool;
    fn has_code_entry(&self, root: &Utf8Path) -> bool;
    fn has_spec_entry(&self, root: &Utf8Path) -> bool;

    /// `.html` files in subfolders of `root`, files directly in `root` are
    /// pages rather than templates.
    fn find_templates(&self, root: &Utf8Path) -> Vec<Utf8PathBuf>;

    /// `.svg` files under `root`, except those inside any asset folder.
    fn find_images(&self, root: &Utf8Path, asset_folders: &[String]) -> Vec<Utf8PathBuf>;

    /// `.ts` files under `root` without the spec entry and `*.spec.ts` files.
    fn find_sources(&self, root: &Utf8Path) -> Vec<Utf8PathBuf>;

    /// Every `.ts` file under `root`.
    fn find_all_sources(&self, root: &Utf8Path) -> Vec<Utf8PathBuf>;

    /// Every `*.spec.ts` file under `root`.
    fn find_specs(&self, root: &Utf8Path) -> Vec<Utf8PathBuf>;

    /// Files directly in `root`, except `.ts` and `.scss` sources.
    fn root_files(&self, root: &Utf8Path) -> Vec<Utf8PathBuf>;
}

/// `path` without `.` components. The current directory becomes the empty
/// path, matching the relative paths `glob` yields for it.
pub(crate) fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    path.components()
        .filter(|component| !matches!(component, Utf8Component::CurDir))
        .collect()
}

/// Glob pattern for `suffix` below an already normalised `root`.
fn pattern_under(root: &Utf8Path, suffix: &str) -> String {
    if root.as_str().is_empty() {
        suffix.to_string()
    } else {
        format!("{}/{suffix}", Pattern::escape(root.as_str()))
    }
}

fn is_spec(path: &Utf8Path) -> bool {
    path.as_str().ends_with(".spec.ts")
}

fn is_source(root: &Utf8Path, path: &Utf8Path) -> bool {
    !is_spec(path) && path != root.join(SPEC_ENTRY).as_path()
}

fn is_copied(path: &Utf8Path) -> bool {
    !matches!(path.extension(), Some("ts" | "scss"))
}

/// Glob patterns matching everything inside each asset folder, in folder
/// declaration order.
pub(crate) fn asset_patterns(root: &Utf8Path, asset_folders: &[String]) -> Vec<Pattern> {
    let root = normalize(root);

    asset_folders
        .iter()
        .filter_map(|folder| {
            let folder = normalize(Utf8Path::new(folder));
            let pattern = pattern_under(&root, &format!("{}/**/*", Pattern::escape(folder.as_str())));
            Pattern::new(&pattern)
                .inspect_err(|err| tracing::warn!("skipping asset folder {folder}: {err}"))
                .ok()
        })
        .collect()
}

/// Probe backed by the real filesystem. Roots are normalised first, so
/// `./src`, `src/` and `src` all yield the same `src/...` paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl FsProbe {
    fn glob(root: &Utf8Path, suffix: &str) -> Vec<Utf8PathBuf> {
        let pattern = pattern_under(root, suffix);

        let paths = match glob(&pattern) {
            Ok(paths) => paths,
            Err(err) => {
                tracing::warn!("invalid glob {pattern}: {err}");
                return vec![];
            }
        };

        let mut found: Vec<_> = paths
            .filter_map(|entry| match entry {
                Ok(path) => Utf8PathBuf::from_path_buf(path)
                    .inspect_err(|path| tracing::warn!("skipping non UTF-8 path {}", path.display()))
                    .ok(),
                Err(err) => {
                    tracing::warn!("couldn't read {}: {}", err.path().display(), err.error());
                    None
                }
            })
            .filter(|path| path.is_file())
            .collect();

        found.sort();
        found
    }
}

impl ConventionProbe for FsProbe {
    fn has_style_entry(&self, root: &Utf8Path) -> bool {
        normalize(root).join(STYLE_ENTRY).is_file()
    }

    fn has_code_entry(&self, root: &Utf8Path) -> bool {
        normalize(root).join(CODE_ENTRY).is_file()
    }

    fn has_spec_entry(&self, root: &Utf8Path) -> bool {
        normalize(root).join(SPEC_ENTRY).is_file()
    }

    fn find_templates(&self, root: &Utf8Path) -> Vec<Utf8PathBuf> {
        let root = normalize(root);

        Self::glob(&root, "*/**/*.html")
            .into_iter()
            .filter(|path| path.parent() != Some(root.as_path()))
            .collect()
    }

    fn find_images(&self, root: &Utf8Path, asset_folders: &[String]) -> Vec<Utf8PathBuf> {
        let root = normalize(root);
        let excluded = asset_patterns(&root, asset_folders);

        Self::glob(&root, "**/*.svg")
            .into_iter()
            .filter(|path| !excluded.iter().any(|p| p.matches_path(path.as_std_path())))
            .collect()
    }

    fn find_sources(&self, root: &Utf8Path) -> Vec<Utf8PathBuf> {
        let root = normalize(root);

        Self::glob(&root, "**/*.ts")
            .into_iter()
            .filter(|path| is_source(&root, path))
            .collect()
    }

    fn find_all_sources(&self, root: &Utf8Path) -> Vec<Utf8PathBuf> {
        Self::glob(&normalize(root), "**/*.ts")
    }

    fn find_specs(&self, root: &Utf8Path) -> Vec<Utf8PathBuf> {
        Self::glob(&normalize(root), "**/*.spec.ts")
    }

    fn root_files(&self, root: &Utf8Path) -> Vec<Utf8PathBuf> {
        let root = normalize(root);
        let dir = if root.as_str().is_empty() { Utf8Path::new(".") } else { root.as_path() };

        let Ok(entries) = dir.read_dir_utf8() else {
            return vec![];
        };

        let mut files: Vec<_> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .map(|entry| root.join(entry.file_name()))
            .filter(|path| is_copied(path))
            .collect();

        files.sort();
        files
    }
}

/// In-memory probe for deterministic tests, holding a plain list of files.
/// Stored paths and queried roots are normalised the same way [`FsProbe`]
/// normalises them.
#[derive(Debug, Clone, Default)]
pub struct MemoryProbe {
    files: BTreeSet<Utf8PathBuf>,
}

impl MemoryProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.files.insert(normalize(&path.into()));
        self
    }

    pub fn with_files<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.files
            .extend(paths.into_iter().map(|path| normalize(&path.into())));
        self
    }

    /// Loads every file found under `root` from disk.
    pub fn snapshot(root: impl AsRef<Utf8Path>) -> std::io::Result<Self> {
        fn walk(dir: &Utf8Path, acc: &mut BTreeSet<Utf8PathBuf>) -> std::io::Result<()> {
            for entry in fs::read_dir(dir)? {
                let entry = entry?;
                let path = Utf8PathBuf::try_from(entry.path())
                    .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
                if entry.file_type()?.is_dir() {
                    walk(&path, acc)?;
                } else {
                    acc.insert(normalize(&path));
                }
            }
            Ok(())
        }

        let mut files = BTreeSet::new();
        walk(root.as_ref(), &mut files)?;
        Ok(Self { files })
    }

    fn under<'a>(&'a self, root: &'a Utf8Path) -> impl Iterator<Item = &'a Utf8PathBuf> + 'a {
        self.files
            .iter()
            .filter(move |path| path.strip_prefix(root).is_ok())
    }

    fn with_extension<'a>(&'a self, root: &'a Utf8Path, ext: &'a str) -> impl Iterator<Item = &'a Utf8PathBuf> + 'a {
        self.under(root)
            .filter(move |path| path.extension() == Some(ext))
    }
}

impl ConventionProbe for MemoryProbe {
    fn has_style_entry(&self, root: &Utf8Path) -> bool {
        self.files.contains(&normalize(root).join(STYLE_ENTRY))
    }

    fn has_code_entry(&self, root: &Utf8Path) -> bool {
        self.files.contains(&normalize(root).join(CODE_ENTRY))
    }

    fn has_spec_entry(&self, root: &Utf8Path) -> bool {
        self.files.contains(&normalize(root).join(SPEC_ENTRY))
    }

    fn find_templates(&self, root: &Utf8Path) -> Vec<Utf8PathBuf> {
        let root = normalize(root);

        self.with_extension(&root, "html")
            .filter(|path| path.parent() != Some(root.as_path()))
            .cloned()
            .collect()
    }

    fn find_images(&self, root: &Utf8Path, asset_folders: &[String]) -> Vec<Utf8PathBuf> {
        let root = normalize(root);
        let excluded: Vec<_> = asset_folders
            .iter()
            .map(|folder| root.join(normalize(Utf8Path::new(folder))))
            .collect();

        self.with_extension(&root, "svg")
            .filter(|path| !excluded.iter().any(|folder| path.strip_prefix(folder).is_ok()))
            .cloned()
            .collect()
    }

    fn find_sources(&self, root: &Utf8Path) -> Vec<Utf8PathBuf> {
        let root = normalize(root);

        self.with_extension(&root, "ts")
            .filter(|path| is_source(&root, path))
            .cloned()
            .collect()
    }

    fn find_all_sources(&self, root: &Utf8Path) -> Vec<Utf8PathBuf> {
        let root = normalize(root);
        self.with_extension(&root, "ts").cloned().collect()
    }

    fn find_specs(&self, root: &Utf8Path) -> Vec<Utf8PathBuf> {
        let root = normalize(root);

        self.under(&root)
            .filter(|path| is_spec(path))
            .cloned()
            .collect()
    }

    fn root_files(&self, root: &Utf8Path) -> Vec<Utf8PathBuf> {
        let root = normalize(root);

        self.under(&root)
            .filter(|path| path.parent() == Some(root.as_path()))
            .filter(|path| is_copied(path))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Utf8Path, files: &[&str]) {
        for file in files {
            let path = root.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }
    }

    const FILES: &[&str] = &[
        "index.ts",
        "index.scss",
        "spec.ts",
        "index.html",
        "favicon.ico",
        "app/app.ts",
        "app/app.spec.ts",
        "app/app.html",
        "app/deep/panel.html",
        "app/icon.svg",
        "fonts/logo.svg",
        "media/hero/banner.svg",
    ];

    fn fixture() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().join("src")).unwrap();
        touch(&root, FILES);
        (dir, root)
    }

    /// Same tree, created below the working directory so it can be
    /// addressed through relative roots. Returns the plain `<dir>/src` root.
    fn relative_fixture() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir_in(".").unwrap();
        let name = dir.path().file_name().unwrap().to_str().unwrap();
        let root = Utf8PathBuf::from(name).join("src");
        touch(&root, FILES);
        (dir, root)
    }

    fn assert_probes_agree(root: &Utf8Path) {
        let memory = MemoryProbe::snapshot(root).unwrap();
        let folders = vec!["fonts".to_string()];

        assert_eq!(memory.has_spec_entry(root), FsProbe.has_spec_entry(root));
        assert_eq!(memory.find_templates(root), FsProbe.find_templates(root));
        assert_eq!(
            memory.find_images(root, &folders),
            FsProbe.find_images(root, &folders)
        );
        assert_eq!(memory.find_sources(root), FsProbe.find_sources(root));
        assert_eq!(memory.find_all_sources(root), FsProbe.find_all_sources(root));
        assert_eq!(memory.find_specs(root), FsProbe.find_specs(root));
        assert_eq!(memory.root_files(root), FsProbe.root_files(root));
    }

    fn names(root: &Utf8Path, paths: Vec<Utf8PathBuf>) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_entries() {
        let (_dir, root) = fixture();
        assert!(FsProbe.has_style_entry(&root));
        assert!(FsProbe.has_code_entry(&root));
        assert!(FsProbe.has_spec_entry(&root));
    }

    #[test]
    fn test_missing_directory() {
        let root = Utf8Path::new("this/does/not/exist");
        assert!(!FsProbe.has_style_entry(root));
        assert!(!FsProbe.has_code_entry(root));
        assert!(!FsProbe.has_spec_entry(root));
        assert!(FsProbe.find_templates(root).is_empty());
        assert!(FsProbe.find_images(root, &[]).is_empty());
        assert!(FsProbe.root_files(root).is_empty());
    }

    #[test]
    fn test_templates_skip_root_level() {
        let (_dir, root) = fixture();
        assert_eq!(
            names(&root, FsProbe.find_templates(&root)),
            ["app/app.html", "app/deep/panel.html"]
        );
    }

    #[test]
    fn test_images_skip_asset_folders() {
        let (_dir, root) = fixture();
        let folders = vec!["fonts".to_string(), "media".to_string()];
        assert_eq!(names(&root, FsProbe.find_images(&root, &folders)), ["app/icon.svg"]);
        assert_eq!(FsProbe.find_images(&root, &[]).len(), 3);
    }

    #[test]
    fn test_sources() {
        let (_dir, root) = fixture();
        assert_eq!(names(&root, FsProbe.find_sources(&root)), ["app/app.ts", "index.ts"]);
        assert_eq!(FsProbe.find_all_sources(&root).len(), 4);
        assert_eq!(names(&root, FsProbe.find_specs(&root)), ["app/app.spec.ts"]);
    }

    #[test]
    fn test_root_files() {
        let (_dir, root) = fixture();
        assert_eq!(names(&root, FsProbe.root_files(&root)), ["favicon.ico", "index.html"]);
    }

    #[test]
    fn test_asset_patterns_keep_order() {
        let patterns = asset_patterns(
            Utf8Path::new("src"),
            &["media".to_string(), "fonts".to_string()],
        );
        let patterns: Vec<_> = patterns.iter().map(Pattern::as_str).collect();
        assert_eq!(patterns, ["src/media/**/*", "src/fonts/**/*"]);
    }

    #[test]
    fn test_memory_probe_matches_fs_probe() {
        let (_dir, root) = fixture();
        assert_probes_agree(&root);

        let (_dir, plain) = relative_fixture();
        assert_probes_agree(&Utf8PathBuf::from(format!("./{plain}")));
    }

    #[test]
    fn test_dotted_roots() {
        let (_dir, plain) = relative_fixture();
        let dotted = Utf8PathBuf::from(format!("./{plain}"));
        let trailing = Utf8PathBuf::from(format!("{plain}/./"));
        let folders = vec!["fonts".to_string(), "media".to_string()];

        assert_eq!(names(&plain, FsProbe.find_sources(&dotted)), ["app/app.ts", "index.ts"]);
        assert_eq!(names(&plain, FsProbe.find_images(&dotted, &folders)), ["app/icon.svg"]);
        assert!(FsProbe.has_spec_entry(&dotted));

        for root in [&dotted, &trailing] {
            assert_eq!(FsProbe.find_templates(root), FsProbe.find_templates(&plain));
            assert_eq!(FsProbe.find_images(root, &folders), FsProbe.find_images(&plain, &folders));
            assert_eq!(FsProbe.find_sources(root), FsProbe.find_sources(&plain));
            assert_eq!(FsProbe.find_all_sources(root), FsProbe.find_all_sources(&plain));
            assert_eq!(FsProbe.find_specs(root), FsProbe.find_specs(&plain));
            assert_eq!(FsProbe.root_files(root), FsProbe.root_files(&plain));
        }
    }

    #[test]
    fn test_current_directory_root() {
        assert_eq!(normalize(Utf8Path::new(".")), "");
        assert_eq!(normalize(Utf8Path::new("./src/")), "src");

        let patterns = asset_patterns(Utf8Path::new("."), &["./fonts".to_string()]);
        let patterns: Vec<_> = patterns.iter().map(Pattern::as_str).collect();
        assert_eq!(patterns, ["fonts/**/*"]);

        let probe = MemoryProbe::new().with_files([
            "./index.ts",
            "spec.ts",
            "favicon.ico",
            "app/icon.svg",
            "fonts/logo.svg",
        ]);
        let root = Utf8Path::new(".");
        assert!(probe.has_code_entry(root));
        assert_eq!(probe.find_sources(root), [Utf8PathBuf::from("index.ts")]);
        assert_eq!(
            probe.find_images(root, &["fonts".to_string()]),
            [Utf8PathBuf::from("app/icon.svg")]
        );
        assert_eq!(probe.root_files(root), [Utf8PathBuf::from("favicon.ico")]);
    }
}
