//! Generation of the spec entry compiled for test runs.
//!
//! The hand-written `spec.ts` of a bundle is copied into `.tmp/<bundle>/`,
//! its relative imports are rewritten so they still resolve from there, and
//! one side-effect import per `*.spec.ts` file is appended. The transform is
//! purely textual, nothing is parsed.
use std::fs;
use std::sync::LazyLock;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use regex::{Captures, Regex};

/// Relative module specifiers in `import ... from`, `export ... from`, bare
/// `import '...'`, dynamic `import(...)` and `require(...)`.
static RELATIVE_SPECIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\bfrom\s*|\bimport\s*\(?\s*|\brequire\s*\(\s*)(['"])(\.{1,2}/[^'"\n]*)['"]"#)
        .expect("valid specifier pattern")
});

/// Resolves `.` and `..` without touching the filesystem.
fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut out = Utf8PathBuf::new();

    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Utf8Component::Normal(_)))
                    && out.pop();
                if !popped {
                    out.push("..");
                }
            }
            other => out.push(other.as_str()),
        }
    }

    out
}

/// Path of `target` as seen from the directory `from`, both taken lexically.
fn relative(from: &Utf8Path, target: &Utf8Path) -> Utf8PathBuf {
    let from = normalize(from);
    let target = normalize(target);

    let from: Vec<_> = from.components().collect();
    let target: Vec<_> = target.components().collect();
    let common = from.iter().zip(&target).take_while(|(a, b)| a == b).count();

    let mut out = Utf8PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for component in &target[common..] {
        out.push(component.as_str());
    }
    out
}

/// Module specifier pointing at `target` from a module in `from`.
fn specifier(from: &Utf8Path, target: &Utf8Path) -> String {
    let path = relative(from, target);
    if path.as_str().starts_with("..") {
        path.into_string()
    } else {
        format!("./{path}")
    }
}

/// Renders the injected spec entry.
///
/// `source` is the content of `root/spec.ts`, `out_dir` the folder the result
/// is written to and `specs` every `*.spec.ts` file of the bundle.
pub fn render_spec_entry(source: &str, root: &Utf8Path, out_dir: &Utf8Path, specs: &[Utf8PathBuf]) -> String {
    let mut out = RELATIVE_SPECIFIER
        .replace_all(source, |caps: &Captures| {
            let target = root.join(&caps[3]);
            format!("{}{q}{}{q}", &caps[1], specifier(out_dir, &target), q = &caps[2])
        })
        .into_owned();

    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }

    let mut specs: Vec<_> = specs.iter().collect();
    specs.sort();

    for spec in specs {
        let module = spec.as_str().strip_suffix(".ts").unwrap_or(spec.as_str());
        out.push_str(&format!("import '{}';\n", specifier(out_dir, Utf8Path::new(module))));
    }

    out
}

/// Reads `root/spec.ts` and writes the injected entry to `out_file`.
pub fn write_spec_entry(
    entry: &Utf8Path,
    out_file: &Utf8Path,
    specs: &[Utf8PathBuf],
) -> std::io::Result<()> {
    let source = fs::read_to_string(entry)?;
    let root = entry.parent().unwrap_or(Utf8Path::new(""));
    let out_dir = out_file.parent().unwrap_or(Utf8Path::new(""));

    fs::create_dir_all(out_dir)?;
    fs::write(out_file, render_spec_entry(&source, root, out_dir, specs))?;

    tracing::debug!("injected {} spec files into {}", specs.len(), out_file);
    Ok(())
}
