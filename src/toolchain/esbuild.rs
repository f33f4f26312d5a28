use std::collections::BTreeMap;
use std::fs;
use std::process::Command;

use camino::Utf8PathBuf;

use super::{CodeCompiler, CodeVerifier, CompileJob, ToolError, execute, quote};

/// Bundles TypeScript with the `esbuild` binary.
///
/// **Note:** `esbuild` has to be available in the system PATH, or the path
/// to it set through `program`.
#[derive(Debug, Clone)]
pub struct Esbuild {
    pub program: String,
}

impl Default for Esbuild {
    fn default() -> Self {
        Self {
            program: String::from("esbuild"),
        }
    }
}

/// Expression resolving a module specifier to the global variable declared
/// for it.
fn require_shim(globals: &BTreeMap<String, String>) -> String {
    let entries: Vec<_> = globals
        .iter()
        .map(|(module, global)| format!("{}:{}", quote(module), quote(global)))
        .collect();

    format!(
        "(m=>{{const g={{{}}};if(m in g)return globalThis[g[m]];throw new Error(\"Cannot find module '\"+m+\"'\")}})",
        entries.join(",")
    )
}

impl Esbuild {
    fn args(job: &CompileJob) -> Vec<String> {
        let mut args = vec![
            job.entry.to_string(),
            String::from("--bundle"),
            String::from("--sourcemap"),
            format!("--outfile={}", job.out_file),
        ];

        // Libraries are consumed by other bundles, applications run as-is.
        if job.library {
            args.push(String::from("--format=esm"));
        } else {
            args.push(String::from("--format=iife"));
        }

        if job.minify {
            args.push(String::from("--minify"));
        }

        for module in job.globals.keys() {
            args.push(format!("--external:{module}"));
        }

        // An IIFE turns external imports into `require` calls, which only
        // exist inside the block opened by the banner.
        if !job.library && !job.globals.is_empty() {
            args.push(format!("--banner:js={{const require={};", require_shim(&job.globals)));
            args.push(String::from("--footer:js=}"));
        }

        args
    }
}

impl CodeCompiler for Esbuild {
    fn compile(&self, job: &CompileJob) -> anyhow::Result<()> {
        if let Some(dir) = job.out_file.parent() {
            fs::create_dir_all(dir).map_err(ToolError::Io)?;
        }

        execute(&self.program, Command::new(&self.program).args(Self::args(job)))?;

        tracing::info!("compiled {} -> {}", job.entry, job.out_file);
        Ok(())
    }
}

/// Type-checks sources with `tsc --noEmit`.
#[derive(Debug, Clone)]
pub struct Tsc {
    pub program: String,
}

impl Default for Tsc {
    fn default() -> Self {
        Self {
            program: String::from("tsc"),
        }
    }
}

impl CodeVerifier for Tsc {
    fn verify(&self, files: &[Utf8PathBuf]) -> anyhow::Result<()> {
        if files.is_empty() {
            return Ok(());
        }

        execute(
            &self.program,
            Command::new(&self.program)
                .arg("--noEmit")
                .arg("--pretty")
                .arg("false")
                .args(files.iter().map(|file| file.as_str())),
        )?;

        tracing::info!("verified {} files", files.len());
        Ok(())
    }
}
