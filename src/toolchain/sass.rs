use std::fs;
use std::process::Command;

use camino::Utf8PathBuf;

use super::{StyleCompiler, StyleJob, ToolError, execute};

/// Compiles SCSS with the `sass` command-line tool. Used when the crate is
/// built without the `grass` feature.
#[derive(Debug, Clone)]
pub struct SassCli {
    pub program: String,
}

impl Default for SassCli {
    fn default() -> Self {
        Self {
            program: String::from("sass"),
        }
    }
}

impl SassCli {
    fn args(job: &StyleJob) -> Vec<String> {
        let out: Utf8PathBuf = job.out_dir.join(format!("{}.css", job.bundle.name));

        let mut args = vec![String::from("--no-source-map")];
        if job.minify {
            args.push(String::from("--style=compressed"));
        }
        if let Some(dir) = job.entry.parent() {
            args.push(format!("--load-path={dir}"));
        }
        args.push(format!("{}:{}", job.entry, out));
        args
    }
}

impl StyleCompiler for SassCli {
    fn compile(&self, job: &StyleJob) -> anyhow::Result<()> {
        fs::create_dir_all(&job.out_dir).map_err(ToolError::Io)?;
        execute(&self.program, Command::new(&self.program).args(Self::args(job)))?;
        Ok(())
    }
}
