use std::process::Command;

use camino::Utf8PathBuf;

use super::{TestRun, TestRunner, execute};
use crate::matrix::Browser;

/// Runs compiled spec bundles with `karma start`.
///
/// The entry files are passed in the `KARMA_FILES` environment variable as a
/// comma separated list, the karma config is expected to read them from there.
#[derive(Debug, Clone)]
pub struct Karma {
    pub program: String,
    pub config: Utf8PathBuf,
}

impl Default for Karma {
    fn default() -> Self {
        Self {
            program: String::from("karma"),
            config: Utf8PathBuf::from("karma.conf.js"),
        }
    }
}

fn launcher(browser: Browser) -> &'static str {
    match browser {
        Browser::Headless => "ChromeHeadless",
        Browser::Chrome => "Chrome",
        Browser::Firefox => "Firefox",
        Browser::IE => "IE",
        Browser::Edge => "Edge",
    }
}

impl Karma {
    fn args(&self, run: &TestRun) -> Vec<String> {
        let browsers: Vec<_> = run.browsers.iter().copied().map(launcher).collect();

        vec![
            String::from("start"),
            self.config.to_string(),
            format!("--browsers={}", browsers.join(",")),
            String::from(if run.single_run { "--single-run" } else { "--no-single-run" }),
        ]
    }
}

impl TestRunner for Karma {
    fn run(&self, run: &TestRun) -> anyhow::Result<()> {
        let files: Vec<_> = run.entries.iter().map(|e| e.as_str()).collect();

        execute(
            &self.program,
            Command::new(&self.program)
                .args(self.args(run))
                .env("KARMA_FILES", files.join(",")),
        )?;

        Ok(())
    }
}
