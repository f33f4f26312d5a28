//! Browser presets for the compiled spec bundle of each bundle.
use std::borrow::Cow;
use std::fmt::Display;
use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::task::{Stage, TaskId, TaskNode};
use crate::toolchain::{TestRun, TestRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Browser {
    Headless,
    Chrome,
    Firefox,
    IE,
    Edge,
}

impl Browser {
    pub fn as_str(self) -> &'static str {
        match self {
            Browser::Headless => "headless",
            Browser::Chrome => "chrome",
            Browser::Firefox => "firefox",
            Browser::IE => "ie",
            Browser::Edge => "edge",
        }
    }
}

impl Display for Browser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named set of browsers, the key becomes part of the task id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub key: Cow<'static, str>,
    pub browsers: Vec<Browser>,
}

impl Preset {
    pub fn new(key: impl Into<Cow<'static, str>>, browsers: impl Into<Vec<Browser>>) -> Self {
        Self {
            key: key.into(),
            browsers: browsers.into(),
        }
    }

    /// Interactive runs only make sense against a single real browser, so
    /// only qualified keys with exactly one browser get a debug variant.
    pub fn has_debug(&self) -> bool {
        self.key.contains(':') && self.browsers.len() == 1
    }
}

/// Ordered preset table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestMatrix {
    presets: Vec<Preset>,
}

impl Default for TestMatrix {
    fn default() -> Self {
        use Browser::*;

        Self {
            presets: vec![
                Preset::new("spec", [Headless]),
                Preset::new("spec:chrome", [Chrome]),
                Preset::new("spec:ie", [IE]),
                Preset::new("spec:firefox", [Firefox]),
                Preset::new("spec:edge", [Edge]),
                Preset::new("spec:windows", [Chrome, Firefox, IE, Edge]),
                Preset::new("spec:linux", [Chrome, Firefox]),
            ],
        }
    }
}

impl TestMatrix {
    pub fn empty() -> Self {
        Self { presets: vec![] }
    }

    /// Adds a preset, replacing an existing one with the same key in place.
    pub fn with_preset(mut self, preset: Preset) -> Self {
        match self.presets.iter_mut().find(|p| p.key == preset.key) {
            Some(existing) => *existing = preset,
            None => self.presets.push(preset),
        }
        self
    }

    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    /// One test node per preset, then one debug node per single-browser
    /// preset. Every node depends only on `compiled`.
    pub(crate) fn expand(
        &self,
        bundle: &str,
        compiled: &TaskId,
        entry: &Utf8PathBuf,
        runner: &Arc<dyn TestRunner>,
    ) -> Vec<TaskNode> {
        let node = |stage: Stage, preset: &Preset, single_run: bool| {
            let id = TaskId::new(bundle, stage).with_qualifier(&preset.key);
            let run = TestRun {
                entries: vec![entry.clone()],
                browsers: preset.browsers.clone(),
                single_run,
            };
            let runner = runner.clone();

            TaskNode::new(id)
                .with_prerequisites([compiled.clone()])
                .with_inputs(vec![entry.clone()])
                .with_action(move || runner.run(&run))
        };

        let tests = self.presets.iter().map(|preset| node(Stage::Test, preset, true));
        let debug = self
            .presets
            .iter()
            .filter(|preset| preset.has_debug())
            .map(|preset| node(Stage::Debug, preset, false));

        tests.chain(debug).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolchain::testing::{Call, recording};

    fn expand(matrix: &TestMatrix) -> (Vec<TaskNode>, Arc<crate::toolchain::testing::Recorder>) {
        let (toolchain, recorder) = recording(false);
        let compiled = TaskId::new("app", Stage::SpecCompile);
        let nodes = matrix.expand("app", &compiled, &".tmp/app.spec.js".into(), &toolchain.tests);
        (nodes, recorder)
    }

    #[test]
    fn test_default_table() {
        let (nodes, _) = expand(&TestMatrix::default());
        let names: Vec<_> = nodes.iter().map(|n| n.id().to_string()).collect();

        assert_eq!(
            names,
            [
                "app:spec",
                "app:spec:chrome",
                "app:spec:ie",
                "app:spec:firefox",
                "app:spec:edge",
                "app:spec:windows",
                "app:spec:linux",
                "app:spec:chrome:debug",
                "app:spec:ie:debug",
                "app:spec:firefox:debug",
                "app:spec:edge:debug",
            ]
        );

        for node in &nodes {
            let prerequisites: Vec<_> = node.prerequisites().iter().map(ToString::to_string).collect();
            assert_eq!(prerequisites, ["app:spec:compile"]);
        }
    }

    #[test]
    fn test_actions_call_runner() {
        let (nodes, recorder) = expand(&TestMatrix::default());

        nodes[5].run().unwrap();
        nodes[7].run().unwrap();

        assert_eq!(
            recorder.take(),
            [
                Call::Test(TestRun {
                    entries: vec![".tmp/app.spec.js".into()],
                    browsers: vec![Browser::Chrome, Browser::Firefox, Browser::IE, Browser::Edge],
                    single_run: true,
                }),
                Call::Test(TestRun {
                    entries: vec![".tmp/app.spec.js".into()],
                    browsers: vec![Browser::Chrome],
                    single_run: false,
                }),
            ]
        );
    }

    #[test]
    fn test_custom_preset() {
        let matrix = TestMatrix::empty()
            .with_preset(Preset::new("spec", [Browser::Headless]))
            .with_preset(Preset::new("spec:safari", [Browser::Chrome]))
            .with_preset(Preset::new("spec", [Browser::Firefox]));

        assert_eq!(matrix.presets().len(), 2);
        assert_eq!(matrix.presets()[0].browsers, [Browser::Firefox]);

        let (nodes, _) = expand(&matrix);
        let names: Vec<_> = nodes.iter().map(|n| n.id().to_string()).collect();
        assert_eq!(names, ["app:spec", "app:spec:safari", "app:spec:safari:debug"]);
    }
}
