//! Assembly of the task graph from the configuration and the conventions
//! found in each bundle folder.
use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info};

use crate::config::{BundleConfig, GlobalConfig};
use crate::error::KumitateError;
use crate::graph::TaskGraph;
use crate::inject::write_spec_entry;
use crate::matrix::TestMatrix;
use crate::probe::{CODE_ENTRY, ConventionProbe, SPEC_ENTRY, STYLE_ENTRY};
use crate::registry::StyleRegistry;
use crate::task::{Prerequisite, Prerequisites, Stage, TaskId, TaskNode};
use crate::toolchain::{CompileJob, Layout, StyleJob, Toolchain};
use crate::utils::{clear_dir, copy_rec};

/// Builds the task graph of a single configuration.
///
/// A builder is consumed by [`Builder::build`], so the style registry it owns
/// never outlives one construction. Output paths come from
/// [`Toolchain::layout`], the same layout the bundled collaborators write to.
pub struct Builder<'a> {
    config: &'a GlobalConfig,
    probe: &'a dyn ConventionProbe,
    toolchain: &'a Toolchain,
    matrix: TestMatrix,
    styles: StyleRegistry,
    graph: TaskGraph,
}

impl<'a> Builder<'a> {
    pub fn new(config: &'a GlobalConfig, probe: &'a dyn ConventionProbe, toolchain: &'a Toolchain) -> Self {
        Self {
            config,
            probe,
            toolchain,
            matrix: TestMatrix::default(),
            styles: StyleRegistry::new(),
            graph: TaskGraph::new(),
        }
    }

    pub fn with_matrix(mut self, matrix: TestMatrix) -> Self {
        self.matrix = matrix;
        self
    }

    /// Validates the configuration, then generates every bundle in
    /// declaration order followed by the project-wide tasks.
    pub fn build(mut self) -> Result<TaskGraph, KumitateError> {
        let config = self.config;
        config.validate()?;

        let mut specs = Vec::new();
        for bundle in &config.bundles {
            let before = self.graph.len();
            if let Some(spec) = self.bundle(bundle)? {
                specs.push(spec);
            }
            info!(bundle = %bundle.name, tasks = self.graph.len() - before, "generated tasks");
        }

        self.global(specs)?;
        Ok(self.graph)
    }

    fn layout(&self) -> &'a Layout {
        &self.toolchain.layout
    }

    fn insert(&mut self, node: TaskNode) -> Result<(), KumitateError> {
        Ok(self.graph.insert(node)?)
    }

    /// Generates the tasks of one bundle. Returns the id of its headless test
    /// task when the bundle has a spec pipeline.
    fn bundle(&mut self, bundle: &BundleConfig) -> Result<Option<TaskId>, KumitateError> {
        let name = bundle.name.as_str();
        let root = bundle.root.as_path();
        let out_dir = self.layout().out_dir(name);
        let minify = bundle.effective_minify(self.config);

        let mut pre_build: Prerequisites = bundle
            .before_build
            .iter()
            .map(|id| Prerequisite::external(id))
            .collect();
        pre_build.extend(
            bundle
                .dependencies
                .iter()
                .map(|dependency| TaskId::new(dependency, Stage::PreBuild)),
        );
        let mut build = Prerequisites::new();

        if bundle.is_angular() {
            if let Some(id) = self.templates(bundle)? {
                pre_build.insert(id);
            }
            if let Some(id) = self.images(bundle)? {
                pre_build.insert(id);
            }
        } else {
            debug!(bundle = name, "angular disabled, skipping template and image caches");
        }

        build.insert(self.assets(bundle, &out_dir)?);

        if let Some(id) = self.styles(bundle, &out_dir, minify)? {
            pre_build.insert(id);
        }

        let pre_build_id = TaskId::new(name, Stage::PreBuild);
        self.insert(TaskNode::new(pre_build_id.clone()).with_prerequisites(pre_build.iter().cloned()))?;

        let has_code = self.probe.has_code_entry(root);
        if has_code {
            build.insert(self.code(bundle, &out_dir, minify, &pre_build_id)?);
        } else {
            debug!(bundle = name, "no {CODE_ENTRY}, skipping code stages");
        }

        let build_tasks = TaskId::new(name, Stage::BuildTasks);
        let files = self.probe.root_files(root);
        let copies = files.clone();
        let target = out_dir.clone();
        self.insert(
            TaskNode::new(build_tasks.clone())
                .with_prerequisites(pre_build.iter().chain(&build).cloned())
                .with_inputs(files)
                .with_action(move || {
                    if copies.is_empty() {
                        return Ok(());
                    }
                    std::fs::create_dir_all(&target)?;
                    for file in &copies {
                        if let Some(file_name) = file.file_name() {
                            std::fs::copy(file, target.join(file_name))?;
                        }
                    }
                    Ok(())
                }),
        )?;

        self.insert(TaskNode::new(TaskId::new(name, Stage::Build)).with_prerequisites([build_tasks]))?;

        if !self.probe.has_spec_entry(root) {
            return Ok(None);
        }
        if !has_code {
            debug!(bundle = name, "{SPEC_ENTRY} without {CODE_ENTRY}, skipping spec stages");
            return Ok(None);
        }

        self.spec(bundle, minify, &pre_build)
    }

    fn templates(&mut self, bundle: &BundleConfig) -> Result<Option<TaskId>, KumitateError> {
        let files = self.probe.find_templates(&bundle.root);
        if files.is_empty() {
            return Ok(None);
        }

        let id = TaskId::new(&bundle.name, Stage::Templates);
        let precache = self.toolchain.precache.clone();
        let inputs = files.clone();
        let name = bundle.name.clone();

        self.insert(
            TaskNode::new(id.clone())
                .with_inputs(inputs)
                .with_action(move || precache.templates(&files, &name)),
        )?;

        Ok(Some(id))
    }

    fn images(&mut self, bundle: &BundleConfig) -> Result<Option<TaskId>, KumitateError> {
        let files = self.probe.find_images(&bundle.root, &bundle.asset_folders);
        if files.is_empty() {
            return Ok(None);
        }

        let id = TaskId::new(&bundle.name, Stage::Images);
        let precache = self.toolchain.precache.clone();
        let inputs = files.clone();
        let name = bundle.name.clone();

        self.insert(
            TaskNode::new(id.clone())
                .with_inputs(inputs)
                .with_action(move || precache.images(&files, &name)),
        )?;

        Ok(Some(id))
    }

    /// Always generated, a bundle without asset folders gets a no-op copy.
    fn assets(&mut self, bundle: &BundleConfig, out_dir: &Utf8Path) -> Result<TaskId, KumitateError> {
        let id = TaskId::new(&bundle.name, Stage::Assets);

        let copies: Vec<(Utf8PathBuf, Utf8PathBuf)> = bundle
            .asset_folders
            .iter()
            .map(|folder| (bundle.root.join(folder), out_dir.join(folder)))
            .collect();
        let inputs = copies.iter().map(|(src, _)| src.clone()).collect();

        self.insert(
            TaskNode::new(id.clone())
                .with_inputs(inputs)
                .with_action(move || {
                    for (src, dst) in &copies {
                        if !src.is_dir() {
                            debug!("asset folder {src} doesn't exist, skipping");
                            continue;
                        }
                        let copied = copy_rec(src, dst)?;
                        debug!("copied {copied} files from {src}");
                    }
                    Ok(())
                }),
        )?;

        Ok(id)
    }

    fn styles(&mut self, bundle: &BundleConfig, out_dir: &Utf8Path, minify: bool) -> Result<Option<TaskId>, KumitateError> {
        let root = bundle.root.as_path();
        if !self.probe.has_style_entry(root) {
            return Ok(None);
        }

        let id = TaskId::new(&bundle.name, Stage::Styles);
        let upstream: Vec<TaskId> = self.styles.upstream(&bundle.dependencies).cloned().collect();

        let job = StyleJob {
            entry: root.join(STYLE_ENTRY),
            partials: format!("{root}/**/_*.scss"),
            out_dir: out_dir.join("css"),
            minify,
            bundle: bundle.clone(),
        };
        let compiler = self.toolchain.styles.clone();

        self.insert(
            TaskNode::new(id.clone())
                .with_prerequisites(upstream)
                .with_inputs(vec![job.entry.clone()])
                .with_action(move || compiler.compile(&job)),
        )?;
        self.styles.register(&bundle.name, id.clone());

        Ok(Some(id))
    }

    /// Generates `code:verify` and `code:compile`, returns the latter.
    fn code(
        &mut self,
        bundle: &BundleConfig,
        out_dir: &Utf8Path,
        minify: bool,
        pre_build: &TaskId,
    ) -> Result<TaskId, KumitateError> {
        let name = bundle.name.as_str();
        let root = bundle.root.as_path();

        // Only direct dependencies are checked together with the bundle, the
        // sources a dependency itself depends on are left out.
        let mut sources = self.probe.find_sources(root);
        for dependency in &bundle.dependencies {
            if let Some(dependency) = self.config.bundle(dependency) {
                sources.extend(self.probe.find_sources(&dependency.root));
            }
        }

        let verify = TaskId::new(name, Stage::CodeVerify);
        let verifier = self.toolchain.verifier.clone();
        let files = sources.clone();

        self.insert(
            TaskNode::new(verify.clone())
                .with_prerequisites([pre_build.clone()])
                .with_inputs(sources)
                .with_action(move || verifier.verify(&files)),
        )?;

        let compile = TaskId::new(name, Stage::CodeCompile);
        let job = CompileJob {
            entry: root.join(CODE_ENTRY),
            out_file: out_dir.join("js").join(format!("{name}.js")),
            minify,
            library: bundle.library,
            globals: bundle.globals.clone(),
        };
        let compiler = self.toolchain.compiler.clone();

        self.insert(
            TaskNode::new(compile.clone())
                .with_prerequisites([verify])
                .with_inputs(vec![job.entry.clone()])
                .with_action(move || compiler.compile(&job)),
        )?;

        Ok(compile)
    }

    /// Injection, verification and compilation of the spec bundle, followed
    /// by the test matrix.
    fn spec(
        &mut self,
        bundle: &BundleConfig,
        minify: bool,
        pre_build: &Prerequisites,
    ) -> Result<Option<TaskId>, KumitateError> {
        let name = bundle.name.as_str();
        let root = bundle.root.as_path();

        let inject = TaskId::new(name, Stage::SpecInject);
        let entry = root.join(SPEC_ENTRY);
        let injected = self.layout().spec_entry(name);
        let specs = self.probe.find_specs(root);

        let mut inputs = vec![entry.clone()];
        inputs.extend(specs.iter().cloned());
        let out_file = injected.clone();

        self.insert(
            TaskNode::new(inject.clone())
                .with_inputs(inputs)
                .with_action(move || Ok(write_spec_entry(&entry, &out_file, &specs)?)),
        )?;

        let verify = TaskId::new(name, Stage::SpecVerify);
        let sources = self.probe.find_all_sources(root);
        let files = sources.clone();
        let verifier = self.toolchain.verifier.clone();

        self.insert(
            TaskNode::new(verify.clone())
                .with_inputs(sources)
                .with_action(move || verifier.verify(&files)),
        )?;

        let compile = TaskId::new(name, Stage::SpecCompile);
        let compiled = self.layout().spec_bundle(name);
        let job = CompileJob {
            entry: injected.clone(),
            out_file: compiled.clone(),
            minify,
            library: false,
            globals: bundle.globals.clone(),
        };
        let compiler = self.toolchain.compiler.clone();

        let mut prerequisites = Prerequisites::new();
        prerequisites.insert(inject);
        prerequisites.insert(verify);
        prerequisites.extend(pre_build.iter().cloned());

        self.insert(
            TaskNode::new(compile.clone())
                .with_prerequisites(prerequisites.iter().cloned())
                .with_inputs(vec![injected])
                .with_action(move || compiler.compile(&job)),
        )?;

        for node in self.matrix.expand(name, &compile, &compiled, &self.toolchain.tests) {
            self.insert(node)?;
        }

        let headless = TaskId::new(name, Stage::Test).with_qualifier("spec");
        Ok(self.graph.contains(&headless).then_some(headless))
    }

    /// `clean`, `build` and, when any bundle has tests, `spec`.
    fn global(&mut self, specs: Vec<TaskId>) -> Result<(), KumitateError> {
        let dist = self.layout().dist.clone();
        let tmp = self.layout().tmp.clone();

        self.insert(
            TaskNode::new(TaskId::global(Stage::Clean))
                .with_prerequisites(self.config.before_clean.iter().map(|id| Prerequisite::external(id)))
                .with_action(move || {
                    clear_dir(&dist)?;
                    clear_dir(&tmp)?;
                    Ok(())
                }),
        )?;

        let builds: Vec<_> = self
            .config
            .bundles
            .iter()
            .map(|bundle| TaskId::new(&bundle.name, Stage::Build))
            .collect();
        self.insert(TaskNode::new(TaskId::global(Stage::Build)).with_prerequisites(builds))?;

        if !specs.is_empty() {
            self.insert(
                TaskNode::new(TaskId::global(Stage::Test).with_qualifier("spec")).with_prerequisites(specs),
            )?;
        }

        Ok(())
    }
}
