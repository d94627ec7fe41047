use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::artifacts::{FilesList, RegistryWrite, write_component_registry, write_files_list};
use crate::config::DevConfig;
use crate::parser::components::relative_display;
use crate::parser::languages::PYTHON_EXTENSION;
use crate::parser::{Extraction, extract_all};
use crate::reload::ReloadNotifier;
use crate::routes::{RouteFileSet, route_files, route_table};
use crate::supervisor::{Backend, RestartOutcome};
use crate::walker::{is_build_cache_path, walk_app_tree, walk_component_sources};

use super::Pipeline;

/// Where the project keeps what the app pipeline reads and writes.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub app_root: PathBuf,
    pub components_root: PathBuf,
    pub artifacts_dir: PathBuf,
    pub exclude: Vec<String>,
    pub markers: Vec<String>,
}

impl ProjectLayout {
    pub fn from_config(config: &DevConfig) -> Self {
        Self {
            root: config.root.clone(),
            app_root: config.app_root(),
            components_root: config.components_root(),
            artifacts_dir: config.artifacts_dir(),
            exclude: config.paths.exclude.clone(),
            markers: config.dev.component_decorators.clone(),
        }
    }
}

/// Why a pass did (or did not) restart the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The trigger is backend source.
    SourceChange,
    /// A route file was added or removed.
    RouteSetChanged,
    /// The trigger is a compiled cache artifact: nothing to do.
    BuildCache,
    /// Anything else: reload without restarting.
    ReloadOnly,
}

/// Record of one coordinated pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRun {
    pub trigger: Option<PathBuf>,
    pub classification: Classification,
    pub artifacts_regenerated: bool,
    pub restarted: bool,
    pub reloaded: bool,
}

/// Decide what a pass does, in priority order.
pub fn classify(
    trigger: Option<&Path>,
    previous: Option<&RouteFileSet>,
    current: &RouteFileSet,
) -> Classification {
    let cache_hit = trigger.is_some_and(is_build_cache_path);
    let is_source = trigger
        .and_then(|p| p.extension())
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext == PYTHON_EXTENSION);

    if is_source && !cache_hit {
        return Classification::SourceChange;
    }
    if previous.is_some_and(|prev| prev != current) {
        return Classification::RouteSetChanged;
    }
    if cache_hit {
        return Classification::BuildCache;
    }
    Classification::ReloadOnly
}

/// Artifacts written by one regeneration.
#[derive(Debug)]
pub struct Regeneration {
    pub route_set: RouteFileSet,
    pub files_written: bool,
    pub registry: Option<RegistryWrite>,
}

/// Run the Extractor over the component tree and replace the registry.
pub fn regenerate_registry(
    layout: &ProjectLayout,
) -> anyhow::Result<(Extraction, RegistryWrite)> {
    let sources = walk_component_sources(&layout.components_root, &layout.root, &layout.exclude);
    let extraction = extract_all(&sources, &layout.root, &layout.markers);
    let outcome = write_component_registry(&layout.artifacts_dir, &extraction.components)?;
    Ok((extraction, outcome))
}

/// Rewrite the file listing and the component registry.
///
/// Write failures are logged; the route snapshot is always returned.
pub fn regenerate(layout: &ProjectLayout) -> Regeneration {
    let files = walk_app_tree(&layout.app_root);
    let listing = FilesList {
        files: files
            .iter()
            .map(|f| relative_display(f, &layout.root))
            .collect(),
        routes: route_table(&layout.app_root, &files),
    };

    let files_written = match write_files_list(&layout.artifacts_dir, &listing) {
        Ok(_) => true,
        Err(err) => {
            tracing::warn!(error = %err, "failed to write file listing");
            false
        }
    };

    let registry = match regenerate_registry(layout) {
        Ok((extraction, outcome)) => {
            tracing::debug!(
                files = extraction.file_count,
                components = extraction.components.len(),
                failures = extraction.failures.len(),
                ?outcome,
                "component registry regenerated"
            );
            Some(outcome)
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to write component registry");
            None
        }
    };

    Regeneration {
        route_set: route_files(&files),
        files_written,
        registry,
    }
}

/// The application pipeline: regenerate artifacts, restart when needed, reload.
pub struct AppPipeline<B> {
    layout: ProjectLayout,
    backend: B,
    notifier: Arc<dyn ReloadNotifier>,
    ready_timeout: Duration,
    previous: Option<RouteFileSet>,
}

impl<B: Backend> AppPipeline<B> {
    pub fn new(
        layout: ProjectLayout,
        backend: B,
        notifier: Arc<dyn ReloadNotifier>,
        ready_timeout: Duration,
    ) -> Self {
        Self {
            layout,
            backend,
            notifier,
            ready_timeout,
            previous: None,
        }
    }

    /// Execute one coordinated pass.
    pub async fn pass(&mut self, trigger: Option<PathBuf>) -> PipelineRun {
        let layout = self.layout.clone();
        let regeneration = match tokio::task::spawn_blocking(move || regenerate(&layout)).await {
            Ok(regeneration) => regeneration,
            Err(err) => {
                tracing::error!(error = %err, "artifact regeneration panicked");
                Regeneration {
                    route_set: self.previous.clone().unwrap_or_default(),
                    files_written: false,
                    registry: None,
                }
            }
        };

        let classification = classify(
            trigger.as_deref(),
            self.previous.as_ref(),
            &regeneration.route_set,
        );

        let mut run = PipelineRun {
            trigger,
            classification,
            artifacts_regenerated: regeneration.files_written && regeneration.registry.is_some(),
            restarted: false,
            reloaded: false,
        };

        match classification {
            Classification::BuildCache => {
                tracing::debug!(trigger = ?run.trigger, "build cache change, nothing to do");
            }
            Classification::ReloadOnly => {
                self.notifier.reload("app");
                run.reloaded = true;
            }
            Classification::SourceChange | Classification::RouteSetChanged => {
                tracing::info!(trigger = ?run.trigger, ?classification, "restarting backend");
                run.restarted = self.restart_then_reload().await;
                run.reloaded = run.restarted;
            }
        }

        self.previous = Some(regeneration.route_set);
        run
    }

    /// Returns true once the new backend is listening and reload was signalled.
    async fn restart_then_reload(&mut self) -> bool {
        match self.backend.restart().await {
            Ok(RestartOutcome::Restarted) => {}
            Ok(RestartOutcome::Skipped) => {
                tracing::debug!("restart already in flight, leaving reload to it");
                return false;
            }
            Err(err) => {
                tracing::error!(error = %err, "backend failed to start; change a file to retry");
                return false;
            }
        }

        match self.backend.wait_until_listening(self.ready_timeout).await {
            Ok(()) => {
                self.notifier.reload("app");
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "backend not listening, withholding reload");
                false
            }
        }
    }
}

impl<B: Backend> Pipeline for AppPipeline<B> {
    fn name(&self) -> &'static str {
        "app"
    }

    async fn run(&mut self, trigger: Option<PathBuf>) {
        let run = self.pass(trigger).await;
        tracing::info!(
            trigger = ?run.trigger,
            classification = ?run.classification,
            artifacts = run.artifacts_regenerated,
            restarted = run.restarted,
            reloaded = run.reloaded,
            "app pipeline pass"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;

    use crate::artifacts::{COMPONENTS_FILE, FILES_LIST_FILE, read_json};
    use crate::error::{PortError, SupervisorError};
    use crate::parser::components::ComponentMetadata;
    use crate::reload::testing::RecordingNotifier;

    #[derive(Clone)]
    struct FakeBackend {
        log: Arc<Mutex<Vec<String>>>,
        listens: bool,
        outcome: RestartOutcome,
    }

    impl Backend for FakeBackend {
        async fn restart(&self) -> Result<RestartOutcome, SupervisorError> {
            self.log.lock().unwrap().push("restart".to_string());
            Ok(self.outcome)
        }

        async fn wait_until_listening(&self, budget: Duration) -> Result<(), SupervisorError> {
            self.log.lock().unwrap().push("listen".to_string());
            if self.listens {
                Ok(())
            } else {
                Err(PortError::Timeout {
                    port: 5091,
                    expected: "listening",
                    waited: budget,
                }
                .into())
            }
        }
    }

    struct Harness {
        dir: tempfile::TempDir,
        pipeline: AppPipeline<FakeBackend>,
        log: Arc<Mutex<Vec<String>>>,
        notifier: RecordingNotifier,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_backend(true, RestartOutcome::Restarted)
        }

        fn with_backend(listens: bool, outcome: RestartOutcome) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let app = dir.path().join("src/app");
            fs::create_dir_all(app.join("about")).unwrap();
            fs::create_dir_all(dir.path().join("src/components")).unwrap();
            fs::write(app.join("index.py"), "def page():\n    pass\n").unwrap();
            fs::write(app.join("about/index.html"), "<h1>About</h1>").unwrap();
            fs::write(
                dir.path().join("src/components/card.py"),
                "@component\ndef Card(title: str):\n    pass\n",
            )
            .unwrap();

            let config = DevConfig::from_toml(dir.path(), "[backend]\ncommand = [\"python\"]\n")
                .unwrap();
            let log = Arc::new(Mutex::new(Vec::new()));
            let notifier = RecordingNotifier::with_log(Arc::clone(&log));
            let backend = FakeBackend {
                log: Arc::clone(&log),
                listens,
                outcome,
            };
            let pipeline = AppPipeline::new(
                ProjectLayout::from_config(&config),
                backend,
                Arc::new(notifier.clone()),
                Duration::from_millis(100),
            );

            Self {
                dir,
                pipeline,
                log,
                notifier,
            }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.dir.path().join(rel)
        }

        fn write(&self, rel: &str, contents: &str) -> PathBuf {
            let path = self.path(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, contents).unwrap();
            path
        }

        fn take_log(&self) -> Vec<String> {
            std::mem::take(&mut *self.log.lock().unwrap())
        }

        fn components(&self) -> Vec<ComponentMetadata> {
            read_json(&self.path("settings"), COMPONENTS_FILE).unwrap()
        }
    }

    fn set(paths: &[&str]) -> RouteFileSet {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_classification_priority() {
        let before = set(&["app/index.py"]);
        let after = set(&["app/index.py", "app/blog/index.html"]);

        assert_eq!(
            classify(Some(Path::new("app/x.py")), Some(&before), &before),
            Classification::SourceChange
        );
        assert_eq!(
            classify(Some(Path::new("app/blog/index.html")), Some(&before), &after),
            Classification::RouteSetChanged
        );
        assert_eq!(
            classify(None, None, &after),
            Classification::ReloadOnly,
            "no previous snapshot means no structural diff"
        );
        let pyc = Path::new("app/__pycache__/x.cpython-312.pyc");
        assert_eq!(
            classify(Some(pyc), Some(&before), &before),
            Classification::BuildCache
        );
        assert_eq!(
            classify(Some(Path::new("app/__pycache__/x.py")), Some(&before), &before),
            Classification::BuildCache
        );
        assert_eq!(
            classify(Some(Path::new("app/__pycache__/x.pyc")), Some(&before), &after),
            Classification::RouteSetChanged,
            "a structural change outranks the cache early exit"
        );
        assert_eq!(
            classify(Some(Path::new("public/site.css")), Some(&before), &before),
            Classification::ReloadOnly
        );
    }

    #[tokio::test]
    async fn test_initial_pass_writes_artifacts_and_reloads() {
        let mut h = Harness::new();
        let run = h.pipeline.pass(None).await;

        assert_eq!(run.classification, Classification::ReloadOnly);
        assert!(run.artifacts_regenerated);
        assert!(!run.restarted);
        assert_eq!(h.take_log(), vec!["reload"]);

        let listing: FilesList = read_json(&h.path("settings"), FILES_LIST_FILE).unwrap();
        assert_eq!(
            listing.files,
            vec!["src/app/about/index.html", "src/app/index.py"]
        );
        let rules: Vec<_> = listing.routes.iter().map(|r| r.rule.as_str()).collect();
        assert_eq!(rules, vec!["/", "/about"]);

        let components = h.components();
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].import_route, "src.components.card");
    }

    #[tokio::test]
    async fn test_source_edit_restarts_then_reloads_with_new_props() {
        let mut h = Harness::new();
        h.pipeline.pass(None).await;
        h.take_log();

        let card = h.write(
            "src/components/card.py",
            "@component\ndef Card(title: str, size: Literal[\"sm\", \"lg\"] = \"sm\"):\n    pass\n",
        );
        let run = h.pipeline.pass(Some(card)).await;

        assert_eq!(run.classification, Classification::SourceChange);
        assert!(run.restarted && run.reloaded);
        assert_eq!(h.take_log(), vec!["restart", "listen", "reload"]);

        let props = &h.components()[0].props;
        assert_eq!(props.len(), 2);
        assert_eq!(
            props[1].options.as_deref(),
            Some(&["sm".to_string(), "lg".to_string()][..])
        );
    }

    #[tokio::test]
    async fn test_new_route_template_restarts() {
        let mut h = Harness::new();
        h.pipeline.pass(None).await;
        h.take_log();

        let page = h.write("src/app/blog/[slug]/index.html", "<article/>");
        let run = h.pipeline.pass(Some(page)).await;

        assert_eq!(run.classification, Classification::RouteSetChanged);
        assert_eq!(h.take_log(), vec!["restart", "listen", "reload"]);

        let listing: FilesList = read_json(&h.path("settings"), FILES_LIST_FILE).unwrap();
        assert!(listing.routes.iter().any(|r| r.rule == "/blog/{slug}"));
    }

    #[tokio::test]
    async fn test_removed_route_template_restarts() {
        let mut h = Harness::new();
        h.pipeline.pass(None).await;
        h.take_log();

        let page = h.path("src/app/about/index.html");
        fs::remove_file(&page).unwrap();
        let run = h.pipeline.pass(Some(page)).await;

        assert_eq!(run.classification, Classification::RouteSetChanged);
        assert!(run.restarted);
    }

    #[tokio::test]
    async fn test_template_content_edit_only_reloads() {
        let mut h = Harness::new();
        h.pipeline.pass(None).await;
        h.take_log();

        let page = h.write("src/app/about/index.html", "<h1>About us</h1>");
        let run = h.pipeline.pass(Some(page)).await;

        assert_eq!(run.classification, Classification::ReloadOnly);
        assert_eq!(h.take_log(), vec!["reload"]);
    }

    #[tokio::test]
    async fn test_static_file_in_app_tree_only_reloads() {
        let mut h = Harness::new();
        h.pipeline.pass(None).await;
        h.take_log();

        let css = h.write("src/app/about/style.css", "h1 { color: red }");
        let run = h.pipeline.pass(Some(css)).await;

        assert_eq!(run.classification, Classification::ReloadOnly);
        assert_eq!(h.take_log(), vec!["reload"]);
    }

    #[tokio::test]
    async fn test_build_cache_change_does_nothing() {
        let mut h = Harness::new();
        h.pipeline.pass(None).await;
        h.take_log();

        let pyc = h.write("src/app/__pycache__/index.cpython-312.pyc", "\0");
        let run = h.pipeline.pass(Some(pyc)).await;

        assert_eq!(run.classification, Classification::BuildCache);
        assert!(!run.restarted && !run.reloaded);
        assert!(h.take_log().is_empty());
        assert_eq!(h.notifier.count(), 1, "only the initial pass reloaded");
    }

    #[tokio::test]
    async fn test_listen_timeout_withholds_reload() {
        let mut h = Harness::with_backend(false, RestartOutcome::Restarted);
        h.pipeline.pass(None).await;
        h.take_log();

        let index = h.write("src/app/index.py", "def page():\n    return 1\n");
        let run = h.pipeline.pass(Some(index)).await;

        assert!(!run.reloaded);
        assert_eq!(h.take_log(), vec!["restart", "listen"]);
    }

    #[tokio::test]
    async fn test_skipped_restart_does_not_reload() {
        let mut h = Harness::with_backend(true, RestartOutcome::Skipped);
        h.pipeline.pass(None).await;
        h.take_log();

        let index = h.write("src/app/index.py", "def page():\n    return 2\n");
        let run = h.pipeline.pass(Some(index)).await;

        assert!(!run.reloaded);
        assert_eq!(h.take_log(), vec!["restart"]);
    }

    #[tokio::test]
    async fn test_snapshot_is_refreshed_every_pass() {
        let mut h = Harness::new();
        h.pipeline.pass(None).await;

        let page = h.write("src/app/contact/index.html", "<form/>");
        assert!(h.pipeline.pass(Some(page.clone())).await.restarted);
        h.take_log();

        // Same membership as the previous pass: no second restart.
        let run = h.pipeline.pass(Some(page)).await;
        assert_eq!(run.classification, Classification::ReloadOnly);
        assert_eq!(h.take_log(), vec!["reload"]);
    }

    #[tokio::test]
    async fn test_empty_scan_keeps_registry() {
        let mut h = Harness::new();
        h.pipeline.pass(None).await;

        let card = h.write("src/components/card.py", "def Card():\n    pass\n");
        h.pipeline.pass(Some(card)).await;

        assert_eq!(h.components().len(), 1, "transient empty scan must not clobber");
    }
}
