pub mod event;

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc as tokio_mpsc;
use tokio::task::JoinHandle;

use crate::config::DevConfig;
use crate::pipeline::PipelineKind;

use event::{ChangeEvent, ChangeKind};

/// Directories whose contents never trigger a pipeline.
const EXCLUDED_DIRS: &[&str] = &["node_modules", ".git"];

/// Editor swap, backup and temp file suffixes.
const TEMP_SUFFIXES: &[&str] = &["~", ".swp", ".swx", ".tmp"];

/// Handle to the running OS watcher. Dropping it stops watching.
pub struct WatcherHandle {
    _watcher: notify::RecommendedWatcher,
    _bridge_task: JoinHandle<()>,
}

/// Decides which pipeline, if any, a change belongs to.
#[derive(Debug, Clone)]
pub struct Router {
    assets_root: PathBuf,
    app_roots: Vec<PathBuf>,
    artifacts_dir: PathBuf,
}

impl Router {
    pub fn new(assets_root: PathBuf, app_roots: Vec<PathBuf>, artifacts_dir: PathBuf) -> Self {
        Self {
            assets_root,
            app_roots,
            artifacts_dir,
        }
    }

    pub fn from_config(config: &DevConfig) -> Self {
        Self::new(
            config.assets_root(),
            vec![config.app_root(), config.components_root()],
            config.artifacts_dir(),
        )
    }

    /// Pipeline for `path`, or `None` when the change is excluded or outside every root.
    pub fn route(&self, path: &Path) -> Option<PipelineKind> {
        if is_excluded(path, &self.artifacts_dir) {
            return None;
        }
        if path.starts_with(&self.assets_root) {
            return Some(PipelineKind::Assets);
        }
        if self.app_roots.iter().any(|root| path.starts_with(root)) {
            return Some(PipelineKind::App);
        }
        None
    }

    /// Existing directories to watch, nested roots collapsed into their ancestors.
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        let mut roots = self.app_roots.clone();
        roots.push(self.assets_root.clone());
        roots.retain(|r| r.is_dir());
        collapse_roots(roots)
    }
}

/// Drop every root that lies inside another one.
pub fn collapse_roots(mut roots: Vec<PathBuf>) -> Vec<PathBuf> {
    roots.sort();
    roots.dedup();

    let mut collapsed: Vec<PathBuf> = Vec::with_capacity(roots.len());
    for root in roots {
        if !collapsed.iter().any(|outer| root.starts_with(outer)) {
            collapsed.push(root);
        }
    }
    collapsed
}

/// True for our own artifact writes, vendored or VCS trees, and editor temp files.
pub fn is_excluded(path: &Path, artifacts_dir: &Path) -> bool {
    if path.starts_with(artifacts_dir) {
        return true;
    }
    if path
        .components()
        .any(|c| EXCLUDED_DIRS.iter().any(|d| c.as_os_str() == *d))
    {
        return true;
    }

    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with('.') || TEMP_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Start a recursive watcher over `router.watch_roots()`.
///
/// Returns a `WatcherHandle` (must be kept alive) and a receiver of routed
/// change events. Debouncing is left to the pipelines.
pub fn start_watcher(
    router: Router,
) -> anyhow::Result<(WatcherHandle, tokio_mpsc::Receiver<(PipelineKind, ChangeEvent)>)> {
    let (std_tx, std_rx) = std::sync::mpsc::channel::<notify::Result<notify::Event>>();

    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = std_tx.send(res);
    })?;
    for root in router.watch_roots() {
        watcher.watch(&root, RecursiveMode::Recursive)?;
        tracing::info!(root = %root.display(), "watching");
    }

    let (tokio_tx, tokio_rx) = tokio_mpsc::channel(256);

    // Bridge: receive from the std channel on a blocking thread, route, forward.
    let bridge_task = tokio::task::spawn_blocking(move || {
        while let Ok(result) = std_rx.recv() {
            let event = match result {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(error = %err, "watcher error");
                    continue;
                }
            };
            let timestamp = SystemTime::now();

            for path in event.paths {
                let Some(kind) = ChangeKind::from_notify(&event.kind, path.exists()) else {
                    continue;
                };
                let Some(pipeline) = router.route(&path) else {
                    continue;
                };
                let change = ChangeEvent {
                    path,
                    kind,
                    timestamp,
                };
                if tokio_tx.blocking_send((pipeline, change)).is_err() {
                    return; // receiver dropped, shutdown
                }
            }
        }
    });

    Ok((
        WatcherHandle {
            _watcher: watcher,
            _bridge_task: bridge_task,
        },
        tokio_rx,
    ))
}
