pub mod assets;
pub mod coordinator;
pub mod debounce;

use std::future::Future;
use std::path::PathBuf;

use debounce::DebounceHandle;

/// A unit of work re-run whenever its watched tree settles.
///
/// Runs of one pipeline are strictly serialized by its debounce task, so
/// `run` may freely mutate pipeline-local state.
pub trait Pipeline: Send + 'static {
    fn name(&self) -> &'static str;

    /// Execute one coalesced pass. `trigger` is the newest path of the burst,
    /// or `None` for passes not caused by a file change.
    fn run(&mut self, trigger: Option<PathBuf>) -> impl Future<Output = ()> + Send;
}

/// The two independent pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    /// Application and component sources.
    App,
    /// Static assets.
    Assets,
}

/// Routes schedule requests to the debounce queue of each pipeline.
pub struct Scheduler {
    app: DebounceHandle,
    assets: DebounceHandle,
}

impl Scheduler {
    pub fn new(app: DebounceHandle, assets: DebounceHandle) -> Self {
        Self { app, assets }
    }

    pub fn schedule(&self, kind: PipelineKind, trigger: Option<PathBuf>) {
        match kind {
            PipelineKind::App => self.app.schedule(trigger),
            PipelineKind::Assets => self.assets.schedule(trigger),
        }
    }

    /// Stop accepting requests, let pending runs finish.
    pub async fn shutdown(self) {
        self.app.shutdown().await;
        self.assets.shutdown().await;
    }
}
