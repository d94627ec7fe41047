use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;

use crate::reload::ReloadNotifier;

use super::Pipeline;

/// The static-assets pipeline: optional build command, then reload.
pub struct AssetsPipeline {
    command: Option<Vec<String>>,
    working_dir: PathBuf,
    notifier: Arc<dyn ReloadNotifier>,
}

impl AssetsPipeline {
    pub fn new(
        command: Option<Vec<String>>,
        working_dir: PathBuf,
        notifier: Arc<dyn ReloadNotifier>,
    ) -> Self {
        Self {
            command,
            working_dir,
            notifier,
        }
    }

    /// Run one pass. Returns whether reload was signalled.
    pub async fn pass(&mut self) -> bool {
        if let Some(argv) = self.command.as_deref() {
            if !self.run_command(argv).await {
                return false;
            }
        }
        self.notifier.reload("assets");
        true
    }

    async fn run_command(&self, argv: &[String]) -> bool {
        let Some((program, args)) = argv.split_first() else {
            return true;
        };

        let status = Command::new(program)
            .args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => true,
            Ok(status) => {
                tracing::warn!(%program, %status, "assets command failed, withholding reload");
                false
            }
            Err(err) => {
                tracing::warn!(%program, error = %err, "failed to run assets command");
                false
            }
        }
    }
}

impl Pipeline for AssetsPipeline {
    fn name(&self) -> &'static str {
        "assets"
    }

    async fn run(&mut self, trigger: Option<PathBuf>) {
        let reloaded = self.pass().await;
        tracing::info!(trigger = ?trigger, reloaded, "assets pipeline pass");
    }
}
