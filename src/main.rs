mod artifacts;
mod cli;
mod config;
mod error;
mod output;
mod parser;
mod pipeline;
mod port;
mod reload;
mod routes;
mod supervisor;
mod walker;
mod watcher;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use artifacts::{COMPONENTS_FILE, ConnectionInfo, read_json, write_connection_info};
use cli::{Cli, Commands};
use config::DevConfig;
use output::{ExtractionStats, print_registry, print_summary};
use parser::components::ComponentMetadata;
use pipeline::assets::AssetsPipeline;
use pipeline::coordinator::{AppPipeline, ProjectLayout, regenerate_registry};
use pipeline::debounce::spawn_debounced;
use pipeline::Scheduler;
use port::find_available_port;
use reload::{ReloadNotifier, TriggerFile};
use supervisor::controller::platform_controller;
use supervisor::{BackendSpec, Supervisor};
use watcher::{Router, start_watcher};

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    match cli.command {
        Commands::Dev { path } => {
            let root = project_root(&path)?;
            let config = DevConfig::load(&root)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;
            runtime.block_on(dev(config))?;
        }
        Commands::Components { path, json } => {
            let root = project_root(&path)?;
            let config = DevConfig::load(&root)?;
            let start = Instant::now();
            let layout = ProjectLayout::from_config(&config);
            let (extraction, outcome) = regenerate_registry(&layout)?;

            if json {
                let registry: Vec<ComponentMetadata> =
                    read_json(&config.artifacts_dir(), COMPONENTS_FILE).unwrap_or_default();
                print_registry(&registry);
            } else {
                let stats = ExtractionStats::new(
                    extraction.file_count,
                    &extraction.components,
                    extraction.failures.len(),
                    outcome,
                    start.elapsed().as_secs_f64(),
                );
                print_summary(&stats);
            }
        }
        Commands::Port { start } => {
            let port = find_available_port(start)?;
            println!("{port}");
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays clean for `--json` consumers.
fn setup_tracing(verbose: bool) {
    let default = if verbose { "devloop=debug" } else { "devloop=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn project_root(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("project root {} does not exist", path.display()))
}

async fn dev(config: DevConfig) -> Result<()> {
    let mut interrupted = tokio::spawn(tokio::signal::ctrl_c());

    let dev_port = find_available_port(config.dev.port)?;
    let mut backend_port = find_available_port(config.backend.port)?;
    if backend_port == dev_port {
        backend_port = find_available_port(dev_port.saturating_add(1))?;
    }

    let artifacts_dir = config.artifacts_dir();
    write_connection_info(
        &artifacts_dir,
        &ConnectionInfo {
            dev_port,
            backend_port,
        },
    )
    .context("failed to write connection info")?;
    tracing::info!(dev_port, backend_port, "ports allocated");

    let supervisor = Arc::new(Supervisor::new(
        BackendSpec::from_config(&config, backend_port),
        platform_controller(),
    ));
    match supervisor.start().await {
        Ok(()) => {
            if let Err(err) = supervisor.wait_until_listening(config.ready_timeout()).await {
                tracing::warn!(error = %err, "backend not listening yet");
            }
        }
        Err(err) => {
            tracing::error!(error = %err, "backend failed to start; change a file to retry")
        }
    }

    let notifier: Arc<dyn ReloadNotifier> = Arc::new(TriggerFile::new(artifacts_dir));
    let mut app = AppPipeline::new(
        ProjectLayout::from_config(&config),
        Arc::clone(&supervisor),
        Arc::clone(&notifier),
        config.ready_timeout(),
    );
    app.pass(None).await;

    let assets = AssetsPipeline::new(
        config.dev.assets_command.clone(),
        config.root.clone(),
        notifier,
    );
    let scheduler = Scheduler::new(
        spawn_debounced(app, config.debounce()),
        spawn_debounced(assets, config.debounce()),
    );

    let (watcher, mut events) = match start_watcher(Router::from_config(&config)) {
        Ok(started) => started,
        Err(err) => {
            supervisor.stop().await;
            return Err(err.context("failed to start file watcher"));
        }
    };

    if let Some(handle) = supervisor.handle().await {
        tracing::info!(pid = ?handle.pid, port = handle.port, state = ?handle.state, "backend");
    }
    tracing::info!(
        dev_port,
        backend_port = supervisor.port(),
        "dev loop ready, press Ctrl-C to stop"
    );

    loop {
        tokio::select! {
            Some((kind, change)) = events.recv() => {
                tracing::debug!(
                    path = %change.path.display(),
                    kind = ?change.kind,
                    at = ?change.timestamp,
                    pipeline = ?kind,
                    "change"
                );
                scheduler.schedule(kind, Some(change.path));
            }
            result = &mut interrupted => {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => tracing::warn!(error = %err, "failed to listen for Ctrl-C"),
                    Err(err) => tracing::warn!(error = %err, "Ctrl-C listener failed"),
                }
                break;
            }
        }
    }

    tracing::info!("shutting down");
    drop(watcher);
    scheduler.shutdown().await;
    supervisor.stop().await;
    Ok(())
}
