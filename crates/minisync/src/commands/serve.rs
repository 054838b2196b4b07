//! `minisync serve` command implementation.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use minisync_config::{CliSettings, Config};
use minisync_server::{DevServer, DirWatcher, FileChange, WatchHandle, server_config_from_config};

use crate::error::CliError;
use crate::output::{Output, Tone};

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Directories to serve, first match wins (overrides config).
    dirs: Vec<PathBuf>,

    /// Path to configuration file (default: auto-discover minisync.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long, env = "MINISYNC_HOST")]
    host: Option<String>,

    /// Preferred port; the next free one is used if taken (overrides config).
    #[arg(short, long, env = "MINISYNC_PORT")]
    port: Option<u16>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Do not inject the client script into HTML pages.
    #[arg(long)]
    no_inject: bool,

    /// Do not watch served directories for changes.
    #[arg(long)]
    no_watch: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails, the server fails to start or
    /// the directories cannot be watched.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            host: self.host,
            port: self.port,
            dirs: (!self.dirs.is_empty()).then_some(self.dirs),
            inject_client_script: self.no_inject.then_some(false),
            watch: self.no_watch.then_some(false),
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        let server = DevServer::new(server_config_from_config(&config));
        let info = server.start().await?;

        output.line(Tone::Good, &format!("Now serving at: {}", info.local));
        output.field("Network", &info.network);
        for dir in &config.serve_resolved.dirs {
            output.field("Directory", &dir.display().to_string());
        }

        let mut watcher = if config.live_reload.watch {
            let handle = DirWatcher::new(
                &config.serve_resolved.dirs,
                config.live_reload.watch_patterns.as_deref(),
            )
            .with_debounce(Duration::from_millis(config.live_reload.debounce_ms))
            .start()
            .map_err(|e| CliError::Watch(e.to_string()))?;
            output.field("Live reload", "watching for changes");
            Some(handle)
        } else {
            output.field("Live reload", "file watching disabled");
            None
        };

        loop {
            let change = tokio::select! {
                change = next_change(watcher.as_mut()) => change,
                result = tokio::signal::ctrl_c() => {
                    result?;
                    break;
                }
            };

            let Some(change) = change else {
                tracing::warn!("File watcher stopped");
                watcher = None;
                continue;
            };
            let report = server.reload(change.reload_target());
            tracing::debug!(path = %change.path, clients = report.delivered(), "Reloaded");
            output.reloaded(&change.path, report.delivered());
        }

        output.line(Tone::Plain, "Shutting down");
        server.close().await?;
        Ok(())
    }
}

/// Next change from the watcher; never resolves without one.
async fn next_change(watcher: Option<&mut WatchHandle>) -> Option<FileChange> {
    match watcher {
        Some(watcher) => watcher.next().await,
        None => std::future::pending().await,
    }
}
