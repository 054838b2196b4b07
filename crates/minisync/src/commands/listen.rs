//! `minisync listen` command implementation.

use std::time::Duration;

use clap::Args;
use minisync_client::{
    Client, ClientEvent, Dispatch, HtmlDocument, Reconnector, ReloadDispatcher, ReloadEvent,
};
use tokio::sync::mpsc;

use crate::error::CliError;
use crate::output::{Output, Tone};

/// Arguments for the listen command.
#[derive(Args)]
pub(crate) struct ListenArgs {
    /// Page to follow, e.g. `http://localhost:3000/`.
    url: String,

    /// Seconds to wait before reconnecting after the server refuses the stream.
    #[arg(long, default_value_t = 10)]
    reconnect_secs: u64,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl ListenArgs {
    /// Execute the listen command.
    ///
    /// Runs until interrupted.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let http = reqwest::Client::new();

        let mut client = Client::new(&self.url)?.with_reconnector(Reconnector::new(
            Duration::from_secs(self.reconnect_secs),
        ));
        output.line(Tone::Plain, &format!("Listening on {}", client.url()));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let run = client.run(
            move |event| {
                let _ = tx.send(event);
            },
            async {
                let _ = tokio::signal::ctrl_c().await;
            },
        );

        let page = self.url.as_str();
        let follow = async {
            let dispatcher = ReloadDispatcher::new();
            let mut document = fetch_document(&http, page).await;

            while let Some(event) = rx.recv().await {
                match event {
                    ClientEvent::Connected => {
                        output.line(Tone::Good, "Development server has connected.");
                    }
                    ClientEvent::Disconnected { retry_in } => output.line(
                        Tone::Warn,
                        &format!(
                            "Lost connection. Trying to reconnect in {}s...",
                            retry_in.as_secs()
                        ),
                    ),
                    ClientEvent::Reload(reload) => {
                        apply(&output, &dispatcher, &mut document, &reload);
                        if document.page_reloads() > 0 {
                            document = fetch_document(&http, page).await;
                        }
                    }
                }
            }
        };

        tokio::join!(run, follow);
        Ok(())
    }
}

/// Dispatch one reload event and report the outcome.
fn apply(
    output: &Output,
    dispatcher: &ReloadDispatcher,
    document: &mut HtmlDocument,
    reload: &ReloadEvent,
) {
    match dispatcher.dispatch(document, reload.file()) {
        Dispatch::FullReload => output.line(Tone::Plain, "Reloading entire page."),
        Dispatch::Refreshed { kind, urls } => {
            let file = reload.file().unwrap_or_default();
            output.line(Tone::Plain, &format!("Reloaded \"{file}\" ({kind:?}):"));
            for url in urls {
                output.field("  url", &url);
            }
        }
    }
}

/// Fetch the page and build its document model.
///
/// An unreachable page yields an empty document, so every reload falls
/// back to a full page reload until the page can be fetched.
async fn fetch_document(http: &reqwest::Client, url: &str) -> HtmlDocument {
    match fetch_html(http, url).await {
        Ok(html) => HtmlDocument::parse(&html),
        Err(err) => {
            tracing::warn!(url, error = %err, "Cannot fetch page");
            HtmlDocument::default()
        }
    }
}

async fn fetch_html(http: &reqwest::Client, url: &str) -> reqwest::Result<String> {
    http.get(url).send().await?.error_for_status()?.text().await
}
