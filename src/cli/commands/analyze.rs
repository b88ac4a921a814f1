//! Analyze a single image.

use std::sync::Arc;
use std::time::Duration;

use console::style;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::analysis::{AnalysisStatus, SessionDeps, SessionRegistry, Stage};
use crate::cli::render::{print_outcome, print_result, StatusView};
use crate::config::Settings;
use crate::http_client::{HttpImageFetcher, ReqwestTransport, USER_AGENT};
use crate::storage::{Gallery, GalleryEntry, PersistingSink, StatusHub, StatusStore};

/// Connection setup budget for image downloads and provider requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

pub async fn cmd_analyze(
    settings: &Settings,
    source: &str,
    page_url: Option<String>,
    save: bool,
    json: bool,
) -> anyhow::Result<()> {
    let data_dir = settings.data_dir();
    let store = Arc::new(StatusStore::new(&data_dir));
    let hub = StatusHub::default();
    let mut statuses = hub.subscribe();

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()?;

    let deps = SessionDeps {
        config: Arc::new(settings.clone()),
        fetcher: Arc::new(HttpImageFetcher::new(client.clone())),
        transport: Arc::new(ReqwestTransport::with_client(client)),
        sink: Arc::new(PersistingSink::new(store, hub.clone(), source)),
        options: settings.session_options(),
    };

    let registry = SessionRegistry::new();
    let handle = registry.start_analysis(source, deps);
    let view = (!json).then(StatusView::new);

    let terminal: Option<AnalysisStatus> = loop {
        tokio::select! {
            biased;
            received = statuses.recv() => match received {
                Ok(status) if status.session_id == handle.id() => {
                    if let Some(view) = &view {
                        view.update(&status);
                    }
                    if status.stage.is_terminal() {
                        break Some(status);
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => debug!("Skipped {} status updates", skipped),
                Err(RecvError::Closed) => break None,
            },
            _ = handle.wait() => break None,
            _ = tokio::signal::ctrl_c() => {
                registry.cancel_active();
            }
        }
    };

    let Some(status) = terminal else {
        anyhow::bail!("Analysis ended without a final status");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_outcome(&status);
    }

    match (status.stage, status.result) {
        (Stage::Succeeded, Some(result)) => {
            if !json {
                print_result(&result);
            }
            if save {
                let gallery = Gallery::new(&data_dir);
                match gallery
                    .append(GalleryEntry::new(source, page_url, result))
                    .await
                {
                    Ok(count) if !json => println!(
                        "\n{} Saved to gallery ({} total)",
                        style("→").dim(),
                        count
                    ),
                    Ok(_) => {}
                    Err(e) => warn!("Failed to save to gallery: {}", e),
                }
            }
            Ok(())
        }
        (Stage::Cancelled, _) => Ok(()),
        _ => {
            let message = status
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "Analysis failed".to_string());
            anyhow::bail!(message)
        }
    }
}
