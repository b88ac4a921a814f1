//! Show the recoverable status record.

use chrono::Utc;
use console::style;

use crate::cli::render::{print_outcome, print_result};
use crate::config::Settings;
use crate::storage::StatusStore;

pub async fn cmd_status(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let store = StatusStore::new(&settings.data_dir());
    let Some(record) = store.recover().await? else {
        if json {
            println!("null");
        } else {
            println!("{} No recent analysis", style("!").yellow());
        }
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let status = &record.status;
    let age = Utc::now().signed_duration_since(record.written_at).num_seconds().max(0);
    println!(
        "{} {} ({}%, {}s ago)",
        style(format!("Session {}", status.session_id)).bold(),
        status.stage,
        status.progress,
        age
    );
    println!("  {} {}", style("Source:").dim(), record.source);

    if status.stage.is_terminal() {
        print_outcome(status);
        if let Some(result) = &status.result {
            print_result(result);
        }
    } else {
        println!("  {} {}", style(&status.primary_text).bold(), status.detail_text);
        if !status.streaming_preview.is_empty() {
            println!("  {} {}", style("→").dim(), status.streaming_preview);
        }
    }
    Ok(())
}
