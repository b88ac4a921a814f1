//! List saved analyses.

use console::style;

use crate::config::Settings;
use crate::storage::Gallery;

/// Longest source shown per entry; data URIs are truncated.
const SOURCE_WIDTH: usize = 72;

pub async fn cmd_gallery(settings: &Settings, limit: Option<usize>, json: bool) -> anyhow::Result<()> {
    let gallery = Gallery::new(&settings.data_dir());
    let entries = gallery.list(limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("{} Gallery is empty", style("!").yellow());
        return Ok(());
    }

    for entry in &entries {
        let source: String = entry.source.chars().take(SOURCE_WIDTH).collect();
        println!(
            "{} {} {}",
            style(entry.saved_at.format("%Y-%m-%d %H:%M")).dim(),
            style(&entry.result.determined_class).cyan().bold(),
            source
        );
        if let Some(page) = &entry.page_url {
            println!("  {} {}", style("page").dim(), page);
        }
        let tags: Vec<&str> = entry.result.tags.iter().map(|t| t.en.as_str()).collect();
        if !tags.is_empty() {
            println!("  {} {}", style("tags").dim(), tags.join(", "));
        }
    }
    Ok(())
}
