//! Terminal rendering of statuses and results.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::analysis::{AnalysisResult, AnalysisStatus, Stage};

/// Longest preview tail shown next to the bar.
const PREVIEW_WIDTH: usize = 60;

/// Progress bar driven by session statuses.
pub struct StatusView {
    bar: ProgressBar,
}

impl StatusView {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:30.cyan/blue}] {pos:>3}% {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    pub fn update(&self, status: &AnalysisStatus) {
        if status.stage.is_terminal() {
            self.bar.finish_and_clear();
            return;
        }

        self.bar.set_position(u64::from(status.progress));
        let detail = if status.streaming_preview.is_empty() {
            status.detail_text.clone()
        } else {
            tail(&status.streaming_preview, PREVIEW_WIDTH)
        };
        self.bar.set_message(format!(
            "{} {}",
            style(&status.primary_text).bold(),
            style(detail).dim()
        ));
    }
}

fn tail(text: &str, max: usize) -> String {
    let total = text.chars().count();
    if total <= max {
        return text.to_string();
    }
    let kept: String = text.chars().skip(total - max).collect();
    format!("…{}", kept)
}

/// One-line outcome for a terminal status.
pub fn print_outcome(status: &AnalysisStatus) {
    match status.stage {
        Stage::Succeeded => println!("{} {}", style("✓").green(), status.primary_text),
        Stage::Cancelled => eprintln!("{} {}", style("!").yellow(), status.primary_text),
        _ => {
            eprintln!("{} {}", style("✗").red(), style(&status.primary_text).bold());
            if !status.detail_text.is_empty() {
                eprintln!("  {} {}", style("→").dim(), status.detail_text);
            }
            if let Some(raw) = status.error.as_ref().and_then(|e| e.diagnostic.as_ref()) {
                eprintln!("  {} {}", style("raw output:").dim(), raw);
            }
        }
    }
}

pub fn print_result(result: &AnalysisResult) {
    println!(
        "\n{} {}",
        style(&result.determined_class).cyan().bold(),
        result.analysis_summary
    );

    if !result.tags.is_empty() {
        println!("\n{}", style("Tags").bold());
        for tag in &result.tags {
            println!("  {} {} ({})", style("•").dim(), tag.en, tag.zh);
        }
    }

    if !result.style_masters.is_empty() {
        println!("\n{}", style("Style references").bold());
        for master in &result.style_masters {
            println!("  {} {}: {}", style("•").dim(), style(&master.name).bold(), master.reason);
        }
    }

    if !result.search_suggestions.is_empty() {
        println!("\n{}", style("Search").bold());
        for chip in &result.search_suggestions {
            println!("  {} {} {} {}", style("•").dim(), chip.label, style("→").dim(), chip.query);
        }
    }

    if !result.drawing_prompt.is_empty() {
        println!("\n{}", style("Prompt").bold());
        println!("  {}", result.drawing_prompt);
    }
}
