//! CLI presenter for output formatting

use std::io::{self, Write};
use std::time::Duration;

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

use crate::domain::cache::CacheEntry;

/// Presenter for CLI output formatting
pub struct Presenter {
    bar: Option<ProgressBar>,
}

impl Presenter {
    /// Create a new presenter
    pub fn new() -> Self {
        Self { bar: None }
    }

    /// Start a 0-100 progress bar with message
    pub fn start_progress(&mut self, message: &str) {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:20.cyan/white}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
            .progress_chars("█▓░");
        bar.set_style(style);
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        self.bar = Some(bar);
    }

    /// Move the bar to `percent` with the current step label
    pub fn update_progress(&self, percent: u8, step: &str) {
        if let Some(ref bar) = self.bar {
            bar.set_position(u64::from(percent));
            bar.set_message(step.to_string());
        }
    }

    /// Print a line above the bar (or to stderr when no bar is shown)
    pub fn note(&self, message: &str) {
        match self.bar {
            Some(ref bar) => bar.println(format!("{} {}", "›".dimmed(), message)),
            None => eprintln!("{} {}", "›".dimmed(), message),
        }
    }

    /// Finish the bar as successful
    pub fn progress_success(&mut self, message: &str) {
        if let Some(bar) = self.bar.take() {
            bar.set_position(100);
            bar.finish_with_message(format!("{} {}", "✓".green(), message));
        }
    }

    /// Finish the bar as failed
    pub fn progress_fail(&mut self, message: &str) {
        if let Some(bar) = self.bar.take() {
            bar.abandon_with_message(format!("{} {}", "✗".red(), message));
        }
    }

    /// Remove the bar without status
    pub fn stop_progress(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }

    /// Print info message to stderr
    pub fn info(&self, message: &str) {
        eprintln!("{} {}", "ℹ".cyan(), message);
    }

    /// Print success message to stderr
    pub fn success(&self, message: &str) {
        eprintln!("{} {}", "✓".green(), message);
    }

    /// Print warning message to stderr
    pub fn warn(&self, message: &str) {
        eprintln!("{} {}", "⚠".yellow(), message);
    }

    /// Print error message to stderr
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Output text to stdout
    pub fn output(&self, text: &str) {
        println!("{}", text);
    }

    /// Output text to stdout without newline
    pub fn output_inline(&self, text: &str) {
        print!("{}", text);
        let _ = io::stdout().flush();
    }

    /// Print the listing to stdout
    pub fn listing(&self, entry: &CacheEntry, base_url: &str) {
        self.output(&format_listing(entry, base_url));
    }

    /// Print how long the cached listing stays available
    pub fn expiry(&self, remaining: Option<Duration>) {
        match remaining {
            Some(left) => self.info(&format!(
                "Listing available for {}",
                format_remaining(left)
            )),
            None => self.warn("Listing has expired"),
        }
    }

    /// Print a key-value pair (for config list)
    pub fn key_value(&self, key: &str, value: &str) {
        println!("{}: {}", key.cyan(), value);
    }
}

impl Default for Presenter {
    fn default() -> Self {
        Self::new()
    }
}

/// Render listing content followed by absolute asset URLs
pub fn format_listing(entry: &CacheEntry, base_url: &str) -> String {
    let mut lines = Vec::new();

    match &entry.light_content() {
        Value::String(text) => lines.push(text.trim_end().to_string()),
        Value::Object(fields) => {
            for (key, value) in fields {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                lines.push(format!("{}: {}", key, value));
            }
        }
        Value::Null => {}
        other => lines.push(serde_json::to_string_pretty(other).unwrap_or_default()),
    }

    if !entry.asset_refs.is_empty() {
        lines.push(String::new());
        lines.push(format!("Images ({}):", entry.asset_refs.len()));
        lines.extend(
            entry
                .asset_refs
                .iter()
                .map(|asset| format!("  {}", asset.resolve(base_url))),
        );
    }

    lines.join("\n")
}

/// Whole seconds, formatted like `9m 58s`
pub fn format_remaining(remaining: Duration) -> String {
    humantime::format_duration(Duration::from_secs(remaining.as_secs().max(1))).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::AssetRef;
    use chrono::Utc;
    use serde_json::json;

    fn entry(content: Value, assets: &[&str]) -> CacheEntry {
        CacheEntry::new(
            "r1",
            content,
            assets.iter().map(|a| AssetRef::new(*a)).collect(),
            Utc::now(),
            Duration::from_secs(600),
        )
    }

    #[test]
    fn text_listing_is_printed_verbatim() {
        let text = "Instagram Caption:\nSelling my bike\n\nTranscribed Text:\nBarely used";
        let rendered = format_listing(&entry(json!(text), &[]), "http://localhost:5000");
        assert_eq!(rendered, text);
    }

    #[test]
    fn structured_listing_shows_fields_and_images() {
        let rendered = format_listing(
            &entry(
                json!({"title": "Road bike", "price": 250, "images": ["/ignored"]}),
                &["/image/r1/a.jpg"],
            ),
            "http://localhost:5000/",
        );

        assert!(rendered.contains("title: Road bike"));
        assert!(rendered.contains("price: 250"));
        assert!(!rendered.contains("/ignored"));
        assert!(rendered.contains("Images (1):"));
        assert!(rendered.contains("  http://localhost:5000/image/r1/a.jpg"));
    }

    #[test]
    fn remaining_is_rounded_to_seconds() {
        assert_eq!(format_remaining(Duration::from_millis(598_400)), "9m 58s");
        assert_eq!(format_remaining(Duration::from_millis(200)), "1s");
    }
}
