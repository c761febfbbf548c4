//! Output formatter for human-readable and JSON output
//!
//! Commands build a serializable report and hand it to [`Formatter::report`];
//! JSON mode prints the report, human mode runs the command's renderer.

use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use super::OutputConfig;

/// What a piece of text represents, which decides its color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Object keys and item keys
    Key,
    /// Byte totals
    Size,
    /// Bucket and table names
    Name,
    Success,
    Error,
    Warning,
}

impl Role {
    fn style(self) -> Style {
        match self {
            Role::Key => Style::new().cyan(),
            Role::Size => Style::new().green(),
            Role::Name => Style::new().bold(),
            Role::Success => Style::new().green(),
            Role::Error => Style::new().red(),
            Role::Warning => Style::new().yellow(),
        }
    }
}

/// Formatter for CLI output
///
/// JSON mode is strict: no colors, no spinner, no status lines on stdout.
#[derive(Debug, Clone, Default)]
pub struct Formatter {
    config: OutputConfig,
}

impl Formatter {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    pub fn is_json(&self) -> bool {
        self.config.json
    }

    pub fn colors_enabled(&self) -> bool {
        !self.config.no_color && !self.config.json
    }

    /// Apply the color for `role`, or return the text unchanged without colors
    pub fn paint(&self, role: Role, text: &str) -> String {
        if self.colors_enabled() {
            role.style().apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    /// Print `value` as JSON, or call `human` to render it as text
    pub fn report<T: Serialize>(&self, value: &T, human: impl FnOnce(&Self)) {
        if self.is_json() {
            match serde_json::to_string_pretty(value) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("Error serializing output: {e}"),
            }
        } else {
            human(self);
        }
    }

    pub fn success(&self, message: &str) {
        if !self.config.quiet && !self.config.json {
            println!("{} {message}", self.paint(Role::Success, "✓"));
        }
    }

    /// Errors go to stderr even in quiet mode; JSON mode emits `{"error": ...}`
    pub fn error(&self, message: &str) {
        if self.config.json {
            let error = serde_json::json!({ "error": message });
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&error).unwrap_or_else(|_| message.to_string())
            );
        } else {
            eprintln!("{} {message}", self.paint(Role::Error, "✗"));
        }
    }

    pub fn warning(&self, message: &str) {
        if !self.config.quiet && !self.config.json {
            eprintln!("{} {message}", self.paint(Role::Warning, "⚠"));
        }
    }

    pub fn println(&self, message: &str) {
        if !self.config.quiet {
            println!("{message}");
        }
    }

    /// Render rows as a table; nothing is printed for an empty table
    pub fn table(&self, header: &[&str], rows: Vec<Vec<String>>) {
        if self.config.quiet || self.config.json || rows.is_empty() {
            return;
        }
        println!("{}", render_table(header, rows));
    }

    /// Spinner shown while a batch runs; `None` in JSON or quiet mode
    pub fn spinner(&self, message: &str) -> Option<ProgressBar> {
        if self.config.quiet || self.config.json {
            return None;
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Some(pb)
    }
}

fn render_table(header: &[&str], rows: Vec<Vec<String>>) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.iter().copied());
    for row in rows {
        table.add_row(row);
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatter_default() {
        let formatter = Formatter::default();
        assert!(!formatter.is_json());
        assert!(formatter.colors_enabled());
    }

    #[test]
    fn test_json_mode_disables_colors_and_spinner() {
        let formatter = Formatter::new(OutputConfig {
            json: true,
            ..Default::default()
        });
        assert!(formatter.is_json());
        assert!(!formatter.colors_enabled());
        assert!(formatter.spinner("working").is_none());
        assert_eq!(formatter.paint(Role::Key, "a/b.txt"), "a/b.txt");
    }

    #[test]
    fn test_no_color_paints_plain_text() {
        let formatter = Formatter::new(OutputConfig {
            no_color: true,
            ..Default::default()
        });
        assert!(!formatter.colors_enabled());
        assert_eq!(formatter.paint(Role::Name, "orders"), "orders");
    }

    #[test]
    fn test_report_skips_renderer_in_json_mode() {
        let formatter = Formatter::new(OutputConfig {
            json: true,
            ..Default::default()
        });
        let mut rendered = false;
        formatter.report(&serde_json::json!({ "ok": true }), |_| rendered = true);
        assert!(!rendered);

        let quiet = Formatter::new(OutputConfig {
            quiet: true,
            ..Default::default()
        });
        quiet.report(&serde_json::json!({ "ok": true }), |_| rendered = true);
        assert!(rendered);
    }

    #[test]
    fn test_render_table_contains_cells() {
        let rendered = render_table(
            &["Key", "Error"],
            vec![vec![
                "photos/cat.jpg".to_string(),
                "Network error: refused".to_string(),
            ]],
        );
        assert!(rendered.contains("Key"));
        assert!(rendered.contains("photos/cat.jpg"));
        assert!(rendered.contains("Network error: refused"));
    }
}
