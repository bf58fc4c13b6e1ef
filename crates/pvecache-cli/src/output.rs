use serde::Serialize;
use tabled::Tabled;
use tabled::settings::Style;

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table (default).
    #[default]
    Table,
    /// JSON output.
    Json,
}

impl OutputFormat {
    /// Parse from CLI string argument.
    pub fn from_str_arg(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Table,
        }
    }
}

/// Render a list of rows in the given format.
pub fn render_list<T: Serialize + Tabled>(items: &[T], format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                "(none)".to_string()
            } else {
                tabled::Table::new(items).with(Style::rounded()).to_string()
            }
        }
        OutputFormat::Json => serde_json::to_string_pretty(items).unwrap_or_default(),
    }
}

/// Render a single row in the given format.
pub fn render_one<T: Serialize + Tabled>(item: &T, format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => tabled::Table::new(std::iter::once(item))
            .with(Style::rounded())
            .to_string(),
        OutputFormat::Json => serde_json::to_string_pretty(item).unwrap_or_default(),
    }
}

/// Pretty-printed JSON for `item`.
pub fn to_json<T: Serialize>(item: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(item)?)
}
