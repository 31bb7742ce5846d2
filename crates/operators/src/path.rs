//! Run-date templating for partitioned source paths.

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Render a source-prefix template against the run's execution date.
///
/// Supported placeholders: `{ds}` (YYYY-MM-DD), `{year}`, `{month}`, `{day}`,
/// `{hour}` (all zero-padded).  Unknown text passes through untouched, so a
/// literal prefix is its own template.
pub fn render_prefix(template: &str, execution_date: &DateTime<Utc>) -> String {
    template
        .replace("{ds}", &execution_date.format("%Y-%m-%d").to_string())
        .replace("{year}", &format!("{:04}", execution_date.year()))
        .replace("{month}", &format!("{:02}", execution_date.month()))
        .replace("{day}", &format!("{:02}", execution_date.day()))
        .replace("{hour}", &format!("{:02}", execution_date.hour()))
}
