//! Plain-text renderer
//!
//! Cells are padded here; the template only lays out lines.

use minijinja::Environment;
use serde_json::Value as JsonValue;
use tracing::debug;

use super::ReportRenderer;
use crate::prelude::{PgSummaryError, Report};

const HEADERS: [&str; 5] = ["column", "type", "nulls", "distinct", "values"];

/// Text table renderer
pub struct TextRenderer {
    env: Environment<'static>,
}

impl TextRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("report", include_str!("templates/report.txt.jinja"))
            .expect("Failed to load report template");
        Self { env }
    }
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportRenderer for TextRenderer {
    fn render(&self, report: &Report) -> Result<String, PgSummaryError> {
        debug!(target_name = ?report.target_name(), "Rendering text report");

        let template = self
            .env
            .get_template("report")
            .map_err(|e| PgSummaryError::Render(format!("Template error: {}", e)))?;

        let rows: Vec<[String; 5]> = report
            .columns
            .iter()
            .map(|c| {
                [
                    c.name.clone(),
                    c.data_type.clone(),
                    c.null_count.to_string(),
                    c.distinct_count.to_string(),
                    c.distinct_values
                        .as_deref()
                        .map(format_values)
                        .unwrap_or_default(),
                ]
            })
            .collect();

        let mut widths = HEADERS.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let header = format_line(&HEADERS.map(String::from), &widths);
        let rule = widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-");
        let lines: Vec<String> = rows.iter().map(|row| format_line(row, &widths)).collect();

        let source = report.source.as_ref();
        let ctx = minijinja::context! {
            title => report.target_name(),
            row_count => report.row_count,
            kind => source.map(|s| s.kind.to_string()),
            definition => source.and_then(|s| s.definition.as_deref()).map(str::trim),
            header => header,
            rule => rule,
            lines => lines,
        };

        template
            .render(ctx)
            .map_err(|e| PgSummaryError::Render(format!("Failed to render report: {}", e)))
    }
}

/// Trailing empty cells are dropped so lines do not end in a separator
fn format_line(cells: &[String; 5], widths: &[usize; 5]) -> String {
    let last = cells.iter().rposition(|c| !c.is_empty()).unwrap_or(0);
    cells[..=last]
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect::<Vec<_>>()
        .join(" | ")
        .trim_end()
        .to_string()
}

fn format_values(values: &[JsonValue]) -> String {
    values
        .iter()
        .map(|v| match v {
            JsonValue::String(s) => s.clone(),
            JsonValue::Null => "NULL".to_string(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
