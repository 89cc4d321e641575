//! Report rendering
//!
//! Turns a [`Report`] into text for a terminal or JSON for other tools.

use tracing::debug;

use crate::prelude::{PgSummaryError, Report};

mod text;

pub use text::TextRenderer;

/// Output format for a rendered report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Aligned table
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Trait for report renderers
pub trait ReportRenderer {
    fn render(&self, report: &Report) -> Result<String, PgSummaryError>;
}

/// JSON renderer
#[derive(Debug, Default)]
pub struct JsonRenderer;

impl ReportRenderer for JsonRenderer {
    fn render(&self, report: &Report) -> Result<String, PgSummaryError> {
        debug!(target_name = ?report.target_name(), "Rendering JSON report");
        serde_json::to_string_pretty(report).map_err(|e| PgSummaryError::Render(e.to_string()))
    }
}

/// Render a report in the requested format
pub fn render(report: &Report, format: OutputFormat) -> Result<String, PgSummaryError> {
    match format {
        OutputFormat::Text => TextRenderer::new().render(report),
        OutputFormat::Json => JsonRenderer.render(report),
    }
}
