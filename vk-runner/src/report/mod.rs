//! Execution reports.
//!
//! [`structured`] is the source of truth; the Markdown narrative and the HTML
//! page are rendered from it and never from the raw execution result.

pub mod narrative;
pub mod structured;

use anyhow::Result;

use crate::core::types::ExecutionResult;
use crate::io::job::ReportFiles;

pub use narrative::{render_html, render_narrative};
pub use structured::{StructuredReport, structured_json, to_structured};

pub fn to_narrative(result: &ExecutionResult) -> Result<String> {
    render_narrative(&to_structured(result))
}

pub fn to_html(result: &ExecutionResult) -> Result<String> {
    render_html(&to_structured(result))
}

/// Render every report document for one result.
pub fn render_all(result: &ExecutionResult) -> Result<ReportFiles> {
    let report = to_structured(result);
    Ok(ReportFiles {
        structured: structured_json(&report)?,
        narrative: render_narrative(&report)?,
        html: render_html(&report)?,
    })
}
