//! Human-readable renderings of a [`StructuredReport`].
//!
//! Both documents are rendered from the structured record alone, so they can
//! never disagree with the JSON artifact. `.html` templates are auto-escaped.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::report::structured::StructuredReport;

const NARRATIVE_NAME: &str = "narrative.md";
const HTML_NAME: &str = "report.html";
const NARRATIVE_TEMPLATE: &str = include_str!("templates/narrative.md");
const HTML_TEMPLATE: &str = include_str!("templates/report.html");

/// Template engine wrapper around minijinja.
struct ReportEngine {
    env: Environment<'static>,
}

impl ReportEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_filter("fenced", fenced);
        env.add_template(NARRATIVE_NAME, NARRATIVE_TEMPLATE)
            .context("load narrative template")?;
        env.add_template(HTML_NAME, HTML_TEMPLATE)
            .context("load html template")?;
        Ok(Self { env })
    }

    fn render(&self, name: &str, report: &StructuredReport) -> Result<String> {
        let template = self.env.get_template(name)?;
        let mut rendered = template
            .render(context! { report => report })
            .with_context(|| format!("render {name}"))?;
        if !rendered.ends_with('\n') {
            rendered.push('\n');
        }
        Ok(rendered)
    }
}

/// Wrap `text` in a `text` code fence longer than any backtick run inside it.
fn fenced(text: String) -> String {
    let longest = text
        .split(|c: char| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat((longest + 1).max(3));
    format!("{fence}text\n{text}\n{fence}")
}

pub fn render_narrative(report: &StructuredReport) -> Result<String> {
    ReportEngine::new()?.render(NARRATIVE_NAME, report)
}

pub fn render_html(report: &StructuredReport) -> Result<String> {
    ReportEngine::new()?.render(HTML_NAME, report)
}
