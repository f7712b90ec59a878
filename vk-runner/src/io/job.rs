//! Host job contract: input loading, report artifacts, and the output manifest.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

/// Input key pointing at an uploaded task file.
pub const TASK_FILE_KEY: &str = "task_file";

pub const STRUCTURED_ARTIFACT: &str = "execution_report";
pub const NARRATIVE_ARTIFACT: &str = "execution_report_narrative";
pub const HTML_ARTIFACT: &str = "execution_report_html";

const MAX_STEM_CHARS: usize = 50;
const FALLBACK_STEM: &str = "task";

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid stem regex"));

/// One entry of the output manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub path: PathBuf,
}

impl Artifact {
    pub fn file(name: &str, path: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            kind: "file".to_string(),
            path,
        }
    }
}

/// Rendered report documents, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFiles {
    pub structured: String,
    pub narrative: String,
    pub html: String,
}

/// Read the job input and return the raw task JSON.
///
/// Wrapper objects carrying a `value` key are unwrapped first. When the
/// input names a `task_file`, that file is the task; otherwise the input
/// object itself is the task.
#[instrument(skip_all, fields(input = %path.display()))]
pub fn read_job_input(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let input: Value =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    let Value::Object(fields) = input else {
        bail!("{} must contain a JSON object", path.display());
    };
    let inputs = unwrap_typed(fields);

    match inputs.get(TASK_FILE_KEY) {
        None => {
            debug!("input is the task itself");
            Ok(Value::Object(inputs))
        }
        Some(Value::String(task_file)) => {
            debug!(task_file = %task_file, "following task_file");
            let task_path = Path::new(task_file);
            let raw = fs::read_to_string(task_path)
                .with_context(|| format!("read task file {}", task_path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parse task file {}", task_path.display()))
        }
        Some(other) => bail!("'{TASK_FILE_KEY}' must be a path string, got {other}"),
    }
}

/// Replace every wrapper object carrying a `value` key with that value.
fn unwrap_typed(fields: Map<String, Value>) -> Map<String, Value> {
    fields
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::Object(mut inner) if inner.contains_key("value") => {
                    inner.remove("value").unwrap_or(Value::Null)
                }
                other => other,
            };
            (key, value)
        })
        .collect()
}

/// File stem derived from the task text: lowercase, runs of other characters
/// collapsed to `_`, at most 50 characters.
pub fn artifact_stem(task: Option<&str>) -> String {
    let lowered = task.unwrap_or_default().to_lowercase();
    let replaced = NON_ALNUM.replace_all(&lowered, "_");
    let stem: String = replaced
        .trim_matches('_')
        .chars()
        .take(MAX_STEM_CHARS)
        .collect();
    let stem = stem.trim_end_matches('_');
    if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem.to_string()
    }
}

/// Write the three report documents into `scratch` and return their
/// manifest entries with absolute paths.
#[instrument(skip_all, fields(scratch = %scratch.display(), stem = %stem))]
pub fn write_report_artifacts(
    scratch: &Path,
    stem: &str,
    files: &ReportFiles,
) -> Result<Vec<Artifact>> {
    fs::create_dir_all(scratch).with_context(|| format!("create {}", scratch.display()))?;
    let outputs = [
        (STRUCTURED_ARTIFACT, "json", &files.structured),
        (NARRATIVE_ARTIFACT, "md", &files.narrative),
        (HTML_ARTIFACT, "html", &files.html),
    ];
    let mut artifacts = Vec::with_capacity(outputs.len());
    for (name, extension, contents) in outputs {
        let path = scratch.join(format!("{stem}_report.{extension}"));
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        let absolute = path
            .canonicalize()
            .with_context(|| format!("resolve {}", path.display()))?;
        debug!(artifact = name, path = %absolute.display(), "wrote artifact");
        artifacts.push(Artifact::file(name, absolute));
    }
    Ok(artifacts)
}

/// Serialize the manifest as pretty JSON with a trailing newline.
pub fn write_output(path: &Path, artifacts: &[Artifact]) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(artifacts).context("serialize output")?;
    payload.push('\n');
    fs::write(path, payload).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
