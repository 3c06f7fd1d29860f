//! Extract the human-readable output of a finished agent run from its
//! newline-delimited JSON event log.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesisOutput {
  /// Text parts of the transcript, concatenated in order.
  pub text: String,
  /// One entry per skipped or undecodable line.
  pub logs: Vec<String>,
  /// False when any line failed to decode.
  pub success: bool,
}

/// Decode every non-blank line independently. A malformed line is logged
/// and flips `success`, but later lines are still read.
#[must_use]
pub fn parse_event_log(input: &str) -> SynthesisOutput {
  let mut out = SynthesisOutput {
    success: true,
    ..SynthesisOutput::default()
  };

  for (index, line) in input.lines().enumerate() {
    let line = line.trim();
    if line.is_empty() {
      continue;
    }
    let lineno = index + 1;
    match serde_json::from_str::<Value>(line) {
      Ok(event) => {
        let kind = event.get("type").and_then(Value::as_str);
        match (kind, event.pointer("/part/text").and_then(Value::as_str)) {
          (Some("text"), Some(text)) => out.text.push_str(text),
          _ => out.logs.push(format!(
            "line {lineno}: ignored event type {}",
            kind.unwrap_or("<none>")
          )),
        }
      }
      Err(err) => {
        out.success = false;
        out.logs.push(format!("line {lineno}: invalid JSON: {err}"));
      }
    }
  }
  out
}

/// Read and parse the event log at `path`. Returns `None` when the file
/// does not exist. Parse logs are appended to `debug_log` when given.
pub fn read_synthesis(path: &Path, debug_log: Option<&Path>) -> Result<Option<SynthesisOutput>> {
  if !path.exists() {
    log::debug!("no event log at {}", path.display());
    return Ok(None);
  }
  let data =
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
  let output = parse_event_log(&data);
  if let Some(debug_log) = debug_log {
    append_debug_log(debug_log, path, &output)?;
  }
  Ok(Some(output))
}

fn append_debug_log(debug_log: &Path, source: &Path, output: &SynthesisOutput) -> Result<()> {
  if let Some(dir) = debug_log.parent()
    && !dir.as_os_str().is_empty()
  {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
  }
  let mut file = OpenOptions::new()
    .create(true)
    .append(true)
    .open(debug_log)
    .with_context(|| format!("failed to open {}", debug_log.display()))?;

  let mut entry = format!(
    "[{}] {} success={} chars={}\n",
    Utc::now().to_rfc3339(),
    source.display(),
    output.success,
    output.text.chars().count()
  );
  for line in &output.logs {
    entry.push_str("  ");
    entry.push_str(line);
    entry.push('\n');
  }
  file
    .write_all(entry.as_bytes())
    .with_context(|| format!("failed to write {}", debug_log.display()))
}
