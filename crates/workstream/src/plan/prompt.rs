use std::fmt::Write as _;

use super::model::StreamDocument;
use crate::address::ThreadId;

fn section(out: &mut String, title: &str, body: &str) {
  if body.trim().is_empty() {
    return;
  }
  let _ = write!(out, "\n## {title}\n\n{}\n", body.trim());
}

/// Render the prompt handed to an agent for one thread, or `None` when the
/// address does not exist in `doc`.
#[must_use]
pub fn thread_prompt(doc: &StreamDocument, address: &ThreadId) -> Option<String> {
  let found = doc.find_thread(address)?;
  let (stage, batch, thread) = (found.stage, found.batch, found.thread);

  let mut out = format!("# Plan: {}\n\n", doc.stream_name);
  let _ = writeln!(
    out,
    "You are working on thread {address} \"{}\" in batch {} \"{}\" of stage {} \"{}\".",
    thread.name, batch.prefix, batch.name, stage.id, stage.name
  );
  section(&mut out, "Plan summary", &doc.summary);
  section(&mut out, "Stage definition", &stage.definition);
  section(&mut out, "Stage constitution", &stage.constitution);
  section(&mut out, "Batch summary", &batch.summary);
  section(&mut out, "Thread summary", &thread.summary);
  section(&mut out, "Thread details", &thread.details);
  Some(out)
}
