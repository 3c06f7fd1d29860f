use serde::Serialize;

use crate::address::ThreadId;

/// Compiled plan document. Re-parsing always produces a fresh tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDocument {
  pub stream_name: String,
  pub summary: String,
  pub references: Vec<String>,
  pub stages: Vec<Stage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stage {
  pub id: u32,
  pub name: String,
  pub definition: String,
  pub constitution: String,
  pub questions: Vec<Question>,
  pub batches: Vec<Batch>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Batch {
  pub id: u32,
  /// `id` zero-padded to width 2.
  pub prefix: String,
  pub name: String,
  pub summary: String,
  pub threads: Vec<Thread>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Thread {
  pub id: u32,
  pub name: String,
  pub summary: String,
  pub details: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
  pub question: String,
  pub resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseError {
  pub section: String,
  pub message: String,
}

impl ParseError {
  pub fn new(section: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      section: section.into(),
      message: message.into(),
    }
  }
}

impl std::fmt::Display for ParseError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}: {}", self.section, self.message)
  }
}

/// Result of compiling a plan. `document` is `None` only when the plan
/// name is missing or malformed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseOutcome {
  pub document: Option<StreamDocument>,
  pub errors: Vec<ParseError>,
}

/// A thread together with the nodes that own it.
#[derive(Debug, Clone, Copy)]
pub struct ThreadRef<'a> {
  pub address: ThreadId,
  pub stage: &'a Stage,
  pub batch: &'a Batch,
  pub thread: &'a Thread,
}

impl Batch {
  #[must_use]
  pub fn prefix_for(id: u32) -> String {
    format!("{id:02}")
  }
}

impl StreamDocument {
  /// Every thread in source order, with its address.
  pub fn threads(&self) -> impl Iterator<Item = ThreadRef<'_>> {
    self.stages.iter().flat_map(|stage| {
      stage.batches.iter().flat_map(move |batch| {
        batch.threads.iter().map(move |thread| ThreadRef {
          address: ThreadId::new(stage.id, batch.id, thread.id),
          stage,
          batch,
          thread,
        })
      })
    })
  }

  #[must_use]
  pub fn find_thread(&self, address: &ThreadId) -> Option<ThreadRef<'_>> {
    self.threads().find(|t| t.address == *address)
  }

  #[must_use]
  pub fn thread_count(&self) -> usize {
    self.threads().count()
  }
}
