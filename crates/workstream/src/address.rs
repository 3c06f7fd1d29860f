//! Dotted numeric addresses shared by the compiled plan and the session ledger.
//!
//! A thread address is `SS.BB.TT` and a task address is `SS.BB.TT.NN`, each
//! segment zero-padded to two digits when rendered. The ledger only ever
//! stores these addresses, never stage/batch/thread names, so renaming a
//! node in the plan keeps its history.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
  #[error("invalid address '{input}': expected {expected} dot-separated segments, found {found}")]
  SegmentCount {
    input: String,
    expected: usize,
    found: usize,
  },
  #[error("invalid address '{input}': segment '{segment}' is not a number")]
  NonNumeric { input: String, segment: String },
}

/// Address of a dispatchable thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ThreadId {
  pub stage: u32,
  pub batch: u32,
  pub thread: u32,
}

impl ThreadId {
  #[must_use]
  pub fn new(stage: u32, batch: u32, thread: u32) -> Self {
    Self {
      stage,
      batch,
      thread,
    }
  }
}

impl fmt::Display for ThreadId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:02}.{:02}.{:02}", self.stage, self.batch, self.thread)
  }
}

impl FromStr for ThreadId {
  type Err = AddressError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let [stage, batch, thread] = parse_segments::<3>(s)?;
    Ok(Self::new(stage, batch, thread))
  }
}

impl TryFrom<String> for ThreadId {
  type Error = AddressError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<ThreadId> for String {
  fn from(value: ThreadId) -> Self {
    value.to_string()
  }
}

/// Address of a task inside a thread (legacy storage key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId {
  pub thread: ThreadId,
  pub task: u32,
}

impl TaskId {
  #[must_use]
  pub fn thread_id(&self) -> ThreadId {
    self.thread
  }
}

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{:02}", self.thread, self.task)
  }
}

impl FromStr for TaskId {
  type Err = AddressError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let [stage, batch, thread, task] = parse_segments::<4>(s)?;
    Ok(Self {
      thread: ThreadId::new(stage, batch, thread),
      task,
    })
  }
}

/// Render a thread address with every segment padded to width 2.
#[must_use]
pub fn thread_address(stage: u32, batch: u32, thread: u32) -> String {
  ThreadId::new(stage, batch, thread).to_string()
}

/// Parse `SS.BB.TT`. Fails on any other shape instead of guessing.
pub fn parse_thread_id(s: &str) -> Result<ThreadId, AddressError> {
  s.parse()
}

/// Derive the owning thread of a 4-segment task address.
pub fn thread_id_from_task_id(task_id: &str) -> Result<ThreadId, AddressError> {
  task_id.parse::<TaskId>().map(|t| t.thread_id())
}

fn parse_segments<const N: usize>(input: &str) -> Result<[u32; N], AddressError> {
  let trimmed = input.trim();
  let segments: Vec<&str> = trimmed.split('.').collect();
  if segments.len() != N {
    return Err(AddressError::SegmentCount {
      input: input.to_string(),
      expected: N,
      found: segments.len(),
    });
  }
  let mut out = [0u32; N];
  for (slot, segment) in out.iter_mut().zip(&segments) {
    let numeric = !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit());
    *slot = numeric
      .then(|| segment.parse::<u32>().ok())
      .flatten()
      .ok_or_else(|| AddressError::NonNumeric {
        input: input.to_string(),
        segment: (*segment).to_string(),
      })?;
  }
  Ok(out)
}
