use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::ThreadId;

pub const THREADS_FILE_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
  Running,
  Completed,
  Failed,
  Cancelled,
}

impl SessionStatus {
  #[must_use]
  pub fn is_terminal(self) -> bool {
    !matches!(self, SessionStatus::Running)
  }

  #[must_use]
  pub fn as_str(self) -> &'static str {
    match self {
      SessionStatus::Running => "running",
      SessionStatus::Completed => "completed",
      SessionStatus::Failed => "failed",
      SessionStatus::Cancelled => "cancelled",
    }
  }
}

impl fmt::Display for SessionStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for SessionStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "running" => Ok(SessionStatus::Running),
      "completed" => Ok(SessionStatus::Completed),
      "failed" => Ok(SessionStatus::Failed),
      "cancelled" => Ok(SessionStatus::Cancelled),
      other => Err(format!(
        "unknown session status '{other}' (expected running, completed, failed or cancelled)"
      )),
    }
  }
}

/// One attempt to execute a thread through an agent process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
  pub session_id: String,
  pub agent_name: String,
  pub model: String,
  pub started_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub completed_at: Option<DateTime<Utc>>,
  pub status: SessionStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub exit_code: Option<i32>,
}

impl Session {
  #[must_use]
  pub fn running(session_id: &str, agent_name: &str, model: &str) -> Self {
    Self {
      session_id: session_id.to_string(),
      agent_name: agent_name.to_string(),
      model: model.to_string(),
      started_at: Utc::now(),
      completed_at: None,
      status: SessionStatus::Running,
      exit_code: None,
    }
  }
}

/// Execution history of a single thread. Sessions are only ever appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRecord {
  pub thread_id: ThreadId,
  #[serde(default)]
  pub sessions: Vec<Session>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub current_session_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub opencode_session_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub working_agent_session_id: Option<String>,
}

impl ThreadRecord {
  #[must_use]
  pub fn new(thread_id: ThreadId) -> Self {
    Self {
      thread_id,
      sessions: Vec::new(),
      current_session_id: None,
      opencode_session_id: None,
      working_agent_session_id: None,
    }
  }

  #[must_use]
  pub fn has_session(&self, session_id: &str) -> bool {
    self.sessions.iter().any(|s| s.session_id == session_id)
  }

  /// The session with the latest `started_at`. On ties the earliest
  /// recorded session wins.
  #[must_use]
  pub fn last_session(&self) -> Option<&Session> {
    self
      .sessions
      .iter()
      .reduce(|best, s| if s.started_at > best.started_at { s } else { best })
  }
}

/// Ledger of one workstream, persisted as `threads.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadsFile {
  pub version: String,
  pub stream_id: String,
  pub last_updated: DateTime<Utc>,
  #[serde(default)]
  pub threads: Vec<ThreadRecord>,
}

impl ThreadsFile {
  #[must_use]
  pub fn new(stream_id: &str) -> Self {
    Self {
      version: THREADS_FILE_VERSION.to_string(),
      stream_id: stream_id.to_string(),
      last_updated: Utc::now(),
      threads: Vec::new(),
    }
  }

  #[must_use]
  pub fn record(&self, thread_id: &ThreadId) -> Option<&ThreadRecord> {
    self.threads.iter().find(|r| r.thread_id == *thread_id)
  }

  pub fn record_mut(&mut self, thread_id: &ThreadId) -> Option<&mut ThreadRecord> {
    self.threads.iter_mut().find(|r| r.thread_id == *thread_id)
  }

  /// Existing record for `thread_id`, or a fresh one appended to the file.
  pub fn record_or_insert(&mut self, thread_id: ThreadId) -> &mut ThreadRecord {
    let pos = match self.threads.iter().position(|r| r.thread_id == thread_id) {
      Some(pos) => pos,
      None => {
        self.threads.push(ThreadRecord::new(thread_id));
        self.threads.len() - 1
      }
    };
    &mut self.threads[pos]
  }

  /// Restore natural numeric order of thread addresses.
  pub fn sort_threads(&mut self) {
    self.threads.sort_by_key(|r| r.thread_id);
  }
}
