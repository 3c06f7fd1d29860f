use std::fs;

use anyhow::{Context, Result, bail};
use chrono::Utc;

use super::migrate::{MigrationReport, migrate_legacy_tasks};
use super::model::{Session, SessionStatus, ThreadsFile};
use crate::address::ThreadId;
use crate::config::WorkstreamPaths;
use crate::utils::atomic::write_json_atomic;

/// Per-workstream session history, stored as one JSON document per stream.
///
/// Every mutation rewrites the whole file through an atomic rename, so
/// readers never observe a torn file. There is no locking: two processes
/// mutating the same stream concurrently can lose an update, and callers
/// are expected to serialize mutations per stream.
#[derive(Debug, Clone)]
pub struct ThreadLedger {
  paths: WorkstreamPaths,
}

impl ThreadLedger {
  #[must_use]
  pub fn new(paths: WorkstreamPaths) -> Self {
    Self { paths }
  }

  #[must_use]
  pub fn paths(&self) -> &WorkstreamPaths {
    &self.paths
  }

  /// Load the ledger of `stream_id`, migrating a legacy tasks file first if
  /// one is present. Returns `None` when the stream has no ledger yet.
  pub fn load(&self, stream_id: &str) -> Result<Option<ThreadsFile>> {
    match self.migrate(stream_id) {
      Ok(Some(report)) => {
        for err in &report.errors {
          log::warn!("legacy session migration for {stream_id}: {err}");
        }
      }
      Ok(None) => {}
      Err(err) => log::warn!("legacy session migration for {stream_id} failed: {err:#}"),
    }
    self.read(stream_id)
  }

  /// Run the legacy migration for `stream_id` if its tasks file still
  /// carries session fields. `None` means there was nothing to migrate.
  pub fn migrate(&self, stream_id: &str) -> Result<Option<MigrationReport>> {
    migrate_legacy_tasks(self, stream_id)
  }

  /// Record the start of a dispatch: appends a running session and marks it
  /// as the thread's current session.
  pub fn start_session(
    &self,
    stream_id: &str,
    thread_id: &ThreadId,
    agent_name: &str,
    model: &str,
    session_id: &str,
  ) -> Result<Session> {
    let mut file = self
      .load(stream_id)?
      .unwrap_or_else(|| ThreadsFile::new(stream_id));

    if file.threads.iter().any(|r| r.has_session(session_id)) {
      bail!("session {session_id} already exists in stream {stream_id}");
    }

    let session = Session::running(session_id, agent_name, model);
    let record = file.record_or_insert(*thread_id);
    record.sessions.push(session.clone());
    record.current_session_id = Some(session.session_id.clone());

    self.write(&mut file)?;
    log::debug!("started session {session_id} for {stream_id}/{thread_id}");
    Ok(session)
  }

  /// Record the end of a dispatch. Returns `None`, leaving the ledger
  /// untouched, when the thread or session is unknown or the session has
  /// already finished.
  pub fn complete_session(
    &self,
    stream_id: &str,
    thread_id: &ThreadId,
    session_id: &str,
    status: SessionStatus,
    exit_code: Option<i32>,
  ) -> Result<Option<Session>> {
    if !status.is_terminal() {
      bail!("cannot complete session {session_id} with non-terminal status {status}");
    }
    let Some(mut file) = self.load(stream_id)? else {
      return Ok(None);
    };
    let Some(record) = file.record_mut(thread_id) else {
      return Ok(None);
    };
    let Some(session) = record
      .sessions
      .iter_mut()
      .find(|s| s.session_id == session_id)
    else {
      return Ok(None);
    };
    if session.status.is_terminal() {
      log::warn!(
        "session {session_id} for {stream_id}/{thread_id} already finished as {}",
        session.status
      );
      return Ok(None);
    }

    session.completed_at = Some(Utc::now());
    session.status = status;
    session.exit_code = exit_code;
    let finished = session.clone();
    if record.current_session_id.as_deref() == Some(session_id) {
      record.current_session_id = None;
    }

    self.write(&mut file)?;
    log::debug!("completed session {session_id} for {stream_id}/{thread_id} as {status}");
    Ok(Some(finished))
  }

  /// Most recently started session of a thread, for resume flows.
  pub fn last_session(&self, stream_id: &str, thread_id: &ThreadId) -> Result<Option<Session>> {
    let file = self.load(stream_id)?;
    Ok(
      file
        .as_ref()
        .and_then(|f| f.record(thread_id))
        .and_then(|r| r.last_session())
        .cloned(),
    )
  }

  /// Read the ledger as stored, without running the legacy migration.
  pub(crate) fn read(&self, stream_id: &str) -> Result<Option<ThreadsFile>> {
    let path = self.paths.threads_file(stream_id);
    if !path.exists() {
      return Ok(None);
    }
    let data =
      fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let file: ThreadsFile = serde_json::from_str(&data)
      .with_context(|| format!("invalid ledger JSON in {}", path.display()))?;
    Ok(Some(file))
  }

  /// Sort, stamp and atomically persist `file`.
  pub(crate) fn write(&self, file: &mut ThreadsFile) -> Result<()> {
    file.sort_threads();
    file.last_updated = Utc::now();
    write_json_atomic(&self.paths.threads_file(&file.stream_id), file)
  }
}
