//! One-time migration of sessions stored inline on legacy task records.
//!
//! Older versions kept `sessions`/`currentSessionId` on every task in
//! `tasks.json`. The migration folds those into the per-thread ledger and
//! then strips the fields from the tasks file, so later reads find nothing
//! to migrate. Tasks whose address cannot be parsed are reported and
//! skipped; when that happens the tasks file is left untouched so nothing
//! that failed to migrate is lost.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::model::{Session, ThreadsFile};
use super::store::ThreadLedger;
use crate::address::{ThreadId, thread_id_from_task_id};
use crate::utils::atomic::write_json_atomic;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegacyTasksFile {
  #[serde(default)]
  pub tasks: Vec<LegacyTask>,
  #[serde(flatten)]
  pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyTask {
  pub id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sessions: Option<Vec<Session>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub current_session_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub opencode_session_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub working_agent_session_id: Option<String>,
  #[serde(flatten)]
  pub rest: Map<String, Value>,
}

impl LegacyTask {
  #[must_use]
  pub fn has_session_fields(&self) -> bool {
    self.sessions.is_some() || self.current_session_id.is_some()
  }

  fn strip_session_fields(&mut self) {
    self.sessions = None;
    self.current_session_id = None;
    self.opencode_session_id = None;
    self.working_agent_session_id = None;
  }
}

impl LegacyTasksFile {
  #[must_use]
  pub fn is_legacy(&self) -> bool {
    self.tasks.iter().any(LegacyTask::has_session_fields)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
  pub backup_path: Option<PathBuf>,
  /// Thread records created or updated.
  pub threads_migrated: usize,
  /// Sessions added to the ledger (duplicates are not counted).
  pub sessions_migrated: usize,
  pub errors: Vec<String>,
  /// Whether the tasks file was rewritten without session fields.
  pub tasks_cleaned: bool,
}

impl MigrationReport {
  #[must_use]
  pub fn success(&self) -> bool {
    self.errors.is_empty()
  }
}

fn backup_prefix(tasks_file: &Path) -> String {
  let name = tasks_file
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| "tasks.json".to_string());
  format!("{name}.backup-")
}

fn backup_path(tasks_file: &Path) -> PathBuf {
  let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
  tasks_file.with_file_name(format!("{}{stamp}", backup_prefix(tasks_file)))
}

/// An earlier backup of `tasks_file` whose content equals `data`.
fn existing_backup(tasks_file: &Path, data: &str) -> Option<PathBuf> {
  let prefix = backup_prefix(tasks_file);
  let entries = fs::read_dir(tasks_file.parent()?).ok()?;
  entries
    .filter_map(|entry| entry.ok().map(|e| e.path()))
    .filter(|path| {
      path
        .file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with(&prefix))
    })
    .find(|path| fs::read_to_string(path).is_ok_and(|backup| backup == data))
}

/// Back up `tasks_file` unless an identical backup already exists.
fn ensure_backup(tasks_file: &Path, data: &str) -> Result<PathBuf> {
  if let Some(existing) = existing_backup(tasks_file, data) {
    log::debug!("reusing backup {}", existing.display());
    return Ok(existing);
  }
  let backup = backup_path(tasks_file);
  fs::copy(tasks_file, &backup)
    .with_context(|| format!("failed to back up {}", tasks_file.display()))?;
  Ok(backup)
}

/// Merge every task's sessions into `ledger`, grouped by owning thread.
/// Sessions whose id is already present anywhere in the ledger are skipped
/// and the first `currentSessionId` seen for a thread is kept.
fn merge_into(ledger: &mut ThreadsFile, tasks: &[LegacyTask], report: &mut MigrationReport) {
  let mut known: HashSet<String> = ledger
    .threads
    .iter()
    .flat_map(|r| r.sessions.iter().map(|s| s.session_id.clone()))
    .collect();
  let mut by_thread: BTreeMap<ThreadId, Vec<&LegacyTask>> = BTreeMap::new();
  for task in tasks.iter().filter(|t| t.has_session_fields()) {
    match thread_id_from_task_id(&task.id) {
      Ok(thread_id) => by_thread.entry(thread_id).or_default().push(task),
      Err(err) => report.errors.push(format!("task {}: {err}", task.id)),
    }
  }

  for (thread_id, tasks) in by_thread {
    let record = ledger.record_or_insert(thread_id);
    let before = record.clone();
    for task in tasks {
      for session in task.sessions.iter().flatten() {
        if known.insert(session.session_id.clone()) {
          record.sessions.push(session.clone());
          report.sessions_migrated += 1;
        } else if !record.has_session(&session.session_id) {
          log::warn!(
            "skipping session {} of task {}: id already used by another thread",
            session.session_id,
            task.id
          );
        }
      }
      if record.current_session_id.is_none() {
        record.current_session_id.clone_from(&task.current_session_id);
      }
      if record.opencode_session_id.is_none() {
        record.opencode_session_id.clone_from(&task.opencode_session_id);
      }
      if record.working_agent_session_id.is_none() {
        record
          .working_agent_session_id
          .clone_from(&task.working_agent_session_id);
      }
    }
    if *record != before {
      report.threads_migrated += 1;
    }
  }
}

/// Migrate the legacy tasks file of `stream_id` into its ledger. Returns
/// `None` when there is no tasks file or it carries no session fields.
pub(crate) fn migrate_legacy_tasks(
  ledger: &ThreadLedger,
  stream_id: &str,
) -> Result<Option<MigrationReport>> {
  let tasks_path = ledger.paths().tasks_file(stream_id);
  if !tasks_path.exists() {
    return Ok(None);
  }
  let data = fs::read_to_string(&tasks_path)
    .with_context(|| format!("failed to read {}", tasks_path.display()))?;
  let mut tasks_file: LegacyTasksFile = serde_json::from_str(&data)
    .with_context(|| format!("invalid tasks JSON in {}", tasks_path.display()))?;
  if !tasks_file.is_legacy() {
    return Ok(None);
  }

  log::info!("migrating legacy sessions from {}", tasks_path.display());
  let mut report = MigrationReport {
    backup_path: Some(ensure_backup(&tasks_path, &data)?),
    ..MigrationReport::default()
  };

  let mut threads = ledger
    .read(stream_id)?
    .unwrap_or_else(|| ThreadsFile::new(stream_id));
  merge_into(&mut threads, &tasks_file.tasks, &mut report);
  if report.threads_migrated > 0 {
    ledger.write(&mut threads)?;
  }

  if report.success() {
    for task in &mut tasks_file.tasks {
      task.strip_session_fields();
    }
    write_json_atomic(&tasks_path, &tasks_file)?;
    report.tasks_cleaned = true;
  } else {
    log::warn!(
      "leaving {} untouched: {} task(s) could not be migrated",
      tasks_path.display(),
      report.errors.len()
    );
  }
  Ok(Some(report))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::WorkstreamPaths;
  use crate::ledger::SessionStatus;
  use serde_json::json;
  use tempfile::TempDir;

  const STREAM: &str = "legacy";

  fn setup(tasks: Value) -> (TempDir, ThreadLedger) {
    let dir = TempDir::new().unwrap();
    let ledger = ThreadLedger::new(WorkstreamPaths::new(dir.path(), dir.path()));
    let path = ledger.paths().tasks_file(STREAM);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, serde_json::to_string_pretty(&tasks).unwrap()).unwrap();
    (dir, ledger)
  }

  fn session(id: &str, started: &str) -> Value {
    json!({
      "sessionId": id,
      "agentName": "opencode",
      "model": "gpt",
      "startedAt": started,
      "status": "completed",
      "exitCode": 0
    })
  }

  fn legacy_tasks() -> Value {
    json!({
      "version": "1.0.0",
      "stream_id": STREAM,
      "tasks": [
        {
          "id": "01.01.01.01",
          "name": "first",
          "status": "completed",
          "sessions": [session("s1", "2025-01-01T00:00:00Z"), session("s2", "2025-01-02T00:00:00Z")],
          "currentSessionId": "s2"
        },
        {
          "id": "01.01.01.02",
          "name": "second",
          "sessions": [session("s2", "2025-01-02T00:00:00Z"), session("s3", "2025-01-03T00:00:00Z")],
          "currentSessionId": "s3"
        },
        { "id": "01.02.01.01", "name": "untouched" }
      ]
    })
  }

  #[test]
  fn merges_tasks_of_one_thread_and_strips_the_legacy_file() {
    let (_dir, ledger) = setup(legacy_tasks());
    let report = ledger.migrate(STREAM).unwrap().expect("migration ran");
    assert!(report.success());
    assert!(report.tasks_cleaned);
    assert_eq!(report.threads_migrated, 1);
    assert_eq!(report.sessions_migrated, 3);
    assert!(report.backup_path.as_ref().unwrap().exists());

    let file = ledger.read(STREAM).unwrap().unwrap();
    assert_eq!(file.threads.len(), 1);
    let record = &file.threads[0];
    assert_eq!(record.thread_id.to_string(), "01.01.01");
    let ids: Vec<&str> = record.sessions.iter().map(|s| s.session_id.as_str()).collect();
    assert_eq!(ids, vec!["s1", "s2", "s3"]);
    assert_eq!(record.current_session_id.as_deref(), Some("s2"));
    assert_eq!(record.sessions[0].status, SessionStatus::Completed);

    let cleaned: Value =
      serde_json::from_str(&fs::read_to_string(ledger.paths().tasks_file(STREAM)).unwrap())
        .unwrap();
    assert_eq!(cleaned["stream_id"], STREAM);
    for task in cleaned["tasks"].as_array().unwrap() {
      assert!(task.get("sessions").is_none());
      assert!(task.get("currentSessionId").is_none());
    }
    assert_eq!(cleaned["tasks"][0]["name"], "first");
    assert_eq!(cleaned["tasks"][0]["status"], "completed");
  }

  #[test]
  fn second_run_is_a_no_op() {
    let (_dir, ledger) = setup(legacy_tasks());
    ledger.migrate(STREAM).unwrap().unwrap();
    let before = ledger.read(STREAM).unwrap().unwrap();

    assert!(ledger.migrate(STREAM).unwrap().is_none());
    let after = ledger.read(STREAM).unwrap().unwrap();
    assert_eq!(before.threads, after.threads);
  }

  #[test]
  fn load_migrates_transparently() {
    let (_dir, ledger) = setup(legacy_tasks());
    let file = ledger.load(STREAM).unwrap().expect("ledger created by migration");
    assert_eq!(file.threads[0].sessions.len(), 3);
    let last = ledger
      .last_session(STREAM, &"01.01.01".parse().unwrap())
      .unwrap()
      .unwrap();
    assert_eq!(last.session_id, "s3");
  }

  #[test]
  fn merge_keeps_existing_ledger_sessions() {
    let (_dir, ledger) = setup(legacy_tasks());
    let mut existing = ThreadsFile::new(STREAM);
    let record = existing.record_or_insert("01.01.01".parse().unwrap());
    record.current_session_id = Some("s9".into());
    record.sessions.push(serde_json::from_value(session("s2", "2025-01-02T00:00:00Z")).unwrap());
    ledger.write(&mut existing).unwrap();

    let report = ledger.migrate(STREAM).unwrap().unwrap();
    assert_eq!(report.sessions_migrated, 2);
    let file = ledger.read(STREAM).unwrap().unwrap();
    let record = &file.threads[0];
    assert_eq!(record.sessions.len(), 3);
    assert_eq!(record.current_session_id.as_deref(), Some("s9"));
  }

  #[test]
  fn bad_task_address_is_reported_and_legacy_file_kept() {
    let mut tasks = legacy_tasks();
    tasks["tasks"]
      .as_array_mut()
      .unwrap()
      .push(json!({ "id": "01.01", "sessions": [session("bad", "2025-01-04T00:00:00Z")] }));
    let (_dir, ledger) = setup(tasks);
    let original = fs::read_to_string(ledger.paths().tasks_file(STREAM)).unwrap();

    let report = ledger.migrate(STREAM).unwrap().unwrap();
    assert!(!report.success());
    assert!(!report.tasks_cleaned);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("01.01"), "{:?}", report.errors);

    let file = ledger.read(STREAM).unwrap().unwrap();
    assert_eq!(file.threads[0].sessions.len(), 3);
    assert_eq!(
      fs::read_to_string(ledger.paths().tasks_file(STREAM)).unwrap(),
      original
    );

    // Re-running while the bad task remains does not duplicate sessions.
    let report = ledger.migrate(STREAM).unwrap().unwrap();
    assert_eq!(report.sessions_migrated, 0);
    assert_eq!(ledger.read(STREAM).unwrap().unwrap().threads[0].sessions.len(), 3);
  }

  fn backups(ledger: &ThreadLedger) -> usize {
    fs::read_dir(ledger.paths().stream_dir(STREAM))
      .unwrap()
      .filter(|e| {
        e.as_ref()
          .unwrap()
          .file_name()
          .to_string_lossy()
          .starts_with("tasks.json.backup-")
      })
      .count()
  }

  #[test]
  fn repeated_loads_after_partial_failure_do_not_write() {
    let mut tasks = legacy_tasks();
    tasks["tasks"]
      .as_array_mut()
      .unwrap()
      .push(json!({ "id": "01.01", "sessions": [session("bad", "2025-01-04T00:00:00Z")] }));
    let (_dir, ledger) = setup(tasks);

    ledger.load(STREAM).unwrap().unwrap();
    let threads_path = ledger.paths().threads_file(STREAM);
    let written = fs::read_to_string(&threads_path).unwrap();
    for _ in 0..5 {
      let file = ledger.load(STREAM).unwrap().unwrap();
      assert_eq!(file.threads[0].sessions.len(), 3);
    }
    assert_eq!(backups(&ledger), 1);
    assert_eq!(fs::read_to_string(&threads_path).unwrap(), written);
  }

  #[test]
  fn session_id_used_by_another_thread_is_not_duplicated() {
    let tasks = json!({
      "tasks": [
        { "id": "01.01.01.01", "sessions": [session("s1", "2025-01-01T00:00:00Z")] },
        { "id": "01.01.02.01", "sessions": [session("s1", "2025-01-01T00:00:00Z"), session("s2", "2025-01-02T00:00:00Z")] }
      ]
    });
    let (_dir, ledger) = setup(tasks);
    let report = ledger.migrate(STREAM).unwrap().unwrap();
    assert_eq!(report.sessions_migrated, 2);

    let file = ledger.read(STREAM).unwrap().unwrap();
    let mut ids: Vec<&str> = file
      .threads
      .iter()
      .flat_map(|r| r.sessions.iter().map(|s| s.session_id.as_str()))
      .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["s1", "s2"]);
    assert!(file.threads[0].has_session("s1"));
  }

  #[test]
  fn clean_tasks_file_is_not_migrated() {
    let (_dir, ledger) = setup(json!({ "tasks": [{ "id": "01.01.01.01" }] }));
    assert!(ledger.migrate(STREAM).unwrap().is_none());
    assert!(ledger.read(STREAM).unwrap().is_none());
  }
}
