use std::collections::HashMap;
use std::process::ExitStatus;

use anyhow::{Context, Result, bail};
use uuid::Uuid;

use crate::address::ThreadId;
use crate::config::{AppContext, WorkstreamConfig};
use crate::ledger::{Session, SessionStatus};
use crate::plan::thread_prompt;
use crate::synthesis::read_synthesis;
use crate::utils::child::run_child_process;
use crate::utils::log::t;
use crate::{log_info, log_success, log_warn};

use super::{ledger, load_document};

/// Agent for a run: explicit flag, then the agent of the thread's last
/// session, then the configured default.
pub(crate) fn resolve_agent(
  flag: Option<&str>,
  last: Option<&Session>,
  config: &WorkstreamConfig,
) -> Result<String> {
  flag
    .map(str::to_string)
    .or_else(|| last.map(|s| s.agent_name.clone()))
    .or_else(|| config.agent.clone())
    .ok_or_else(|| anyhow::anyhow!("no agent given and no default agent configured"))
}

/// Model for a run: explicit flag, then the last session's model when it
/// ran on the same agent, then the agent's model, then the global model.
pub(crate) fn resolve_model(
  flag: Option<&str>,
  last: Option<&Session>,
  agent_name: &str,
  config: &WorkstreamConfig,
) -> Result<String> {
  flag
    .map(str::to_string)
    .or_else(|| {
      last
        .filter(|s| s.agent_name == agent_name)
        .map(|s| s.model.clone())
    })
    .or_else(|| config.agents.get(agent_name).and_then(|a| a.model.clone()))
    .or_else(|| config.model.clone())
    .ok_or_else(|| anyhow::anyhow!("no model given for agent {agent_name}; pass --model"))
}

fn session_outcome(status: ExitStatus) -> (SessionStatus, Option<i32>) {
  match status.code() {
    Some(0) => (SessionStatus::Completed, Some(0)),
    Some(code) => (SessionStatus::Failed, Some(code)),
    // Terminated by a signal.
    None => (SessionStatus::Cancelled, None),
  }
}

pub fn run(
  ctx: &AppContext,
  stream_id: &str,
  thread_id: &ThreadId,
  agent: Option<&str>,
  model: Option<&str>,
) -> Result<()> {
  let doc = load_document(ctx, stream_id)?;
  let Some(prompt) = thread_prompt(&doc, thread_id) else {
    bail!("thread {thread_id} not found in plan {stream_id}");
  };

  let ledger = ledger(ctx, stream_id)?;
  let last = ledger.last_session(stream_id, thread_id)?;
  let agent_name = resolve_agent(agent, last.as_ref(), &ctx.config)?;
  let model = resolve_model(model, last.as_ref(), &agent_name, &ctx.config)?;
  let agent_cfg = ctx.config.get_agent(&agent_name)?;

  let session_id = Uuid::new_v4().to_string();
  let logs_dir = ctx.paths.logs_dir(stream_id);
  std::fs::create_dir_all(&logs_dir)
    .with_context(|| format!("failed to create {}", logs_dir.display()))?;
  let event_log = logs_dir.join(format!("{session_id}.ndjson"));

  let env = HashMap::from([
    ("WORKSTREAM_PROMPT".to_string(), prompt),
    ("WORKSTREAM_MODEL".to_string(), model.clone()),
    ("WORKSTREAM_THREAD".to_string(), thread_id.to_string()),
    ("WORKSTREAM_SESSION".to_string(), session_id.clone()),
    (
      "WORKSTREAM_EVENT_LOG".to_string(),
      event_log.display().to_string(),
    ),
  ]);
  let cmd = agent_cfg
    .get_cmd(&agent_name)?
    .in_dir(ctx.paths.root())
    .with_env(&env);

  ledger.start_session(stream_id, thread_id, &agent_name, &model, &session_id)?;
  log_info!(
    "Running {} with {} ({}) as session {}",
    t::id(thread_id),
    t::name(&agent_name),
    model,
    t::id(&session_id)
  );

  // Agents either write the event log themselves or print events to stdout.
  let (status, exit_code) = match run_child_process(&cmd, Some(&event_log)) {
    Ok(exit) => session_outcome(exit),
    Err(err) => {
      if let Err(record_err) =
        ledger.complete_session(stream_id, thread_id, &session_id, SessionStatus::Failed, None)
      {
        log::warn!("failed to record session {session_id} as failed: {record_err:#}");
      }
      return Err(err.context(format!("agent {agent_name} could not be run")));
    }
  };
  let completed = ledger.complete_session(stream_id, thread_id, &session_id, status, exit_code)?;
  if completed.is_none() {
    log_warn!(
      "Session {} was no longer running; its outcome ({status}) was not recorded",
      t::id(&session_id)
    );
  }

  if let Some(output) = read_synthesis(&event_log, Some(&logs_dir.join("synthesis.log")))? {
    if !output.text.is_empty() {
      println!("{}", output.text);
    }
    if !output.success {
      log_warn!(
        "Some events in {} could not be decoded",
        t::path(event_log.display())
      );
    }
  }

  match status {
    SessionStatus::Completed => {
      log_success!("Thread {} completed", thread_id);
      Ok(())
    }
    _ => bail!(
      "thread {thread_id} {status} (exit code {})",
      exit_code.map_or_else(|| "none".to_string(), |c| c.to_string())
    ),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::AgentConfig;

  fn config() -> WorkstreamConfig {
    let mut cfg = WorkstreamConfig {
      agent: Some("opencode".into()),
      model: Some("global".into()),
      ..WorkstreamConfig::default()
    };
    cfg.agents.insert(
      "claude".into(),
      AgentConfig {
        cmd: vec!["claude".into()],
        model: Some("sonnet".into()),
      },
    );
    cfg.agents.insert("opencode".into(), AgentConfig::default());
    cfg
  }

  #[test]
  fn agent_prefers_flag_then_history_then_config() {
    let cfg = config();
    let last = Session::running("s1", "claude", "opus");
    assert_eq!(resolve_agent(Some("x"), Some(&last), &cfg).unwrap(), "x");
    assert_eq!(resolve_agent(None, Some(&last), &cfg).unwrap(), "claude");
    assert_eq!(resolve_agent(None, None, &cfg).unwrap(), "opencode");
    assert!(resolve_agent(None, None, &WorkstreamConfig::default()).is_err());
  }

  #[test]
  fn model_from_history_only_when_agent_matches() {
    let cfg = config();
    let last = Session::running("s1", "claude", "opus");
    assert_eq!(
      resolve_model(Some("m"), Some(&last), "claude", &cfg).unwrap(),
      "m"
    );
    assert_eq!(
      resolve_model(None, Some(&last), "claude", &cfg).unwrap(),
      "opus"
    );
    assert_eq!(
      resolve_model(None, Some(&last), "opencode", &cfg).unwrap(),
      "global"
    );
    assert_eq!(resolve_model(None, None, "claude", &cfg).unwrap(), "sonnet");
    let err = resolve_model(None, None, "opencode", &WorkstreamConfig::default()).unwrap_err();
    assert!(err.to_string().contains("--model"));
  }
}
