use anyhow::{Result, bail};
use uuid::Uuid;

use crate::address::ThreadId;
use crate::config::AppContext;
use crate::ledger::SessionStatus;
use crate::log_info;
use crate::utils::log::t;

use super::ledger;

/// Record a running session and print its id.
pub fn start(
  ctx: &AppContext,
  stream_id: &str,
  thread_id: &ThreadId,
  agent: &str,
  model: &str,
  session_id: Option<&str>,
) -> Result<()> {
  let session_id = session_id.map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
  let session =
    ledger(ctx, stream_id)?.start_session(stream_id, thread_id, agent, model, &session_id)?;
  println!("{}", session.session_id);
  Ok(())
}

pub fn complete(
  ctx: &AppContext,
  stream_id: &str,
  thread_id: &ThreadId,
  session_id: &str,
  status: SessionStatus,
  exit_code: Option<i32>,
) -> Result<()> {
  let Some(session) =
    ledger(ctx, stream_id)?.complete_session(stream_id, thread_id, session_id, status, exit_code)?
  else {
    bail!("no running session {session_id} for thread {thread_id} in {stream_id}");
  };
  log_info!(
    "Session {} of {} is {}",
    t::id(&session.session_id),
    t::id(thread_id),
    t::status(session.status)
  );
  Ok(())
}

pub fn last(ctx: &AppContext, stream_id: &str, thread_id: &ThreadId, json: bool) -> Result<()> {
  let session = ledger(ctx, stream_id)?.last_session(stream_id, thread_id)?;
  if json {
    println!("{}", serde_json::to_string_pretty(&session)?);
    return Ok(());
  }
  match session {
    Some(s) => log_info!(
      "{} {} {} {} started {}",
      t::id(&s.session_id),
      t::name(&s.agent_name),
      s.model,
      t::status(s.status),
      s.started_at.to_rfc3339()
    ),
    None => log_info!("No sessions recorded for {}", t::id(thread_id)),
  }
  Ok(())
}
