use anyhow::Result;

use crate::address::ThreadId;
use crate::config::AppContext;
use crate::ledger::ThreadRecord;
use crate::log_info;
use crate::utils::log::t;
use crate::utils::term::print_table;

use super::ledger;

fn session_rows(record: &ThreadRecord) -> Vec<Vec<String>> {
  record
    .sessions
    .iter()
    .map(|s| {
      let marker = if record.current_session_id.as_deref() == Some(s.session_id.as_str()) {
        "*"
      } else {
        ""
      };
      vec![
        t::id(record.thread_id),
        format!("{}{marker}", s.session_id),
        s.agent_name.clone(),
        s.model.clone(),
        t::status(s.status),
        s.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        s.exit_code.map(|c| c.to_string()).unwrap_or_default(),
      ]
    })
    .collect()
}

pub fn run(ctx: &AppContext, stream_id: &str, thread_id: Option<&ThreadId>) -> Result<()> {
  let Some(file) = ledger(ctx, stream_id)?.load(stream_id)? else {
    log_info!("No sessions recorded for {}", t::name(stream_id));
    return Ok(());
  };
  let rows: Vec<Vec<String>> = file
    .threads
    .iter()
    .filter(|r| thread_id.is_none_or(|id| r.thread_id == *id))
    .flat_map(session_rows)
    .collect();
  if rows.is_empty() {
    log_info!("No sessions recorded for {}", t::name(stream_id));
    return Ok(());
  }
  print_table(
    &["THREAD", "SESSION", "AGENT", "MODEL", "STATUS", "STARTED", "EXIT"],
    &rows,
  );
  Ok(())
}
