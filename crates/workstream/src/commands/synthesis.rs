use std::path::Path;

use anyhow::{Result, bail};

use crate::log_warn;
use crate::synthesis::read_synthesis;

pub fn run(event_log: &Path, debug_log: Option<&Path>) -> Result<()> {
  let Some(output) = read_synthesis(event_log, debug_log)? else {
    bail!("event log not found: {}", event_log.display());
  };
  if !output.text.is_empty() {
    println!("{}", output.text);
  }
  if !output.success {
    let failed = output
      .logs
      .iter()
      .filter(|l| l.contains("invalid JSON"))
      .count();
    log_warn!("{} line(s) of {} could not be decoded", failed, event_log.display());
  }
  Ok(())
}
