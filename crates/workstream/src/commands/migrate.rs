use anyhow::{Result, bail};

use crate::config::AppContext;
use crate::utils::log::t;
use crate::{log_error, log_info, log_success};

use super::ledger;

pub fn run(ctx: &AppContext, stream_id: &str) -> Result<()> {
  let Some(report) = ledger(ctx, stream_id)?.migrate(stream_id)? else {
    log_info!("Nothing to migrate for {}", t::name(stream_id));
    return Ok(());
  };
  if let Some(backup) = &report.backup_path {
    log_info!("Backup written to {}", t::path(backup.display()));
  }
  log_info!(
    "Migrated {} session(s) into {} thread(s)",
    report.sessions_migrated,
    report.threads_migrated
  );
  if report.success() {
    log_success!("Legacy session fields removed from tasks.json");
    return Ok(());
  }
  for err in &report.errors {
    log_error!("{}", err);
  }
  bail!(
    "{} task(s) could not be migrated; tasks.json was left untouched",
    report.errors.len()
  )
}
