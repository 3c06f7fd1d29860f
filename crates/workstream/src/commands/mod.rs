use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use crate::config::AppContext;
use crate::ledger::ThreadLedger;
use crate::log_warn;
use crate::plan::{ParseOutcome, StreamDocument, parse};

pub mod migrate;
pub mod plan;
pub mod prompt;
pub mod run;
pub mod session;
pub mod sessions;
pub mod synthesis;

/// Plan file of `stream_id` with its raw contents.
pub(crate) fn read_plan(ctx: &AppContext, stream_id: &str) -> Result<(PathBuf, String)> {
  let path = ctx.plan_path(stream_id)?;
  if !path.exists() {
    bail!("plan file not found: {}", path.display());
  }
  let markdown =
    fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
  Ok((path, markdown))
}

pub(crate) fn compile_plan(ctx: &AppContext, stream_id: &str) -> Result<(PathBuf, ParseOutcome)> {
  let (path, markdown) = read_plan(ctx, stream_id)?;
  Ok((path, parse(&markdown)))
}

/// Compiled plan of `stream_id`. Diagnostics are printed as warnings; only a
/// plan that does not compile at all is an error.
pub(crate) fn load_document(ctx: &AppContext, stream_id: &str) -> Result<StreamDocument> {
  let (path, outcome) = compile_plan(ctx, stream_id)?;
  for err in &outcome.errors {
    log_warn!("{}: {}", path.display(), err);
  }
  match outcome.document {
    Some(doc) => Ok(doc),
    None => bail!("plan {} could not be compiled", path.display()),
  }
}

pub(crate) fn ledger(ctx: &AppContext, stream_id: &str) -> Result<ThreadLedger> {
  crate::config::validate_stream_id(stream_id)?;
  Ok(ThreadLedger::new(ctx.paths.clone()))
}
