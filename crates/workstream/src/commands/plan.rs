use anyhow::{Result, bail};

use crate::config::AppContext;
use crate::plan::{StreamDocument, append_batch, append_stage, parse};
use crate::utils::atomic::write_atomic;
use crate::utils::log::t;
use crate::utils::term::print_table;
use crate::{log_error, log_info, log_success};

use super::{compile_plan, load_document, read_plan};

pub fn show(ctx: &AppContext, stream_id: &str, json: bool) -> Result<()> {
  let doc = load_document(ctx, stream_id)?;
  if json {
    println!("{}", serde_json::to_string_pretty(&doc)?);
    return Ok(());
  }
  for line in render_tree(&doc) {
    anstream::println!("{line}");
  }
  Ok(())
}

fn render_tree(doc: &StreamDocument) -> Vec<String> {
  let mut lines = vec![format!("Plan: {}", t::name(&doc.stream_name))];
  for stage in &doc.stages {
    lines.push(format!("Stage {}: {}", stage.id, stage.name));
    let open = stage.questions.iter().filter(|q| !q.resolved).count();
    if open > 0 {
      lines.push(format!("  {}", t::warn(format!("{open} open question(s)"))));
    }
    for batch in &stage.batches {
      lines.push(format!("  Batch {}: {}", batch.prefix, batch.name));
      for thread in &batch.threads {
        let address = crate::address::thread_address(stage.id, batch.id, thread.id);
        lines.push(format!("    {} {}", t::id(address), thread.name));
      }
    }
  }
  lines
}

pub fn validate(ctx: &AppContext, stream_id: &str) -> Result<()> {
  let (path, outcome) = compile_plan(ctx, stream_id)?;
  for err in &outcome.errors {
    log_error!("{}", err);
  }
  match outcome.document {
    Some(doc) if outcome.errors.is_empty() => {
      log_success!(
        "{} is valid: {} stage(s), {} thread(s)",
        path.display(),
        doc.stages.len(),
        doc.thread_count()
      );
      Ok(())
    }
    _ => bail!(
      "{} has {} problem(s)",
      path.display(),
      outcome.errors.len().max(1)
    ),
  }
}

pub fn threads(ctx: &AppContext, stream_id: &str) -> Result<()> {
  let doc = load_document(ctx, stream_id)?;
  let rows: Vec<Vec<String>> = doc
    .threads()
    .map(|r| {
      vec![
        t::id(r.address),
        r.stage.name.clone(),
        r.batch.name.clone(),
        r.thread.name.clone(),
      ]
    })
    .collect();
  if rows.is_empty() {
    log_info!("No threads in {}", t::name(&doc.stream_name));
    return Ok(());
  }
  print_table(&["THREAD", "STAGE", "BATCH", "NAME"], &rows);
  Ok(())
}

pub fn add_stage(ctx: &AppContext, stream_id: &str, name: &str) -> Result<()> {
  let (path, markdown) = read_plan(ctx, stream_id)?;
  let updated = append_stage(&markdown, name);
  write_atomic(&path, updated.as_bytes())?;
  let id = parse(&updated)
    .document
    .and_then(|doc| doc.stages.iter().map(|s| s.id).max())
    .unwrap_or(1);
  log_success!("Added stage {} to {}", id, path.display());
  Ok(())
}

pub fn add_batch(ctx: &AppContext, stream_id: &str, stage_id: u32, name: &str) -> Result<()> {
  let (path, markdown) = read_plan(ctx, stream_id)?;
  let updated = append_batch(&markdown, stage_id, name)?;
  write_atomic(&path, updated.as_bytes())?;
  log_success!("Added batch {:?} to stage {} in {}", name.trim(), stage_id, path.display());
  Ok(())
}
