use anyhow::{Result, bail};

use crate::address::ThreadId;
use crate::config::AppContext;
use crate::plan::thread_prompt;

use super::load_document;

pub fn run(ctx: &AppContext, stream_id: &str, thread_id: &ThreadId) -> Result<()> {
  let doc = load_document(ctx, stream_id)?;
  let Some(prompt) = thread_prompt(&doc, thread_id) else {
    bail!("thread {thread_id} not found in plan {stream_id}");
  };
  print!("{prompt}");
  Ok(())
}
