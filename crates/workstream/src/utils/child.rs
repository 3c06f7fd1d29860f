use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write as _};
use std::path::Path;
use std::process::{Command as ProcessCommand, ExitStatus, Stdio};

use anyhow::{Context, Result};

use super::command::Command;

/// Run `cmd` to completion. The configured env vars extend the current
/// environment rather than replacing it.
///
/// - With `stdout_log`: stdout lines are appended to that file, which is
///   only created once the child prints something. Stderr stays inherited.
/// - Without: inherit stdio to preserve regular CLI behavior.
pub fn run_child_process(cmd: &Command, stdout_log: Option<&Path>) -> Result<ExitStatus> {
  log::debug!("spawning {} {:?} in {}", cmd.program, cmd.args, cmd.cwd.display());
  let mut child = ProcessCommand::new(&cmd.program);
  child
    .current_dir(&cmd.cwd)
    .args(&cmd.args)
    .stdin(Stdio::inherit())
    .stderr(Stdio::inherit());
  for (key, value) in &cmd.env {
    child.env(key, value);
  }

  let Some(stdout_log) = stdout_log else {
    return child
      .stdout(Stdio::inherit())
      .status()
      .with_context(|| format!("failed to run {}", cmd.program));
  };

  let mut child = child
    .stdout(Stdio::piped())
    .spawn()
    .with_context(|| format!("failed to run {}", cmd.program))?;
  let copied = match child.stdout.take() {
    Some(mut out) => {
      let copied = append_lines(&mut out, stdout_log);
      if copied.is_err() {
        // Keep the pipe drained so the child cannot block on a full buffer.
        let _ = io::copy(&mut out, &mut io::sink());
      }
      copied
    }
    None => Ok(0),
  };
  let status = child
    .wait()
    .with_context(|| format!("failed to wait for {}", cmd.program))?;
  let lines = copied.with_context(|| format!("failed to write {}", stdout_log.display()))?;
  log::debug!("captured {lines} line(s) into {}", stdout_log.display());
  Ok(status)
}

fn append_lines(out: &mut impl Read, path: &Path) -> io::Result<usize> {
  let mut file: Option<File> = None;
  let mut count = 0;
  for line in BufReader::new(out).lines() {
    let line = line?;
    if file.is_none() {
      file = Some(OpenOptions::new().create(true).append(true).open(path)?);
    }
    if let Some(file) = file.as_mut() {
      writeln!(file, "{line}")?;
      count += 1;
    }
  }
  Ok(count)
}
