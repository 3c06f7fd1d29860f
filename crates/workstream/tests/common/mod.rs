#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use assert_cmd::Command;
use temp_env::with_vars;
use tempfile::{Builder, TempDir};

pub const PLAN: &str = r"# Plan: Payments

## Summary

Rebuild the payment pipeline.

## Stages

### Stage 1: Setup

#### Definition

Set things up.

#### Questions

- [x] Is it done?
- [ ] Is it tested?

#### Batches

##### Batch 01: Init

###### Thread 01: Boot

**Summary:** hello

**Details:** boot the app

###### Thread 02: Config

**Summary:** load config

## References

- docs/payments.md
";

/// Agent that records its environment and writes an event log with one
/// malformed line. Exits with `$FAKE_EXIT` (default 0).
const FAKE_AGENT: &str = r#"#!/bin/sh
dir=$(dirname "$WORKSTREAM_EVENT_LOG")
printf '%s|%s|%s|%s\n' "$1" "$WORKSTREAM_MODEL" "$WORKSTREAM_THREAD" "$WORKSTREAM_SESSION" > "$dir/agent-env.txt"
printf '%s\n' "$WORKSTREAM_PROMPT" > "$dir/agent-prompt.txt"
printf '%s\n' '{"type":"text","part":{"text":"hello "}}' 'not json' '{"type":"text","part":{"text":"world"}}' > "$WORKSTREAM_EVENT_LOG"
exit "${FAKE_EXIT:-0}"
"#;

/// Agent that prints its events to stdout instead of writing the log.
const STDOUT_AGENT: &str = r#"#!/bin/sh
echo '{"type":"step_start","part":{}}'
echo '{"type":"text","part":{"text":"printed "}}'
echo '{"type":"text","part":{"text":"events"}}'
"#;

pub const STREAM: &str = "payments";

#[derive(Debug)]
pub struct TestEnv {
  temp: TempDir,
  xdg_home: PathBuf,
}

impl TestEnv {
  pub fn run<F, R>(f: F) -> R
  where
    F: FnOnce(&TestEnv) -> R,
  {
    let env = TestEnv::new();
    with_vars(
      [
        (
          "XDG_CONFIG_HOME",
          Some(env.xdg_home_dir().display().to_string()),
        ),
        ("RUST_LOG", None),
      ],
      || f(&env),
    )
  }

  pub fn new() -> Self {
    let temp = Builder::new()
      .prefix("workstream-test-")
      .tempdir_in(tmp_root())
      .expect("temp dir");
    let xdg_home = temp.path().join("xdg");
    fs::create_dir_all(&xdg_home).expect("xdg dir");
    let project = temp.path().join("project");
    fs::create_dir_all(project.join(".workstreams")).expect("project dir");
    Self { temp, xdg_home }
  }

  /// Project root (contains `.workstreams`).
  pub fn path(&self) -> PathBuf {
    self.temp.path().join("project")
  }

  pub fn xdg_home_dir(&self) -> &Path {
    &self.xdg_home
  }

  pub fn stream_dir(&self) -> PathBuf {
    self.path().join(".workstreams").join(STREAM)
  }

  pub fn write_plan(&self, markdown: &str) -> Result<PathBuf> {
    let dir = self.stream_dir();
    fs::create_dir_all(&dir)?;
    let path = dir.join("PLAN.md");
    fs::write(&path, markdown).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
  }

  pub fn write_project_config(&self, toml: &str) -> Result<()> {
    fs::write(self.path().join(".workstreams").join("workstream.toml"), toml)?;
    Ok(())
  }

  pub fn write_xdg_config(&self, rel: &str, contents: &str) -> Result<()> {
    let path = self.xdg_home.join(rel);
    if let Some(dir) = path.parent() {
      fs::create_dir_all(dir)?;
    }
    fs::write(&path, contents)?;
    Ok(())
  }

  /// Install the fake agent script and register it as the default agent.
  pub fn install_fake_agent(&self) -> Result<()> {
    self.install_agent(FAKE_AGENT)
  }

  /// Register an agent that only prints events to stdout.
  pub fn install_stdout_agent(&self) -> Result<()> {
    self.install_agent(STDOUT_AGENT)
  }

  /// Register `program` (not a script) as the default agent command.
  pub fn install_agent_program(&self, program: &str) -> Result<()> {
    self.write_project_config(&format!(
      "agent = \"fake\"\n\n[agents.fake]\ncmd = [\"{program}\"]\nmodel = \"fake-model\"\n"
    ))
  }

  fn install_agent(&self, body: &str) -> Result<()> {
    let script = self.temp.path().join("fake-agent.sh");
    fs::write(&script, body)?;
    self.write_project_config(&format!(
      "agent = \"fake\"\n\n[agents.fake]\ncmd = [\"sh\", \"{}\", \"$WORKSTREAM_THREAD\"]\nmodel = \"fake-model\"\n",
      script.display()
    ))
  }

  pub fn read_ledger(&self) -> Result<serde_json::Value> {
    let data = fs::read_to_string(self.stream_dir().join("threads.json"))?;
    Ok(serde_json::from_str(&data)?)
  }

  pub fn workstream(&self) -> Result<Command> {
    let mut cmd = Command::cargo_bin("workstream")?;
    cmd.current_dir(self.path());
    cmd.env("XDG_CONFIG_HOME", &self.xdg_home);
    cmd.env_remove("RUST_LOG");
    Ok(cmd)
  }
}

/// Returns a workspace-local temp root for tests under `./target/test-tmp` at the workspace root.
pub fn tmp_root() -> PathBuf {
  let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
  let workspace_root = manifest_dir
    .parent()
    .and_then(|p| p.parent())
    .unwrap_or(&manifest_dir)
    .to_path_buf();
  let root = workspace_root.join("target").join("test-tmp");
  let _ = fs::create_dir_all(&root);
  root
}
