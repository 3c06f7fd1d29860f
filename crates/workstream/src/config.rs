use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize as _;
use serde::Deserialize;
use toml::Value as TomlValue;

use crate::utils::command::Command;

/// Known top-level config keys.
const KNOWN_TOP_LEVEL_KEYS: &[&str] = &["agent", "model", "plan_file", "agents"];

/// Known keys within each `[agents.<name>]` section.
const KNOWN_AGENT_KEYS: &[&str] = &["cmd", "model"];

const DEFAULT_TOML: &str =
  include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/defaults/workstream.toml"));

/// Directory marking a project root; holds one subdirectory per workstream.
pub const WORKSTREAMS_DIR: &str = ".workstreams";

const CONFIG_FILE: &str = "workstream.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentConfig {
  #[serde(default)]
  pub cmd: Vec<String>,
  /// Model used when neither the command line nor the thread history
  /// names one.
  #[serde(default)]
  pub model: Option<String>,
}

impl AgentConfig {
  /// Returns the agent command argv, failing if undefined or empty.
  pub fn get_cmd(&self, name: &str) -> Result<Command> {
    if self.cmd.is_empty() {
      bail!("agents.{name}.cmd not defined or empty")
    }
    Command::new(&self.cmd)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkstreamConfig {
  #[serde(default)]
  pub agents: BTreeMap<String, AgentConfig>,
  /// Default agent name for threads that were never run.
  #[serde(default)]
  pub agent: Option<String>,
  #[serde(default)]
  pub model: Option<String>,
  /// Plan file name inside each workstream directory.
  #[serde(default)]
  pub plan_file: Option<String>,
}

impl WorkstreamConfig {
  /// Return the agent config for `name` or a helpful error listing known agents.
  pub fn get_agent(&self, name: &str) -> Result<&AgentConfig> {
    if let Some(cfg) = self.agents.get(name) {
      Ok(cfg)
    } else {
      let known: Vec<String> = self.agents.keys().cloned().collect();
      bail!("unknown agent: {name}. Known agents: {}", known.join(", "));
    }
  }

  #[must_use]
  pub fn plan_file(&self) -> &str {
    self
      .plan_file
      .as_deref()
      .filter(|s| !s.trim().is_empty())
      .unwrap_or("PLAN.md")
  }
}

#[derive(Debug, Clone)]
pub struct WorkstreamPaths {
  root: PathBuf,
  cwd: PathBuf,
}

impl WorkstreamPaths {
  pub fn new(root: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      cwd: cwd.into(),
    }
  }

  /// Paths rooted at the nearest ancestor of `cwd` holding `.workstreams`,
  /// or at `cwd` itself when there is none.
  #[must_use]
  pub fn discover(cwd: &Path) -> Self {
    Self::new(find_root(cwd), cwd)
  }

  #[must_use]
  pub fn root(&self) -> &PathBuf {
    &self.root
  }

  #[must_use]
  pub fn cwd(&self) -> &PathBuf {
    &self.cwd
  }

  #[must_use]
  pub fn workstreams_dir(&self) -> PathBuf {
    self.root.join(WORKSTREAMS_DIR)
  }

  #[must_use]
  pub fn stream_dir(&self, stream_id: &str) -> PathBuf {
    self.workstreams_dir().join(stream_id)
  }

  #[must_use]
  pub fn threads_file(&self, stream_id: &str) -> PathBuf {
    self.stream_dir(stream_id).join("threads.json")
  }

  #[must_use]
  pub fn tasks_file(&self, stream_id: &str) -> PathBuf {
    self.stream_dir(stream_id).join("tasks.json")
  }

  #[must_use]
  pub fn logs_dir(&self, stream_id: &str) -> PathBuf {
    self.stream_dir(stream_id).join("logs")
  }
}

#[must_use]
pub fn find_root(cwd: &Path) -> PathBuf {
  cwd
    .ancestors()
    .find(|dir| dir.join(WORKSTREAMS_DIR).is_dir())
    .unwrap_or(cwd)
    .to_path_buf()
}

/// Reject stream ids that would escape the workstreams directory.
pub fn validate_stream_id(stream_id: &str) -> Result<()> {
  let valid = !stream_id.is_empty()
    && !stream_id.starts_with('.')
    && stream_id
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
  if !valid {
    bail!("invalid workstream id '{stream_id}': use letters, digits, '-', '_' or '.'");
  }
  Ok(())
}

#[derive(Debug, Clone)]
pub struct AppContext {
  pub paths: WorkstreamPaths,
  pub config: WorkstreamConfig,
}

impl AppContext {
  /// Resolve the project root from `cwd` and load the merged config.
  pub fn load(cwd: &Path) -> Result<Self> {
    let paths = WorkstreamPaths::discover(cwd);
    let config = load_config(paths.root())?;
    Ok(Self { paths, config })
  }

  pub fn plan_path(&self, stream_id: &str) -> Result<PathBuf> {
    validate_stream_id(stream_id)?;
    Ok(self.paths.stream_dir(stream_id).join(self.config.plan_file()))
  }
}

fn merge_values(base: &mut TomlValue, overlay: TomlValue) {
  match (base, overlay) {
    (TomlValue::Table(base_tbl), TomlValue::Table(overlay_tbl)) => {
      for (k, v) in overlay_tbl {
        match base_tbl.get_mut(&k) {
          Some(existing) => merge_values(existing, v),
          None => {
            base_tbl.insert(k, v);
          }
        }
      }
    }
    // Arrays and scalars: replace last-wins
    (base_slot, new_v) => *base_slot = new_v,
  }
}

/// Warn about unknown keys in a parsed TOML config file.
fn warn_unknown_keys(val: &TomlValue, file_path: &Path) {
  let TomlValue::Table(table) = val else {
    return;
  };

  for key in table.keys() {
    if !KNOWN_TOP_LEVEL_KEYS.contains(&key.as_str()) {
      anstream::eprintln!(
        "{}: unknown config key '{}' in {} (did you mean one of: {}?)",
        "warning".yellow(),
        key,
        file_path.display(),
        KNOWN_TOP_LEVEL_KEYS.join(", ")
      );
    }
  }

  if let Some(TomlValue::Table(agents)) = table.get("agents") {
    for (agent_name, agent_val) in agents {
      let TomlValue::Table(agent_table) = agent_val else {
        continue;
      };
      for key in agent_table.keys() {
        if !KNOWN_AGENT_KEYS.contains(&key.as_str()) {
          anstream::eprintln!(
            "{}: unknown config key 'agents.{}.{}' in {} (known keys: {})",
            "warning".yellow(),
            agent_name,
            key,
            file_path.display(),
            KNOWN_AGENT_KEYS.join(", ")
          );
        }
      }
    }
  }
}

fn merge_file(merged: &mut TomlValue, path: &Path) -> Result<()> {
  let data =
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
  let val: TomlValue =
    toml::from_str(&data).with_context(|| format!("invalid TOML in {}", path.display()))?;
  warn_unknown_keys(&val, path);
  merge_values(merged, val);
  log::debug!("merged config from {}", path.display());
  Ok(())
}

/// Load and merge configuration from defaults, global, and project files.
///
/// # Errors
/// Returns an error if any of the config files cannot be read or parsed
/// as valid TOML.
pub fn load_config(root: &Path) -> Result<WorkstreamConfig> {
  let mut merged: TomlValue =
    toml::from_str(DEFAULT_TOML).context("invalid embedded default config")?;

  let xdg = xdg::BaseDirectories::with_prefix("workstream");
  if let Some(global_path) = xdg.find_config_file(CONFIG_FILE) {
    merge_file(&mut merged, &global_path)?;
  }

  let project_cfg = root.join(WORKSTREAMS_DIR).join(CONFIG_FILE);
  if project_cfg.exists() {
    merge_file(&mut merged, &project_cfg)?;
  }

  // Deserialize into strongly typed config
  let merged_str = toml::to_string(&merged).context("failed to serialize merged config")?;
  let cfg: WorkstreamConfig =
    toml::from_str(&merged_str).context("failed to parse merged config")?;
  Ok(cfg)
}
