use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Result, bail};
use regex::{Captures, Regex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
  pub program: String,
  pub args: Vec<String>,
  pub cwd: PathBuf,
  pub env: Vec<(String, String)>,
}

impl Command {
  /// Construct from argv-like vector: first element is the program, rest are args.
  pub fn new(argv: &[String]) -> Result<Self> {
    let Some((program, args)) = argv.split_first() else {
      bail!("command is empty");
    };
    if program.trim().is_empty() {
      bail!("command program is empty");
    }
    Ok(Self {
      program: program.clone(),
      args: args.to_vec(),
      cwd: std::env::current_dir()?,
      env: Vec::new(),
    })
  }

  #[must_use]
  pub fn in_dir(mut self, cwd: &Path) -> Self {
    self.cwd = cwd.to_path_buf();
    self
  }

  /// Add `env` to the child environment and expand `$VAR` references to
  /// those variables in program and args.
  #[must_use]
  pub fn with_env(mut self, env: &HashMap<String, String>) -> Self {
    let mut argv = Vec::with_capacity(self.args.len() + 1);
    argv.push(self.program);
    argv.append(&mut self.args);
    let mut expanded = expand_vars_in_argv(&argv, env).into_iter();
    self.program = expanded.next().unwrap_or_default();
    self.args = expanded.collect();

    let mut vars: Vec<(String, String)> =
      env.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    vars.sort();
    self.env.extend(vars);
    self
  }
}

fn var_regex() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("valid var regex"))
}

/// Expand "$VAR" references in argv using the given env map, falling back to
/// the process environment. Unset variables expand to nothing. Does not
/// support ${} forms.
pub fn expand_vars_in_argv(argv: &[String], env: &HashMap<String, String>) -> Vec<String> {
  argv
    .iter()
    .map(|arg| {
      var_regex()
        .replace_all(arg, |caps: &Captures| {
          env
            .get(&caps[1])
            .cloned()
            .or_else(|| std::env::var(&caps[1]).ok())
            .unwrap_or_default()
        })
        .into_owned()
    })
    .collect()
}
