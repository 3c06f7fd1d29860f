//! Compile Markdown work plans into addressed Stage/Batch/Thread trees and
//! keep a per-thread history of agent sessions.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};

pub mod address;
mod commands;
pub mod config;
pub mod ledger;
pub mod plan;
pub mod synthesis;
pub mod utils;

use crate::address::ThreadId;
use crate::config::AppContext;
use crate::ledger::SessionStatus;

/// Workstream - plan, dispatch and track agent work from Markdown plans.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None, bin_name = "workstream")]
pub struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
  /// Inspect or extend a workstream's plan document
  Plan(PlanArgs),
  /// Print the prompt an agent receives for a thread
  Prompt(ThreadArgs),
  /// Dispatch a thread to an agent and record the session
  Run(RunArgs),
  /// List recorded sessions of a workstream
  Sessions {
    stream: String,
    /// Only show sessions of this thread (SS.BB.TT)
    thread: Option<ThreadId>,
  },
  /// Low-level session ledger operations
  Session(SessionArgs),
  /// Move sessions from a legacy tasks.json into the thread ledger
  Migrate { stream: String },
  /// Print the text output of an agent event log
  Synthesis {
    event_log: PathBuf,
    /// Append decode logs to this file
    #[arg(long)]
    debug_log: Option<PathBuf>,
  },
}

#[derive(Debug, ClapArgs)]
struct PlanArgs {
  #[command(subcommand)]
  command: PlanCommand,
}

#[derive(Debug, Subcommand)]
enum PlanCommand {
  /// Print the compiled plan as a tree
  Show {
    stream: String,
    /// Print the compiled document as JSON
    #[arg(long)]
    json: bool,
  },
  /// Report compile errors; exits non-zero when there are any
  Validate { stream: String },
  /// List every thread address with its stage and batch
  Threads { stream: String },
  /// Append a new stage skeleton after the last stage
  AddStage { stream: String, name: String },
  /// Append a new batch skeleton to a stage
  AddBatch {
    stream: String,
    stage: u32,
    name: String,
  },
}

#[derive(Debug, ClapArgs)]
struct ThreadArgs {
  stream: String,
  /// Thread address (SS.BB.TT)
  thread: ThreadId,
}

#[derive(Debug, ClapArgs)]
struct RunArgs {
  #[command(flatten)]
  target: ThreadArgs,
  /// Agent to use instead of the thread's last agent or the default
  #[arg(long)]
  agent: Option<String>,
  /// Model to use instead of the thread's last model or the agent default
  #[arg(long)]
  model: Option<String>,
}

#[derive(Debug, ClapArgs)]
struct SessionArgs {
  #[command(subcommand)]
  command: SessionCommand,
}

#[derive(Debug, Subcommand)]
enum SessionCommand {
  /// Record a new running session and print its id
  Start {
    #[command(flatten)]
    target: ThreadArgs,
    #[arg(long)]
    agent: String,
    #[arg(long)]
    model: String,
    /// Session id to record (defaults to a new UUID)
    #[arg(long)]
    session_id: Option<String>,
  },
  /// Mark a running session as finished
  Complete {
    #[command(flatten)]
    target: ThreadArgs,
    session_id: String,
    /// completed, failed or cancelled
    #[arg(long, default_value = "completed")]
    status: SessionStatus,
    #[arg(long)]
    exit_code: Option<i32>,
  },
  /// Show the most recent session of a thread
  Last {
    #[command(flatten)]
    target: ThreadArgs,
    #[arg(long)]
    json: bool,
  },
}

pub fn parse() -> Cli {
  Cli::parse()
}

fn init_logging() {
  let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
    .format_timestamp(None)
    .try_init();
}

pub fn run() -> Result<()> {
  let cli = parse();
  init_logging();

  let cwd = std::env::current_dir()?;
  let ctx = AppContext::load(&cwd)?;
  log::debug!(
    "project root {} (cwd {})",
    ctx.paths.root().display(),
    ctx.paths.cwd().display()
  );

  match cli.command {
    Commands::Plan(args) => match args.command {
      PlanCommand::Show { stream, json } => commands::plan::show(&ctx, &stream, json),
      PlanCommand::Validate { stream } => commands::plan::validate(&ctx, &stream),
      PlanCommand::Threads { stream } => commands::plan::threads(&ctx, &stream),
      PlanCommand::AddStage { stream, name } => commands::plan::add_stage(&ctx, &stream, &name),
      PlanCommand::AddBatch {
        stream,
        stage,
        name,
      } => commands::plan::add_batch(&ctx, &stream, stage, &name),
    },
    Commands::Prompt(ThreadArgs { stream, thread }) => {
      commands::prompt::run(&ctx, &stream, &thread)
    }
    Commands::Run(RunArgs {
      target,
      agent,
      model,
    }) => commands::run::run(
      &ctx,
      &target.stream,
      &target.thread,
      agent.as_deref(),
      model.as_deref(),
    ),
    Commands::Sessions { stream, thread } => {
      commands::sessions::run(&ctx, &stream, thread.as_ref())
    }
    Commands::Session(args) => match args.command {
      SessionCommand::Start {
        target,
        agent,
        model,
        session_id,
      } => commands::session::start(
        &ctx,
        &target.stream,
        &target.thread,
        &agent,
        &model,
        session_id.as_deref(),
      ),
      SessionCommand::Complete {
        target,
        session_id,
        status,
        exit_code,
      } => commands::session::complete(
        &ctx,
        &target.stream,
        &target.thread,
        &session_id,
        status,
        exit_code,
      ),
      SessionCommand::Last { target, json } => {
        commands::session::last(&ctx, &target.stream, &target.thread, json)
      }
    },
    Commands::Migrate { stream } => commands::migrate::run(&ctx, &stream),
    Commands::Synthesis {
      event_log,
      debug_log,
    } => commands::synthesis::run(&event_log, debug_log.as_deref()),
  }
}
