//! Single-pass compiler from plan Markdown to a [`StreamDocument`].
//!
//! Sections are not independently delimited: closing a Stage has to flush
//! whatever Batch and Thread are still open inside it. The compiler is
//! therefore a fold over the flat token stream, holding the currently open
//! Stage, its open Batch, and that Batch's open Thread, each with its own
//! buffers.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use super::buffers::{SectionBuffer, is_comment_only, item_text, question_from_item};
use super::heading::{HeadingRole, StageSubsection, classify};
use super::model::{Batch, ParseError, ParseOutcome, Question, Stage, StreamDocument, Thread};
use super::tokens::{Block, tokenize};

const PLAN_SECTION: &str = "Plan";

/// Compile `markdown` into a plan tree. Never fails: problems are reported
/// in [`ParseOutcome::errors`], and the document is `None` only when the
/// `# Plan: {name}` heading is missing or malformed.
#[must_use]
pub fn parse(markdown: &str) -> ParseOutcome {
  let blocks = tokenize(markdown);
  let mut errors = Vec::new();

  let Some(stream_name) = document_name(&blocks, &mut errors) else {
    return ParseOutcome {
      document: None,
      errors,
    };
  };

  let summary = section_blocks(&blocks, "summary")
    .map(|blocks| {
      let mut buf = SectionBuffer::default();
      for block in blocks.iter().filter(|b| !is_comment_only(b.raw())) {
        buf.push(block.raw());
      }
      buf.take()
    })
    .unwrap_or_default();

  let references = section_blocks(&blocks, "references")
    .map(|blocks| {
      blocks
        .iter()
        .filter_map(|b| match b {
          Block::List { items, .. } => Some(items),
          _ => None,
        })
        .flatten()
        .map(|item| item_text(item).to_string())
        .filter(|text| !text.is_empty() && !is_comment_only(text))
        .collect()
    })
    .unwrap_or_default();

  let stages = blocks
    .iter()
    .fold(Compiler::default(), Compiler::step)
    .finish();
  validate(&stages, &mut errors);

  ParseOutcome {
    document: Some(StreamDocument {
      stream_name,
      summary,
      references,
      stages,
    }),
    errors,
  }
}

fn document_name(blocks: &[Block<'_>], errors: &mut Vec<ParseError>) -> Option<String> {
  let mut titles = blocks.iter().filter_map(|b| match b {
    Block::Heading { depth: 1, text, .. } => Some(text),
    _ => None,
  });

  let Some(first) = titles.next() else {
    errors.push(ParseError::new(
      PLAN_SECTION,
      "missing plan title: expected a '# Plan: <name>' heading",
    ));
    return None;
  };

  let name = match classify(1, first) {
    HeadingRole::Plan { name } => name,
    _ => {
      errors.push(ParseError::new(
        PLAN_SECTION,
        format!("invalid plan title '{first}': expected 'Plan: <name>'"),
      ));
      return None;
    }
  };

  let extra = titles.count();
  if extra > 0 {
    errors.push(ParseError::new(
      PLAN_SECTION,
      format!("found {extra} additional depth-1 heading(s); only the first names the plan"),
    ));
  }
  Some(name)
}

/// Blocks following the depth-2 heading titled `title` (case-insensitive),
/// up to the next heading of depth 2 or less.
fn section_blocks<'b, 'a>(blocks: &'b [Block<'a>], title: &str) -> Option<&'b [Block<'a>]> {
  let start = blocks.iter().position(|b| {
    matches!(b, Block::Heading { depth: 2, text, .. } if text.eq_ignore_ascii_case(title))
  })? + 1;
  let len = blocks[start..]
    .iter()
    .position(|b| b.heading_depth().is_some_and(|d| d <= 2))
    .unwrap_or(blocks.len() - start);
  Some(&blocks[start..start + len])
}

fn thread_marker_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(
      r"(?i)^\s*(?:\*\*|__)\s*(summary|details)\s*:?\s*(?:\*\*|__)\s*:?",
    )
    .expect("valid thread marker regex")
  })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThreadSubsection {
  Summary,
  Details,
}

/// Splits a `**Summary:** rest` paragraph into its marker and remainder.
fn thread_marker(raw: &str) -> Option<(ThreadSubsection, &str)> {
  let caps = thread_marker_re().captures(raw)?;
  let label = caps.get(1)?.as_str();
  let subsection = if label.eq_ignore_ascii_case("summary") {
    ThreadSubsection::Summary
  } else {
    ThreadSubsection::Details
  };
  let end = caps.get(0)?.end();
  Some((subsection, &raw[end..]))
}

#[derive(Debug)]
struct OpenThread {
  id: u32,
  name: String,
  subsection: Option<ThreadSubsection>,
  summary: SectionBuffer,
  details: SectionBuffer,
}

impl OpenThread {
  fn new(id: u32, name: String) -> Self {
    Self {
      id,
      name,
      subsection: None,
      summary: SectionBuffer::default(),
      details: SectionBuffer::default(),
    }
  }

  fn push(&mut self, block: &Block<'_>) {
    let mut raw = block.raw();
    if let Block::Paragraph { .. } = block
      && let Some((subsection, rest)) = thread_marker(raw)
    {
      self.subsection = Some(subsection);
      raw = rest;
    }
    match self.subsection {
      Some(ThreadSubsection::Summary) => self.summary.push(raw),
      Some(ThreadSubsection::Details) => self.details.push(raw),
      None => {}
    }
  }

  fn finish(mut self) -> Thread {
    Thread {
      id: self.id,
      name: self.name,
      summary: self.summary.take(),
      details: self.details.take(),
    }
  }
}

#[derive(Debug)]
struct OpenBatch {
  id: u32,
  name: String,
  summary: SectionBuffer,
  threads: Vec<Thread>,
  thread: Option<OpenThread>,
}

impl OpenBatch {
  fn new(id: u32, name: String) -> Self {
    Self {
      id,
      name,
      summary: SectionBuffer::default(),
      threads: Vec::new(),
      thread: None,
    }
  }

  fn open_thread(&mut self, id: u32, name: String) {
    self.close_thread();
    self.thread = Some(OpenThread::new(id, name));
  }

  fn close_thread(&mut self) {
    if let Some(thread) = self.thread.take() {
      self.threads.push(thread.finish());
    }
  }

  fn push(&mut self, block: &Block<'_>) {
    match self.thread.as_mut() {
      Some(thread) => thread.push(block),
      None => self.summary.push(block.raw()),
    }
  }

  fn finish(mut self) -> Batch {
    self.close_thread();
    Batch {
      id: self.id,
      prefix: Batch::prefix_for(self.id),
      name: self.name,
      summary: self.summary.take(),
      threads: self.threads,
    }
  }
}

#[derive(Debug)]
struct OpenStage {
  id: u32,
  name: String,
  subsection: Option<StageSubsection>,
  definition: SectionBuffer,
  constitution: SectionBuffer,
  questions: Vec<Question>,
  batches: Vec<Batch>,
  batch: Option<OpenBatch>,
}

impl OpenStage {
  fn new(id: u32, name: String) -> Self {
    Self {
      id,
      name,
      subsection: None,
      definition: SectionBuffer::default(),
      constitution: SectionBuffer::default(),
      questions: Vec::new(),
      batches: Vec::new(),
      batch: None,
    }
  }

  fn enter(&mut self, subsection: Option<StageSubsection>) {
    self.close_batch();
    self.subsection = subsection;
  }

  fn open_batch(&mut self, id: u32, name: String) {
    self.close_batch();
    self.batch = Some(OpenBatch::new(id, name));
  }

  fn close_batch(&mut self) {
    if let Some(batch) = self.batch.take() {
      self.batches.push(batch.finish());
    }
  }

  fn push(&mut self, block: &Block<'_>) {
    match self.subsection {
      Some(StageSubsection::Definition) => self.definition.push(block.raw()),
      Some(StageSubsection::Constitution) => self.constitution.push(block.raw()),
      Some(StageSubsection::Questions) => {
        if let Block::List { items, .. } = block {
          self
            .questions
            .extend(items.iter().filter_map(|item| question_from_item(item)));
        }
      }
      Some(StageSubsection::Batches) => {
        if let Some(batch) = self.batch.as_mut() {
          batch.push(block);
        }
      }
      None => {}
    }
  }

  fn finish(mut self) -> Stage {
    self.close_batch();
    Stage {
      id: self.id,
      name: self.name,
      definition: self.definition.take(),
      constitution: self.constitution.take(),
      questions: self.questions,
      batches: self.batches,
    }
  }
}

#[derive(Debug, Default)]
struct Compiler {
  stages: Vec<Stage>,
  stage: Option<OpenStage>,
}

impl Compiler {
  fn step(mut self, block: &Block<'_>) -> Self {
    match block {
      Block::Heading { depth, text, .. } => self.heading(*depth, text, block),
      _ => self.content(block),
    }
    self
  }

  fn heading(&mut self, depth: u8, text: &str, block: &Block<'_>) {
    match classify(depth, text) {
      _ if depth <= 2 => self.close_stage(),
      HeadingRole::Stage { id, name } => {
        self.close_stage();
        self.stage = Some(OpenStage::new(id, name));
      }
      HeadingRole::Subsection(subsection) => {
        if let Some(stage) = self.stage.as_mut() {
          stage.enter(subsection);
        }
      }
      HeadingRole::Batch { id, name } => match self.stage.as_mut() {
        Some(stage) if stage.subsection == Some(StageSubsection::Batches) => {
          stage.open_batch(id, name);
        }
        _ => log::debug!("ignoring batch heading outside a stage's batches: {text}"),
      },
      HeadingRole::Thread { id, name } => {
        match self.stage.as_mut().and_then(|s| s.batch.as_mut()) {
          Some(batch) => batch.open_thread(id, name),
          None => log::debug!("ignoring thread heading outside a batch: {text}"),
        }
      }
      HeadingRole::Plan { .. } | HeadingRole::Section { .. } | HeadingRole::Text => {
        self.content(block);
      }
    }
  }

  fn content(&mut self, block: &Block<'_>) {
    if is_comment_only(block.raw()) {
      return;
    }
    if let Some(stage) = self.stage.as_mut() {
      stage.push(block);
    }
  }

  fn close_stage(&mut self) {
    if let Some(stage) = self.stage.take() {
      self.stages.push(stage.finish());
    }
  }

  fn finish(mut self) -> Vec<Stage> {
    self.close_stage();
    self.stages
  }
}

fn validate(stages: &[Stage], errors: &mut Vec<ParseError>) {
  if stages.is_empty() {
    errors.push(ParseError::new("Stages", "plan defines no stages"));
  }
  let mut stage_ids = HashSet::new();
  for stage in stages {
    let stage_section = format!("Stage {}", stage.id);
    if !stage_ids.insert(stage.id) {
      errors.push(ParseError::new(
        &stage_section,
        format!("duplicate stage id {}", stage.id),
      ));
    }
    let mut batch_ids = HashSet::new();
    for batch in &stage.batches {
      let batch_section = format!("{stage_section} / Batch {}", batch.prefix);
      if !batch_ids.insert(batch.id) {
        errors.push(ParseError::new(
          &batch_section,
          format!("duplicate batch id {}", batch.prefix),
        ));
      }
      let mut thread_ids = HashSet::new();
      for thread in &batch.threads {
        if !thread_ids.insert(thread.id) {
          errors.push(ParseError::new(
            &batch_section,
            format!("duplicate thread id {:02}", thread.id),
          ));
        }
      }
    }
  }
}
