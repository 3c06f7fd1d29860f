//! Line-based insertion of new Stage/Batch skeletons into a plan file.
//!
//! The parsed tree is never re-serialized: the author's formatting is kept
//! byte for byte and only the template lines are added. Headings are
//! recognised with the same classifier the compiler uses.

use std::sync::OnceLock;

use anyhow::{Result, bail};
use regex::Regex;

use super::heading::{HeadingRole, StageSubsection, classify};

fn atx_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"^(#{1,6})[ \t]+(.+?)[ \t#]*$").expect("valid heading regex"))
}

#[derive(Debug, Clone)]
struct HeadingLine {
  index: usize,
  depth: u8,
  role: HeadingRole,
}

/// ATX headings outside fenced code blocks.
fn heading_lines(lines: &[&str]) -> Vec<HeadingLine> {
  let mut out = Vec::new();
  let mut fence: Option<&str> = None;
  for (index, line) in lines.iter().enumerate() {
    let trimmed = line.trim_start();
    let marker = ["```", "~~~"].into_iter().find(|m| trimmed.starts_with(m));
    match (fence, marker) {
      (None, Some(m)) => {
        fence = Some(m);
        continue;
      }
      (Some(open), Some(m)) if open == m => {
        fence = None;
        continue;
      }
      (Some(_), _) => continue,
      (None, None) => {}
    }
    if let Some(caps) = atx_re().captures(line) {
      let depth = caps[1].len() as u8;
      out.push(HeadingLine {
        index,
        depth,
        role: classify(depth, &caps[2]),
      });
    }
  }
  out
}

fn stage_template(id: u32, name: &str) -> String {
  format!(
    "### Stage {id}: {name}\n\n#### Definition\n\n<!-- What this stage delivers -->\n\n#### Constitution\n\n<!-- Rules every thread in this stage follows -->\n\n#### Questions\n\n<!-- - [ ] Open question -->\n\n#### Batches\n\n{}",
    batch_template(1, name)
  )
}

fn batch_template(id: u32, name: &str) -> String {
  format!(
    "##### Batch {id:02}: {name}\n\n<!-- Batch summary -->\n\n###### Thread 01: {name}\n\n**Summary:**\n\n<!-- One paragraph summary -->\n\n**Details:**\n\n<!-- Implementation details -->"
  )
}

/// Insert `block` before line `at`, surrounded by single blank lines.
fn insert_block(lines: &[&str], at: usize, block: &str) -> String {
  let mut head: Vec<&str> = lines[..at].to_vec();
  while head.last().is_some_and(|l| l.trim().is_empty()) {
    head.pop();
  }
  let tail: Vec<&str> = lines[at..]
    .iter()
    .copied()
    .skip_while(|l| l.trim().is_empty())
    .collect();

  let mut out = String::new();
  for line in head {
    out.push_str(line);
    out.push('\n');
  }
  if !out.is_empty() {
    out.push('\n');
  }
  out.push_str(block);
  out.push('\n');
  if !tail.is_empty() {
    out.push('\n');
    for line in tail {
      out.push_str(line);
      out.push('\n');
    }
  }
  out
}

/// Append a new Stage after the last existing Stage section and return the
/// updated document. The new Stage id is one past the highest existing id.
#[must_use]
pub fn append_stage(markdown: &str, name: &str) -> String {
  let lines: Vec<&str> = markdown.lines().collect();
  let headings = heading_lines(&lines);

  let last_stage = headings
    .iter()
    .rposition(|h| matches!(h.role, HeadingRole::Stage { .. }));
  let next_id = headings
    .iter()
    .filter_map(|h| match h.role {
      HeadingRole::Stage { id, .. } => Some(id),
      _ => None,
    })
    .max()
    .map_or(1, |id| id + 1);

  let at = match last_stage {
    Some(pos) => headings[pos + 1..]
      .iter()
      .find(|h| h.depth <= 2)
      .map_or(lines.len(), |h| h.index),
    None => lines.len(),
  };
  insert_block(&lines, at, &stage_template(next_id, name.trim()))
}

/// Append a new Batch at the end of Stage `stage_id` and return the updated
/// document. The Batch goes at the end of the Stage's last `#### Batches`
/// subsection, which is added at the end of the Stage when missing.
pub fn append_batch(markdown: &str, stage_id: u32, name: &str) -> Result<String> {
  let lines: Vec<&str> = markdown.lines().collect();
  let headings = heading_lines(&lines);

  let Some(start) = headings
    .iter()
    .position(|h| matches!(h.role, HeadingRole::Stage { id, .. } if id == stage_id))
  else {
    bail!("stage {stage_id} not found in plan");
  };
  // A Stage only ends at the next Stage or depth-2 section; other depth-3
  // headings are ordinary content.
  let section_len = headings[start + 1..]
    .iter()
    .position(|h| h.depth <= 2 || matches!(h.role, HeadingRole::Stage { .. }))
    .unwrap_or(headings.len() - start - 1);
  let section = &headings[start + 1..start + 1 + section_len];
  let section_end = headings
    .get(start + 1 + section_len)
    .map_or(lines.len(), |h| h.index);

  let next_id = section
    .iter()
    .filter_map(|h| match h.role {
      HeadingRole::Batch { id, .. } => Some(id),
      _ => None,
    })
    .max()
    .map_or(1, |id| id + 1);
  let batches = section
    .iter()
    .rposition(|h| h.role == HeadingRole::Subsection(Some(StageSubsection::Batches)));

  let mut block = String::new();
  let at = match batches {
    // Every depth-4 heading closes the Batches subsection.
    Some(pos) => section[pos + 1..]
      .iter()
      .find(|h| h.depth == 4)
      .map_or(section_end, |h| h.index),
    None => {
      block.push_str("#### Batches\n\n");
      section_end
    }
  };
  block.push_str(&batch_template(next_id, name.trim()));
  Ok(insert_block(&lines, at, &block))
}
