use std::sync::OnceLock;

use regex::Regex;

/// Named subsections of a Stage (depth-4 headings).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageSubsection {
  Definition,
  Constitution,
  Questions,
  Batches,
}

/// Structural role of a heading, derived from its depth and text alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadingRole {
  /// Depth 1 `Plan: {name}`.
  Plan { name: String },
  /// Any depth-2 heading, e.g. `Summary` or `References`.
  Section { title: String },
  Stage { id: u32, name: String },
  /// Depth 4. `None` for headings that name no known subsection.
  Subsection(Option<StageSubsection>),
  Batch { id: u32, name: String },
  Thread { id: u32, name: String },
  /// Not a structural marker; the heading is ordinary content.
  Text,
}

fn plan_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"^Plan:\s*(\S.*)$").expect("valid plan regex"))
}

fn numbered_re(label: &str) -> Regex {
  Regex::new(&format!(r"(?i)^{label}\s+(\d+)\s*:\s*(\S.*)$")).expect("valid heading regex")
}

fn stage_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| numbered_re("Stage"))
}

fn batch_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| numbered_re("Batch"))
}

fn thread_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| numbered_re("Thread"))
}

/// Returns `(id, name)` when `text` matches `re` and the id fits in a `u32`.
fn numbered(re: &Regex, text: &str) -> Option<(u32, String)> {
  let caps = re.captures(text)?;
  let id = caps.get(1)?.as_str().parse::<u32>().ok()?;
  let name = caps.get(2)?.as_str().trim().to_string();
  Some((id, name))
}

/// Parse the document name out of a depth-1 heading text.
#[must_use]
pub fn plan_name(text: &str) -> Option<String> {
  let caps = plan_re().captures(text.trim())?;
  Some(caps.get(1)?.as_str().trim().to_string())
}

#[must_use]
pub fn subsection(text: &str) -> Option<StageSubsection> {
  let lower = text.to_lowercase();
  if lower.contains("definition") {
    Some(StageSubsection::Definition)
  } else if lower.contains("constitution") {
    Some(StageSubsection::Constitution)
  } else if lower.contains("questions") {
    Some(StageSubsection::Questions)
  } else if lower.contains("batches") {
    Some(StageSubsection::Batches)
  } else {
    None
  }
}

#[must_use]
pub fn classify(depth: u8, text: &str) -> HeadingRole {
  let text = text.trim();
  let numbered_role = |re: &Regex, make: fn(u32, String) -> HeadingRole| {
    numbered(re, text).map_or(HeadingRole::Text, |(id, name)| make(id, name))
  };
  match depth {
    1 => plan_name(text).map_or(HeadingRole::Text, |name| HeadingRole::Plan { name }),
    2 => HeadingRole::Section {
      title: text.to_string(),
    },
    3 => numbered_role(stage_re(), |id, name| HeadingRole::Stage { id, name }),
    4 => HeadingRole::Subsection(subsection(text)),
    5 => numbered_role(batch_re(), |id, name| HeadingRole::Batch { id, name }),
    6 => numbered_role(thread_re(), |id, name| HeadingRole::Thread { id, name }),
    _ => HeadingRole::Text,
  }
}
