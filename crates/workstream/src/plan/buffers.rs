//! Accumulators used while a node is open during compilation.

use std::sync::OnceLock;

use regex::Regex;

use super::model::Question;

/// Ordered text fragments, joined with newlines when the owning node closes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionBuffer {
  fragments: Vec<String>,
}

impl SectionBuffer {
  /// Append a fragment. Blank and comment-only fragments are skipped.
  pub fn push(&mut self, fragment: &str) {
    let fragment = fragment.trim();
    if !fragment.is_empty() && !is_comment_only(fragment) {
      self.fragments.push(fragment.to_string());
    }
  }

  /// Move the contents out as trimmed text and reset the buffer.
  pub fn take(&mut self) -> String {
    let joined = std::mem::take(&mut self.fragments).join("\n");
    joined.trim().to_string()
  }
}

fn comment_only_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"^(?:\s*<!--[\s\S]*?-->\s*)+$").expect("valid comment regex"))
}

/// Template placeholders are written as bare HTML comments and never buffered.
#[must_use]
pub fn is_comment_only(raw: &str) -> bool {
  comment_only_re().is_match(raw)
}

fn bullet_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"^\s*(?:[-*+]|\d+[.)])[ \t]*").expect("valid bullet regex"))
}

fn checkbox_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"^\[([ xX])\][ \t]*").expect("valid checkbox regex"))
}

/// Strip the list bullet from a raw list item.
#[must_use]
pub fn item_text(raw_item: &str) -> &str {
  let end = bullet_re().find(raw_item).map_or(0, |m| m.end());
  raw_item[end..].trim()
}

/// Map a raw list item to a question. Only a literal `[x]`/`[X]` marks it
/// resolved. Returns `None` for items with no text.
#[must_use]
pub fn question_from_item(raw_item: &str) -> Option<Question> {
  let text = item_text(raw_item);
  let (resolved, rest) = match checkbox_re().captures(text) {
    Some(caps) => {
      let resolved = caps.get(1).is_some_and(|m| m.as_str().eq_ignore_ascii_case("x"));
      let end = caps.get(0).map_or(0, |m| m.end());
      (resolved, &text[end..])
    }
    None => (false, text),
  };
  let question = rest.lines().next().unwrap_or_default().trim();
  if question.is_empty() {
    return None;
  }
  Some(Question {
    question: question.to_string(),
    resolved,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn take_joins_with_newlines_and_resets() {
    let mut buf = SectionBuffer::default();
    buf.push("  first  ");
    buf.push("");
    buf.push("second\n");
    buf.push("<!-- placeholder -->");
    assert_eq!(buf.take(), "first\nsecond");
    assert_eq!(buf, SectionBuffer::default());
    assert_eq!(buf.take(), "");
  }

  #[test]
  fn detects_comment_only_blocks() {
    assert!(is_comment_only("<!-- fill me in -->"));
    assert!(is_comment_only("<!-- a -->\n<!--\nmulti\n-->"));
    assert!(!is_comment_only("<!-- a --> trailing text"));
    assert!(!is_comment_only("<div>x</div>"));
  }

  #[test]
  fn questions_parse_checkbox_state() {
    assert_eq!(
      question_from_item("- [x] Is it done?"),
      Some(Question {
        question: "Is it done?".into(),
        resolved: true
      })
    );
    assert_eq!(
      question_from_item("- [X] Upper"),
      Some(Question {
        question: "Upper".into(),
        resolved: true
      })
    );
    assert_eq!(
      question_from_item("* [ ] Is it tested?"),
      Some(Question {
        question: "Is it tested?".into(),
        resolved: false
      })
    );
  }

  #[test]
  fn question_without_checkbox_uses_first_line() {
    assert_eq!(
      question_from_item("1. Which database?\n   More context here"),
      Some(Question {
        question: "Which database?".into(),
        resolved: false
      })
    );
    assert_eq!(question_from_item("- "), None);
  }
}
