//! Flattens Markdown into top-level block tokens.
//!
//! Only the outermost blocks are emitted. Each block keeps its raw source
//! slice so buffered content reaches the prompt exactly as the author wrote
//! it (bold markers, fences and list bullets included).

use std::ops::Range;

use pulldown_cmark::{Event, Options, Parser, Tag};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block<'a> {
  Heading {
    depth: u8,
    text: String,
    raw: &'a str,
  },
  Paragraph {
    raw: &'a str,
  },
  List {
    raw: &'a str,
    /// Raw source of each top-level item, bullet included.
    items: Vec<&'a str>,
  },
  Code {
    raw: &'a str,
  },
  Html {
    raw: &'a str,
  },
  Other {
    raw: &'a str,
  },
}

impl<'a> Block<'a> {
  #[must_use]
  pub fn raw(&self) -> &'a str {
    match self {
      Block::Heading { raw, .. }
      | Block::Paragraph { raw }
      | Block::List { raw, .. }
      | Block::Code { raw }
      | Block::Html { raw }
      | Block::Other { raw } => raw,
    }
  }

  #[must_use]
  pub fn heading_depth(&self) -> Option<u8> {
    match self {
      Block::Heading { depth, .. } => Some(*depth),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy)]
enum Kind {
  Heading(u8),
  Paragraph,
  List,
  Code,
  Html,
  Other,
}

struct Pending {
  kind: Kind,
  range: Range<usize>,
  text: String,
  items: Vec<Range<usize>>,
}

impl Pending {
  fn new(tag: &Tag<'_>, range: Range<usize>) -> Self {
    let kind = match tag {
      Tag::Heading { level, .. } => Kind::Heading(*level as u8),
      Tag::Paragraph => Kind::Paragraph,
      Tag::List(_) => Kind::List,
      Tag::CodeBlock(_) => Kind::Code,
      Tag::HtmlBlock => Kind::Html,
      _ => Kind::Other,
    };
    Self {
      kind,
      range,
      text: String::new(),
      items: Vec::new(),
    }
  }

  fn finish(self, source: &str) -> Block<'_> {
    let raw = slice(source, &self.range);
    match self.kind {
      Kind::Heading(depth) => Block::Heading {
        depth,
        text: self.text.trim().to_string(),
        raw,
      },
      Kind::Paragraph => Block::Paragraph { raw },
      Kind::List => Block::List {
        raw,
        items: self.items.iter().map(|r| slice(source, r)).collect(),
      },
      Kind::Code => Block::Code { raw },
      Kind::Html => Block::Html { raw },
      Kind::Other => Block::Other { raw },
    }
  }
}

fn slice<'a>(source: &'a str, range: &Range<usize>) -> &'a str {
  source.get(range.clone()).unwrap_or_default().trim_end()
}

fn options() -> Options {
  Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH
}

/// Tokenize `markdown` into its top-level blocks in source order.
#[must_use]
pub fn tokenize(markdown: &str) -> Vec<Block<'_>> {
  let mut blocks = Vec::new();
  let mut depth = 0usize;
  let mut current: Option<Pending> = None;

  for (event, range) in Parser::new_ext(markdown, options()).into_offset_iter() {
    match event {
      Event::Start(tag) => {
        if depth == 0 {
          current = Some(Pending::new(&tag, range));
        } else if depth == 1
          && matches!(tag, Tag::Item)
          && let Some(pending) = current.as_mut()
        {
          pending.items.push(range);
        }
        depth += 1;
      }
      Event::End(_) => {
        depth = depth.saturating_sub(1);
        if depth == 0
          && let Some(pending) = current.take()
        {
          blocks.push(pending.finish(markdown));
        }
      }
      Event::Text(text) | Event::Code(text) => {
        if let Some(pending) = current.as_mut()
          && matches!(pending.kind, Kind::Heading(_))
        {
          pending.text.push_str(&text);
        }
      }
      _ => {}
    }
  }

  blocks
}
