//! Plan document compiler: Markdown in, addressed Stage/Batch/Thread tree out.

mod append;
mod buffers;
mod compiler;
mod heading;
mod model;
mod prompt;
mod tokens;

pub use append::{append_batch, append_stage};
pub use compiler::parse;
pub use heading::{HeadingRole, StageSubsection, classify};
pub use model::{
  Batch, ParseError, ParseOutcome, Question, Stage, StreamDocument, Thread, ThreadRef,
};
pub use prompt::thread_prompt;
pub use tokens::{Block, tokenize};
