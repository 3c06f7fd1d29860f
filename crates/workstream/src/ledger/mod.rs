//! Per-thread session history of a workstream.

mod migrate;
mod model;
mod store;

pub use migrate::{LegacyTask, LegacyTasksFile, MigrationReport};
pub use model::{Session, SessionStatus, THREADS_FILE_VERSION, ThreadRecord, ThreadsFile};
pub use store::ThreadLedger;
