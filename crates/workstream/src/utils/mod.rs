pub mod atomic;
pub mod child;
pub mod command;
pub mod log;
pub mod term;
