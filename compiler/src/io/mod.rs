//! I/O helpers for compiler commands.

pub mod completion;
pub mod config;
pub mod transcript;
