//! Deterministic, pure logic shared by the compiler.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod action;
pub mod prompt;
pub mod state;
pub mod types;
