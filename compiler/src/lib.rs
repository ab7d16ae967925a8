//! Instruction compiler: turns newline-delimited human instructions into
//! executable automation actions, one completion call at a time.
//!
//! - **[`core`]**: Pure, deterministic logic (prompt assembly, completion
//!   normalisation, instruction bookkeeping). No I/O.
//! - **[`io`]**: Side-effecting collaborators (completion transport, config,
//!   transcripts).
//!
//! [`gateway`] wraps a completion service with rate-limit backoff, and
//! [`sequencer`] drives it through the instruction queue with step and retry.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod gateway;
pub mod io;
pub mod logging;
pub mod sequencer;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
