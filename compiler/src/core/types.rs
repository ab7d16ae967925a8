//! Shared deterministic types for compiler core logic.

use serde::{Deserialize, Serialize};

/// One compiled instruction: the instruction text paired with the action the
/// model produced for it.
///
/// Records are created by a completion round-trip and never mutated afterwards;
/// a retry replaces the record rather than editing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Trimmed instruction text that produced this action.
    pub instruction: String,
    /// Single logical action emitted by the model (trimmed, cut at the first
    /// blank line).
    pub action_output: String,
}

impl ActionRecord {
    pub fn new(instruction: impl Into<String>, action_output: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            action_output: action_output.into(),
        }
    }
}
