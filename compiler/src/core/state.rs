//! Instruction bookkeeping for the sequencer.
//!
//! `SequencerState` holds the three ordered sequences the sequencer mutates:
//! instructions not yet attempted (`pending`), instructions considered
//! complete (`finished`), and the records produced for them (`history`).
//! Instructions only ever leave the front of `pending` or the back of
//! `finished`; nothing here is reordered.

use std::collections::VecDeque;

use crate::core::types::ActionRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequencerState {
    pending: VecDeque<String>,
    finished: Vec<String>,
    history: Vec<ActionRecord>,
}

impl SequencerState {
    /// Split newline-delimited input into the pending queue.
    ///
    /// Blank entries are kept; they are skipped when stepping, not here.
    pub fn from_input(instructions: &str) -> Self {
        Self {
            pending: instructions.split('\n').map(str::to_string).collect(),
            finished: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn pending(&self) -> &VecDeque<String> {
        &self.pending
    }

    pub fn finished(&self) -> &[String] {
        &self.finished
    }

    pub fn history(&self) -> &[ActionRecord] {
        &self.history
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Remove and return the front of the pending queue.
    pub fn take_next(&mut self) -> Option<String> {
        self.pending.pop_front()
    }

    /// Put an instruction back at the front of the pending queue.
    pub fn restore_next(&mut self, instruction: String) {
        self.pending.push_front(instruction);
    }

    /// Mark an instruction finished together with the record it produced.
    pub fn complete(&mut self, instruction: String, record: ActionRecord) {
        self.finished.push(instruction);
        self.history.push(record);
    }

    /// Pop the most recently finished instruction and its record.
    ///
    /// Returns `None` (and leaves the state untouched) unless both sequences
    /// are non-empty.
    pub fn pop_last(&mut self) -> Option<(String, ActionRecord)> {
        if self.finished.is_empty() || self.history.is_empty() {
            return None;
        }
        let instruction = self.finished.pop()?;
        let record = self.history.pop()?;
        Some((instruction, record))
    }
}

/// Check the structural invariants of a sequencer state.
///
/// Returns one message per violation; an empty list means the state is sound.
pub fn check_invariants(state: &SequencerState) -> Vec<String> {
    let mut errors = Vec::new();
    if state.finished.len() != state.history.len() {
        errors.push(format!(
            "finished has {} entries but history has {}",
            state.finished.len(),
            state.history.len()
        ));
    }
    for (idx, (instruction, record)) in state.finished.iter().zip(&state.history).enumerate() {
        if instruction != &record.instruction {
            errors.push(format!(
                "history[{idx}] was produced by '{}' but finished[{idx}] is '{}'",
                record.instruction, instruction
            ));
        }
        if instruction.trim().is_empty() {
            errors.push(format!("finished[{idx}] is blank"));
        }
    }
    errors
}
