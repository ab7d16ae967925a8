//! Instruction sequencing: compile newline-delimited instructions one at a time.
//!
//! The [`Sequencer`] consumes instructions from the front of its pending
//! queue, asks the completion gateway for one action per instruction, and
//! records the result. Instructions are marked finished as soon as an action
//! is produced, before anyone has run it. When the caller later finds the
//! action failed, [`Sequencer::retry`] rolls back the most recent instruction
//! and recompiles it with the failure folded into the prompt.

use std::collections::VecDeque;

use tracing::{debug, info, instrument};

use crate::core::action::first_action;
use crate::core::prompt::{DEFAULT_BASE_PROMPT, build_instruction_prompt, build_retry_prompt};
use crate::core::state::{SequencerState, check_invariants};
use crate::core::types::ActionRecord;
use crate::error::CompilerError;
use crate::gateway::{CompletionGateway, Sleeper, ThreadSleeper};
use crate::io::completion::CompletionService;

/// Collects constructor inputs for a [`Sequencer`].
///
/// `SequencerBuilder::new()` starts with the default base prompt;
/// `SequencerBuilder::default()` starts with nothing set.
#[derive(Debug, Clone, Default)]
pub struct SequencerBuilder {
    instructions: Option<String>,
    base_prompt: Option<String>,
    verbose: bool,
}

impl SequencerBuilder {
    pub fn new() -> Self {
        Self {
            base_prompt: Some(DEFAULT_BASE_PROMPT.to_string()),
            ..Self::default()
        }
    }

    /// Newline-delimited instructions, in execution order.
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn base_prompt(mut self, base_prompt: impl Into<String>) -> Self {
        self.base_prompt = Some(base_prompt.into());
        self
    }

    /// Log prompts and completions at `info` instead of `debug`.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn build<S, Z>(
        self,
        gateway: CompletionGateway<S, Z>,
    ) -> Result<Sequencer<S, Z>, CompilerError>
    where
        S: CompletionService,
        Z: Sleeper,
    {
        let instructions = self
            .instructions
            .ok_or_else(|| CompilerError::InvalidArgument("instructions are required".to_string()))?;
        let base_prompt = self
            .base_prompt
            .ok_or_else(|| CompilerError::InvalidArgument("base prompt is required".to_string()))?;
        let state = SequencerState::from_input(&instructions);
        debug!(pending = state.pending().len(), "sequencer created");
        Ok(Sequencer {
            gateway,
            base_prompt,
            verbose: self.verbose,
            state,
        })
    }
}

/// Owns the instruction queue and compiles it one instruction at a time
/// through a [`CompletionGateway`].
pub struct Sequencer<S, Z = ThreadSleeper> {
    gateway: CompletionGateway<S, Z>,
    base_prompt: String,
    verbose: bool,
    state: SequencerState,
}

impl<S: CompletionService, Z: Sleeper> Sequencer<S, Z> {
    /// Instructions not yet attempted; the front is next.
    pub fn pending(&self) -> &VecDeque<String> {
        self.state.pending()
    }

    /// Instructions considered complete, oldest first.
    pub fn finished(&self) -> &[String] {
        self.state.finished()
    }

    /// Records produced so far; `history()[i]` belongs to `finished()[i]`.
    pub fn history(&self) -> &[ActionRecord] {
        self.state.history()
    }

    pub fn is_done(&self) -> bool {
        !self.state.has_pending()
    }

    pub fn base_prompt(&self) -> &str {
        &self.base_prompt
    }

    pub fn gateway(&self) -> &CompletionGateway<S, Z> {
        &self.gateway
    }

    /// Compile the next pending instruction.
    ///
    /// A blank instruction is consumed without a completion call and yields
    /// `Ok(None)`. If the completion fails, the instruction goes back to the
    /// front of the queue and the state is unchanged.
    #[instrument(skip_all, fields(pending = self.state.pending().len()))]
    pub fn step(&mut self) -> Result<Option<ActionRecord>, CompilerError> {
        let raw = self.state.take_next().ok_or(CompilerError::EmptyQueue)?;
        let instruction = raw.trim().to_string();
        if instruction.is_empty() {
            debug!("skipped blank instruction");
            return Ok(None);
        }

        let prompt = build_instruction_prompt(&self.base_prompt, &instruction);
        let action_output = match self.compile(&instruction, &prompt) {
            Ok(output) => output,
            Err(err) => {
                self.state.restore_next(raw);
                return Err(err);
            }
        };

        let record = ActionRecord::new(instruction.clone(), action_output);
        self.state.complete(instruction, record.clone());
        debug_assert!(check_invariants(&self.state).is_empty());
        Ok(Some(record))
    }

    /// Roll back the most recently finished instruction and compile it again.
    ///
    /// The retry prompt carries the previous action and `diagnostic` (e.g. the
    /// stack trace from running it). Only the immediately preceding attempt is
    /// included. On completion failure the popped instruction and record are
    /// put back untouched.
    #[instrument(skip_all, fields(finished = self.state.finished().len()))]
    pub fn retry(&mut self, diagnostic: &str) -> Result<ActionRecord, CompilerError> {
        let (instruction, prior) = self
            .state
            .pop_last()
            .ok_or(CompilerError::NothingToRetry)?;

        let prompt = build_retry_prompt(
            &self.base_prompt,
            &instruction,
            &prior.action_output,
            diagnostic,
        );
        let action_output = match self.compile(&instruction, &prompt) {
            Ok(output) => output,
            Err(err) => {
                self.state.complete(instruction, prior);
                return Err(err);
            }
        };

        let record = ActionRecord::new(instruction.clone(), action_output);
        self.state.complete(instruction, record.clone());
        debug_assert!(check_invariants(&self.state).is_empty());
        Ok(record)
    }

    /// Step until the pending queue is empty, handing every produced record
    /// to `on_record`.
    ///
    /// Returns the number of records produced. Stops at the first error, from
    /// either a step or the callback.
    pub fn compile_all<F, E>(&mut self, mut on_record: F) -> Result<usize, E>
    where
        F: FnMut(&ActionRecord) -> Result<(), E>,
        E: From<CompilerError>,
    {
        let mut produced = 0usize;
        while self.state.has_pending() {
            if let Some(record) = self.step()? {
                produced += 1;
                on_record(&record)?;
            }
        }
        info!(produced, "all instructions compiled");
        Ok(produced)
    }

    fn compile(&self, instruction: &str, prompt: &str) -> Result<String, CompilerError> {
        if self.verbose {
            info!(instruction, prompt, "compiling instruction");
        } else {
            debug!(instruction, prompt_bytes = prompt.len(), "compiling instruction");
        }
        let completion = self.gateway.complete(prompt)?;
        let action = first_action(&completion);
        if self.verbose {
            info!(instruction, action = %action, "compiled instruction");
        } else {
            debug!(instruction, action_bytes = action.len(), "compiled instruction");
        }
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::test_support::{RecordingSleeper, ScriptedService, scripted_gateway};

    type TestSequencer = Sequencer<ScriptedService, RecordingSleeper>;

    fn sequencer(instructions: &str, service: ScriptedService) -> TestSequencer {
        SequencerBuilder::new()
            .base_prompt("BASE")
            .instructions(instructions)
            .build(scripted_gateway(service))
            .expect("build")
    }

    #[test]
    fn build_requires_instructions() {
        let err = SequencerBuilder::new()
            .build(scripted_gateway(ScriptedService::default()))
            .err()
            .expect("missing instructions");
        assert!(matches!(err, CompilerError::InvalidArgument(_)));
    }

    #[test]
    fn build_requires_base_prompt() {
        let err = SequencerBuilder::default()
            .instructions("A")
            .build(scripted_gateway(ScriptedService::default()))
            .err()
            .expect("missing base prompt");
        match err {
            CompilerError::InvalidArgument(msg) => assert!(msg.contains("base prompt")),
            other => panic!("expected InvalidArgument, got {other:?}"),
        }
    }

    #[test]
    fn new_builder_uses_default_base_prompt() {
        let seq = SequencerBuilder::new()
            .instructions("A")
            .build(scripted_gateway(ScriptedService::default()))
            .expect("build");
        assert_eq!(seq.base_prompt(), DEFAULT_BASE_PROMPT);
        assert_eq!(seq.pending().len(), 1);
    }

    #[test]
    fn step_records_trimmed_instruction_and_truncated_output() {
        let mut seq = sequencer(
            "  Type hello  \nClick submit",
            ScriptedService::texts(["\n env.send_keys('hello')\n\nThis types hello."]),
        );

        let record = seq.step().expect("step").expect("record");
        assert_eq!(record.instruction, "Type hello");
        assert_eq!(record.action_output, "env.send_keys('hello')");
        assert_eq!(seq.finished(), ["Type hello"]);
        assert_eq!(seq.history(), [record]);
        assert_eq!(seq.pending().len(), 1);
        assert_eq!(
            seq.gateway().service().prompts(),
            vec!["BASE\n\nCURRENT INSTRUCTION: Type hello\n\nOUTPUT: ".to_string()]
        );
    }

    #[test]
    fn blank_instruction_is_a_no_op() {
        let mut seq = sequencer("A\n   \nB", ScriptedService::texts(["a", "b"]));

        assert!(seq.step().expect("step 1").is_some());
        assert!(seq.step().expect("step 2").is_none());
        assert_eq!(seq.history().len(), 1);
        assert_eq!(seq.pending().len(), 1);
        assert_eq!(seq.gateway().service().requests().len(), 1);

        assert!(seq.step().expect("step 3").is_some());
        assert_eq!(seq.finished(), ["A", "B"]);
        assert!(seq.is_done());
    }

    #[test]
    fn step_on_empty_queue_fails() {
        let mut seq = sequencer("A", ScriptedService::texts(["a"]));
        seq.step().expect("step");
        assert!(matches!(seq.step(), Err(CompilerError::EmptyQueue)));
    }

    #[test]
    fn failed_step_restores_instruction_to_front() {
        let service = ScriptedService::new(vec![
            Err(ServiceError::Transport("connection reset".to_string())),
            Ok("a".to_string()),
        ]);
        let mut seq = sequencer("A\nB", service);

        let err = seq.step().unwrap_err();
        assert!(matches!(err, CompilerError::Completion(ServiceError::Transport(_))));
        let pending: Vec<&str> = seq.pending().iter().map(String::as_str).collect();
        assert_eq!(pending, vec!["A", "B"]);
        assert!(seq.finished().is_empty());
        assert!(seq.history().is_empty());

        let record = seq.step().expect("step").expect("record");
        assert_eq!(record.instruction, "A");
    }

    #[test]
    fn retry_replaces_last_record_with_failure_context() {
        let mut seq = sequencer("A", ScriptedService::texts(["clicked", "env.click(other)"]));
        seq.step().expect("step");

        let record = seq.retry("ElementNotFound: button").expect("retry");
        assert_eq!(record.instruction, "A");
        assert_eq!(record.action_output, "env.click(other)");
        assert_eq!(seq.finished(), ["A"]);
        assert_eq!(seq.history().len(), 1);
        assert_eq!(seq.history()[0], record);

        let prompts = seq.gateway().service().prompts();
        let retry_prompt = &prompts[1];
        assert!(retry_prompt.contains("CURRENT INSTRUCTION: A"));
        assert!(retry_prompt.contains("clicked"));
        assert!(retry_prompt.contains("ElementNotFound: button"));
        assert!(retry_prompt.len() > prompts[0].len());
    }

    #[test]
    fn repeated_retries_only_carry_latest_attempt() {
        let mut seq = sequencer(
            "A",
            ScriptedService::texts(["first", "second", "third"]),
        );
        seq.step().expect("step");
        seq.retry("trace one").expect("retry 1");
        seq.retry("trace two").expect("retry 2");

        let prompts = seq.gateway().service().prompts();
        let last = &prompts[2];
        assert!(last.contains("OUTPUT: second"));
        assert!(last.contains("trace two"));
        assert!(!last.contains("first"));
        assert!(!last.contains("trace one"));
    }

    #[test]
    fn retry_without_finished_instruction_fails() {
        let mut seq = sequencer("\nA", ScriptedService::texts(["a"]));
        assert!(matches!(seq.retry("trace"), Err(CompilerError::NothingToRetry)));
        seq.step().expect("blank step");
        assert!(matches!(seq.retry("trace"), Err(CompilerError::NothingToRetry)));
        assert_eq!(seq.pending().len(), 1);
    }

    #[test]
    fn failed_retry_leaves_state_unchanged() {
        let service = ScriptedService::new(vec![
            Ok("clicked".to_string()),
            Err(ServiceError::Status {
                code: 400,
                body: "bad request".to_string(),
            }),
        ]);
        let mut seq = sequencer("A\nB", service);
        let record = seq.step().expect("step").expect("record");

        assert!(seq.retry("trace").is_err());
        assert_eq!(seq.finished(), ["A"]);
        assert_eq!(seq.history(), [record]);
        assert_eq!(seq.pending().len(), 1);
    }

    #[test]
    fn compile_all_drains_queue() {
        let mut seq = sequencer(
            "Go to https://example.com/\nType hello\n\nClick submit\n",
            ScriptedService::texts(["env.get(url)", "env.send_keys('hello')", "env.click(b)"]),
        );
        let mut seen = Vec::new();
        let produced = seq
            .compile_all(|record| {
                seen.push(record.instruction.clone());
                Ok::<(), CompilerError>(())
            })
            .expect("compile all");

        assert_eq!(produced, 3);
        assert_eq!(seen, seq.finished());
        assert!(seq.is_done());
    }

    #[test]
    fn compile_all_stops_on_callback_error() {
        let mut seq = sequencer("A
B", ScriptedService::texts(["a", "b"]));
        let err = seq
            .compile_all(|_| Err(CompilerError::InvalidArgument("sink closed".to_string())))
            .unwrap_err();

        assert!(matches!(err, CompilerError::InvalidArgument(_)));
        assert_eq!(seq.finished(), ["A"]);
        assert_eq!(seq.pending().len(), 1);
        assert_eq!(seq.gateway().service().requests().len(), 1);
    }
}
