//! Prompt assembly for instruction compilation.
//!
//! Prompts are plain concatenations of a base prompt and fixed delimiters so
//! the model sees the same layout on every call. Builders here are pure: the
//! same inputs always produce byte-identical output.

use std::sync::LazyLock;

use minijinja::{Environment, context};
use tracing::debug;

/// Automation-environment contract shown to the model before every instruction.
pub const DEFAULT_BASE_PROMPT: &str = include_str!("prompts/base.txt");

/// Token the model returns when no element matches a description.
pub const NO_RESPONSE_TOKEN: &str = "<NONE>";

pub const CURRENT_INSTRUCTION_DELIMITER: &str = "\n\nCURRENT INSTRUCTION: ";
pub const OUTPUT_DELIMITER: &str = "\n\nOUTPUT: ";
pub const STACK_TRACE_DELIMITER: &str = "\n\nSTACK TRACE: ";
pub const RETRY_DELIMITER: &str = "\n\nAttempting again.\n\nOUTPUT: ";

const FIND_ELEMENT_TEMPLATE: &str = include_str!("prompts/find_element.txt");
const TRUNCATED_MARKER: &str = "\n[truncated]";

static ENGINE: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.add_template("find_element", FIND_ELEMENT_TEMPLATE)
        .expect("find_element template should be valid");
    env
});

/// Build the prompt asking the model to compile one instruction.
pub fn build_instruction_prompt(base_prompt: &str, instruction: &str) -> String {
    let instruction = instruction.trim();
    let mut prompt = String::with_capacity(
        base_prompt.len()
            + CURRENT_INSTRUCTION_DELIMITER.len()
            + instruction.len()
            + OUTPUT_DELIMITER.len(),
    );
    prompt.push_str(base_prompt);
    prompt.push_str(CURRENT_INSTRUCTION_DELIMITER);
    prompt.push_str(instruction);
    prompt.push_str(OUTPUT_DELIMITER);
    prompt
}

/// Build the prompt asking the model to try an instruction again.
///
/// Extends the instruction prompt with the failed output, the diagnostic text
/// (an empty diagnostic still gets its section), and the retry delimiter.
pub fn build_retry_prompt(
    base_prompt: &str,
    instruction: &str,
    prior_output: &str,
    diagnostic: &str,
) -> String {
    let mut prompt = build_instruction_prompt(base_prompt, instruction);
    prompt.push_str(prior_output);
    prompt.push_str(STACK_TRACE_DELIMITER);
    prompt.push(' ');
    prompt.push_str(diagnostic);
    prompt.push_str(RETRY_DELIMITER);
    prompt
}

/// Build the element-discovery prompt for a description and page HTML.
///
/// HTML longer than `html_budget_bytes` is cut on a char boundary and marked.
pub fn build_find_element_prompt(
    description: &str,
    cleaned_html: &str,
    html_budget_bytes: usize,
) -> Result<String, minijinja::Error> {
    let html = clip_to_budget(cleaned_html.trim(), html_budget_bytes);
    let template = ENGINE.get_template("find_element")?;
    template.render(context! {
        description => description.trim(),
        cleaned_html => html,
        no_response_token => NO_RESPONSE_TOKEN,
    })
}

/// Whether a model response is the no-response token.
pub fn is_no_response(output: &str) -> bool {
    output.trim().trim_matches('"') == NO_RESPONSE_TOKEN
}

fn clip_to_budget(text: &str, budget: usize) -> String {
    if text.len() <= budget {
        return text.to_string();
    }
    // A budget too small for the marker gets a bare cut.
    let marker = if budget > TRUNCATED_MARKER.len() {
        TRUNCATED_MARKER
    } else {
        ""
    };
    let mut end = budget - marker.len();
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    debug!(before_len = text.len(), after_len = end, "truncated html for budget");
    let mut clipped = text[..end].to_string();
    clipped.push_str(marker);
    clipped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_prompt_layout_is_exact() {
        let prompt = build_instruction_prompt("BASE", "  Type hello \n");
        assert_eq!(prompt, "BASE\n\nCURRENT INSTRUCTION: Type hello\n\nOUTPUT: ");
    }

    #[test]
    fn instruction_prompt_is_deterministic() {
        let first = build_instruction_prompt(DEFAULT_BASE_PROMPT, "Click submit");
        let second = build_instruction_prompt(DEFAULT_BASE_PROMPT, "Click submit");
        assert_eq!(first, second);
    }

    #[test]
    fn retry_prompt_extends_instruction_prompt_in_order() {
        let base = build_instruction_prompt("BASE", "A");
        let retry = build_retry_prompt("BASE", "A", "clicked", "ElementNotFound: button");

        assert!(retry.len() > base.len());
        assert!(retry.starts_with(&base));
        let output_pos = retry.find("clicked").expect("prior output");
        let trace_pos = retry.find("STACK TRACE:").expect("trace section");
        let diag_pos = retry.find("ElementNotFound: button").expect("diagnostic");
        let again_pos = retry.find("Attempting again.").expect("retry section");
        assert!(output_pos < trace_pos);
        assert!(trace_pos < diag_pos);
        assert!(diag_pos < again_pos);
        assert!(retry.ends_with("OUTPUT: "));
    }

    #[test]
    fn retry_prompt_keeps_empty_stack_trace_section() {
        let retry = build_retry_prompt("BASE", "A", "clicked", "");
        assert_eq!(
            retry,
            "BASE\n\nCURRENT INSTRUCTION: A\n\nOUTPUT: clicked\n\nSTACK TRACE:  \n\nAttempting again.\n\nOUTPUT: "
        );
    }

    #[test]
    fn default_base_prompt_describes_environment() {
        assert!(DEFAULT_BASE_PROMPT.contains("env.click(element)"));
        assert!(DEFAULT_BASE_PROMPT.contains("env.scroll(direction)"));
    }

    #[test]
    fn find_element_prompt_embeds_inputs() {
        let prompt = build_find_element_prompt(
            "the search box",
            "<input name=\"q\">",
            10_000,
        )
        .expect("render");
        assert!(prompt.contains("best described by the following description: the search box."));
        assert!(prompt.contains("<input name=\"q\">"));
        assert!(prompt.contains("please return \"<NONE>\""));
        assert!(prompt.ends_with("== OUTPUT ==\n"));
    }

    #[test]
    fn find_element_prompt_clips_html_to_budget() {
        let html = "é".repeat(100);
        let prompt = build_find_element_prompt("button", &html, 51).expect("render");
        assert!(prompt.contains("[truncated]"));
        assert!(!prompt.contains(&html));
    }

    #[test]
    fn clipped_html_never_exceeds_budget() {
        let html = "abcdefghijklmnopqrstuvwxyz";
        for budget in [1, 5, 12, 13, 20] {
            let clipped = clip_to_budget(html, budget);
            assert!(clipped.len() <= budget, "budget {budget} gave {clipped:?}");
        }
        assert_eq!(clip_to_budget(html, 5), "abcde");
        assert_eq!(clip_to_budget(html, 13), "a\n[truncated]");
        assert_eq!(clip_to_budget(html, 26), html);
    }

    #[test]
    fn default_base_prompt_ends_with_blank_line() {
        assert!(DEFAULT_BASE_PROMPT.ends_with("Only do what I instructed you to do.\n\n"));
        assert!(DEFAULT_BASE_PROMPT.contains("near element e. \n"));
        let prompt = build_instruction_prompt(DEFAULT_BASE_PROMPT, "A");
        assert!(prompt.contains("to do.\n\n\n\nCURRENT INSTRUCTION: A"));
    }

    #[test]
    fn recognises_no_response_token() {
        assert!(is_no_response("<NONE>"));
        assert!(is_no_response("  \"<NONE>\"\n"));
        assert!(!is_no_response("env.driver.find_element(by='id', value='q')"));
    }
}
