//! Normalisation of raw model completions into a single action.

/// Reduce a raw completion to one logical action.
///
/// The completion is trimmed, cut at the first blank line (`"\n\n"`), and the
/// remaining head trimmed again. Anything the model emits after the first
/// blank line (commentary, a second action) is discarded.
pub fn first_action(completion: &str) -> String {
    let trimmed = completion.trim();
    let head = match trimmed.find("\n\n") {
        Some(idx) => &trimmed[..idx],
        None => trimmed,
    };
    head.trim().to_string()
}
