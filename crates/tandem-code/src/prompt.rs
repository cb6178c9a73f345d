//! Default system prompt for the terminal assistant.

/// Used when `[agent] system_prompt` is not set. The tool list and project
/// summary are appended per request by the conversation.
pub fn default_system_prompt() -> String {
    "\
You are a helpful coding assistant running on the user's machine. \
Answer concisely and prefer concrete code over long explanations.

Guidelines:
- Read files before describing or changing them.
- Keep changes minimal and focused.
- Say so when you are unsure instead of guessing."
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_is_non_empty() {
        let prompt = default_system_prompt();
        assert!(prompt.contains("coding assistant"));
        assert!(!prompt.contains("TOOL_CALL"));
    }
}
