//! Character-density token estimation.
//!
//! Counts are approximate. No tokenizer is loaded; each category has a
//! fixed tokens-per-character density and the product is rounded down.

use crate::Message;
use crate::capability::ModelCategory;

/// Characters per token used when turning a token allowance back into a
/// character budget. Deliberately lower than real tokenizers so allowances
/// under-fill rather than overflow.
pub const CONSERVATIVE_CHARS_PER_TOKEN: usize = 3;

/// Estimate the number of tokens in `text`.
pub fn estimate_tokens(text: &str, category: ModelCategory) -> usize {
    (text.chars().count() as f64 * category.token_density()).floor() as usize
}

/// Sum of [`estimate_tokens`] over message contents.
pub fn estimate_message_tokens(messages: &[Message], category: ModelCategory) -> usize {
    messages
        .iter()
        .map(|m| estimate_tokens(&m.content, category))
        .sum()
}

/// Character budget for a token allowance.
pub fn tokens_to_chars(tokens: usize) -> usize {
    tokens.saturating_mul(CONSERVATIVE_CHARS_PER_TOKEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn density_by_category() {
        let text = "x".repeat(1000);
        assert_eq!(estimate_tokens(&text, ModelCategory::Code), 300);
        assert_eq!(estimate_tokens(&text, ModelCategory::General), 250);
        assert_eq!(estimate_tokens(&text, ModelCategory::Chat), 250);
    }

    #[test]
    fn rounds_down() {
        assert_eq!(estimate_tokens("abc", ModelCategory::General), 0);
        assert_eq!(estimate_tokens("abcdefg", ModelCategory::Code), 2);
        assert_eq!(estimate_tokens("", ModelCategory::Code), 0);
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(estimate_tokens("ééééé", ModelCategory::General), 1);
    }

    #[test]
    fn messages_sum_their_contents() {
        let messages = vec![Message::system("a".repeat(400)), Message::user("b".repeat(400))];
        assert_eq!(estimate_message_tokens(&messages, ModelCategory::General), 200);
    }

    #[test]
    fn token_allowance_to_chars() {
        assert_eq!(tokens_to_chars(9830), 29_490);
        assert_eq!(tokens_to_chars(usize::MAX), usize::MAX);
    }
}
