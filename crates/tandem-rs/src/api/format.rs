//! Provider-specific message shaping.

use crate::capability::ModelCapabilities;
use crate::{Message, MessageRole};

/// Prefix given to a system turn folded into a user turn.
pub const FOLDED_SYSTEM_PREFIX: &str = "System: ";

/// Reshape `messages` for the target provider.
///
/// When the model's server does not honor a separate system role, every
/// system turn becomes a user turn whose content starts with `System: `.
/// Order and all other turns are unchanged. With system-role support this
/// is the identity.
pub fn format_for_transport(messages: &[Message], caps: &ModelCapabilities) -> Vec<Message> {
    if caps.supports_system_role() {
        return messages.to_vec();
    }
    messages
        .iter()
        .map(|m| match m.role {
            MessageRole::System => Message {
                role: MessageRole::User,
                content: format!("{FOLDED_SYSTEM_PREFIX}{}", m.content),
                created_at: m.created_at,
            },
            _ => m.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ModelCategory;

    fn conversation() -> Vec<Message> {
        vec![
            Message::system("You are terse."),
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("bye"),
        ]
    }

    fn pairs(messages: &[Message]) -> Vec<(MessageRole, &str)> {
        messages.iter().map(|m| (m.role, m.content.as_str())).collect()
    }

    #[test]
    fn identity_when_system_role_supported() {
        let caps = ModelCapabilities::new(8192, ModelCategory::General).with_system_role(true);
        let input = conversation();
        let output = format_for_transport(&input, &caps);
        assert_eq!(pairs(&output), pairs(&input));
    }

    #[test]
    fn folds_system_into_user_turn() {
        let caps = ModelCapabilities::new(8192, ModelCategory::General).with_system_role(false);
        let output = format_for_transport(&conversation(), &caps);
        assert_eq!(
            pairs(&output),
            vec![
                (MessageRole::User, "System: You are terse."),
                (MessageRole::User, "hi"),
                (MessageRole::Assistant, "hello"),
                (MessageRole::User, "bye"),
            ]
        );
    }

    #[test]
    fn empty_input_stays_empty() {
        let caps = ModelCapabilities::new(4096, ModelCategory::Chat).with_system_role(false);
        assert!(format_for_transport(&[], &caps).is_empty());
    }
}
