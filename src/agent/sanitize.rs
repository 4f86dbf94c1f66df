//! Response sanitization applied before persistence.

use std::collections::HashSet;

use crate::types::{ContentPart, ModelMessage, Role};

/// Drop orphaned tool calls, orphaned tool results and empty text.
///
/// A tool result is kept only when an earlier assistant message in `messages`
/// issued its call. A tool call is kept only when a kept result answers it.
/// Assistant and tool messages left without parts are removed; other roles
/// pass through.
pub fn sanitize_response_messages(messages: &[ModelMessage]) -> Vec<ModelMessage> {
    let mut issued: HashSet<&str> = HashSet::new();
    let mut answered: HashSet<&str> = HashSet::new();
    for message in messages {
        match message.role {
            Role::Assistant => {
                issued.extend(message.tool_calls().into_iter().map(|c| c.id.as_str()))
            }
            Role::Tool => answered.extend(
                message
                    .tool_results()
                    .into_iter()
                    .map(|r| r.tool_call_id.as_str())
                    .filter(|id| issued.contains(id)),
            ),
            _ => {}
        }
    }

    messages
        .iter()
        .filter_map(|message| {
            if !matches!(message.role, Role::Assistant | Role::Tool) {
                return Some(message.clone());
            }
            let content: Vec<ContentPart> = message
                .content
                .iter()
                .filter(|part| match part {
                    ContentPart::ToolCall(call) => answered.contains(call.id.as_str()),
                    ContentPart::ToolResult(result) => {
                        answered.contains(result.tool_call_id.as_str())
                    }
                    ContentPart::Text { text } => !text.is_empty(),
                })
                .cloned()
                .collect();
            (!content.is_empty()).then(|| ModelMessage {
                content,
                ..message.clone()
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentToolCall;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn call(id: &str) -> ContentPart {
        ContentPart::ToolCall(AgentToolCall {
            id: id.into(),
            name: "weather".into(),
            arguments: json!({"city": "Paris"}),
        })
    }

    fn batch() -> Vec<ModelMessage> {
        vec![
            ModelMessage::assistant_parts(vec![ContentPart::text(""), call("t0"), call("t1")]),
            ModelMessage::tool_result("t0", "weather", json!("sunny"), false),
            ModelMessage::assistant_parts(vec![call("t2")]),
            ModelMessage::assistant("It is sunny."),
        ]
    }

    #[test]
    fn drops_orphaned_calls_and_empty_messages() {
        let sanitized = sanitize_response_messages(&batch());

        assert_eq!(sanitized.len(), 3);
        let ids: Vec<&str> = sanitized
            .iter()
            .flat_map(|m| m.tool_calls())
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, vec!["t0"]);
        assert_eq!(sanitized[0].content.len(), 1);
        assert_eq!(sanitized[2].text(), "It is sunny.");
    }

    #[test]
    fn is_idempotent() {
        let once = sanitize_response_messages(&batch());
        let twice = sanitize_response_messages(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn user_messages_pass_through_untouched() {
        let messages = vec![ModelMessage::user(""), ModelMessage::system("rules")];
        assert_eq!(sanitize_response_messages(&messages), messages);
    }

    #[test]
    fn drops_tool_results_without_an_earlier_call() {
        let messages = vec![
            ModelMessage::assistant("Here you go."),
            ModelMessage::tool_result("t1", "weather", json!("sunny"), false),
            ModelMessage::assistant_parts(vec![call("t2")]),
            ModelMessage::tool_result("t2", "weather", json!("rainy"), false),
        ];
        let sanitized = sanitize_response_messages(&messages);

        let roles: Vec<Role> = sanitized.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::Assistant, Role::Tool]);
        assert_eq!(sanitized[2].tool_results()[0].tool_call_id, "t2");
    }

    #[test]
    fn result_before_its_call_drops_both() {
        let messages = vec![
            ModelMessage::tool_result("t0", "weather", json!("sunny"), false),
            ModelMessage::assistant_parts(vec![ContentPart::text("done"), call("t0")]),
        ];
        let sanitized = sanitize_response_messages(&messages);

        assert_eq!(sanitized.len(), 1);
        assert!(sanitized[0].tool_calls().is_empty());
        assert_eq!(sanitized[0].text(), "done");
    }
}
