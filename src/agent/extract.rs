//! Reading the agent's reply out of a thread message

use super::types::{MessageRole, ThreadMessage};
use serde_json::Value;
use thiserror::Error;

/// Shown when the thread holds no assistant reply
pub const NO_RESPONSE: &str = "No response received.";

/// Substituted when a reply exists but its text cannot be read
pub const UNPARSEABLE_RESPONSE: &str = "Could not parse response.";

/// A content block claimed to carry text but did not
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("text content block has no string value: {0}")]
    MissingTextValue(String),
}

/// Extract the reply text from the most recent thread message.
///
/// Returns `Ok(None)` when there is nothing to show (no message, not from the
/// assistant, or no content). A text block yields its `text.value`; any other
/// block is rendered as its raw JSON.
pub fn extract_reply(latest: Option<&ThreadMessage>) -> Result<Option<String>, ParseError> {
    let Some(message) = latest else {
        return Ok(None);
    };
    if message.role != MessageRole::Assistant {
        return Ok(None);
    }
    let Some(block) = message.content.first() else {
        return Ok(None);
    };

    match block.get("text") {
        Some(text) => match text.get("value").and_then(Value::as_str) {
            Some(value) => Ok(Some(value.to_string())),
            None => Err(ParseError::MissingTextValue(text.to_string())),
        },
        None => Ok(Some(block.to_string())),
    }
}

/// [`extract_reply`] with the user-facing fallbacks applied
pub fn reply_or_placeholder(latest: Option<&ThreadMessage>) -> String {
    match extract_reply(latest) {
        Ok(Some(text)) => text,
        Ok(None) => NO_RESPONSE.to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse agent response");
            UNPARSEABLE_RESPONSE.to_string()
        }
    }
}
