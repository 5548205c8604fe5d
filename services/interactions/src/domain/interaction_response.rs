/// Interaction responses returned in the HTTP body
///
/// Serialized in the platform's interaction-callback format.
use serde_json::json;

/// Callback type tags
pub mod callback_type {
    /// ACK for PING
    pub const PONG: u8 = 1;
    /// Reply with a message in the channel the command was invoked from
    pub const CHANNEL_MESSAGE_WITH_SOURCE: u8 = 4;
}

/// Message flag: only the invoking user sees the reply
pub const EPHEMERAL_FLAG: u64 = 1 << 6;

/// Internal diagnostic codes for ERROR responses
///
/// Logged server-side, never serialized into the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    UnknownCommand,
    UnsupportedInteraction,
    InvalidArgument,
    StoreTimeout,
    StoreUnavailable,
    StoreConflict,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UnknownCommand => "unknown_command",
            ErrorCode::UnsupportedInteraction => "unsupported_interaction",
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::StoreTimeout => "store_timeout",
            ErrorCode::StoreUnavailable => "store_unavailable",
            ErrorCode::StoreConflict => "store_conflict",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response to a verified interaction
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionResponse {
    /// {"type": 1}
    Pong,
    /// Visible reply
    Message { content: String },
    /// User-safe failure reply plus an internal code
    Error { message: String, code: ErrorCode },
}

impl InteractionResponse {
    /// Create MESSAGE response
    pub fn message(content: impl Into<String>) -> Self {
        InteractionResponse::Message {
            content: content.into(),
        }
    }

    /// Create ERROR response
    pub fn error(message: impl Into<String>, code: ErrorCode) -> Self {
        InteractionResponse::Error {
            message: message.into(),
            code,
        }
    }

    /// Create ERROR response for an unregistered command name
    pub fn unknown_command() -> Self {
        Self::error("Sorry, that command is not available.", ErrorCode::UnknownCommand)
    }

    /// Create ERROR response for an unsupported interaction type
    pub fn unsupported_interaction() -> Self {
        Self::error(
            "Sorry, this kind of interaction is not supported.",
            ErrorCode::UnsupportedInteraction,
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self, InteractionResponse::Error { .. })
    }

    /// Convert response to JSON string
    pub fn to_json(&self) -> String {
        match self {
            InteractionResponse::Pong => json!({ "type": callback_type::PONG }).to_string(),

            InteractionResponse::Message { content } => json!({
                "type": callback_type::CHANNEL_MESSAGE_WITH_SOURCE,
                "data": { "content": content }
            })
            .to_string(),

            InteractionResponse::Error { message, .. } => json!({
                "type": callback_type::CHANNEL_MESSAGE_WITH_SOURCE,
                "data": { "content": message, "flags": EPHEMERAL_FLAG }
            })
            .to_string(),
        }
    }
}
