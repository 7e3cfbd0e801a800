use crate::net::messages::ServerEvent;

/// Maximum accepted event frame size in bytes.
pub const MAX_EVENT_SIZE: usize = 64 * 1024; // 64 KiB

#[derive(Debug)]
pub enum ProtocolError {
    EmptyEvent,
    EventTooLarge(usize),
    SerializeError(String),
    DeserializeError(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyEvent => write!(f, "empty event"),
            Self::EventTooLarge(size) => {
                write!(f, "event too large: {size} bytes (max {MAX_EVENT_SIZE})")
            },
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
            Self::DeserializeError(e) => write!(f, "deserialize error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Decode a JSON event frame into a `ServerEvent`.
pub fn decode_server_event(text: &str) -> Result<ServerEvent, ProtocolError> {
    if text.is_empty() {
        return Err(ProtocolError::EmptyEvent);
    }
    if text.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::EventTooLarge(text.len()));
    }
    serde_json::from_str(text).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}

/// Encode a `ServerEvent` to its JSON wire form.
pub fn encode_server_event(event: &ServerEvent) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(|e| ProtocolError::SerializeError(e.to_string()))
}
