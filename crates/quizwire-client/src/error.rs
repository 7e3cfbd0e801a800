/// Errors surfaced by the client.
#[derive(Debug)]
pub enum ClientError {
    /// Bad local input. Rejected before any network call is made.
    Validation(String),
    /// Transport-level failure on a one-shot call. Never auto-retried;
    /// retrying is a user action.
    Network(String),
    /// Non-success HTTP response, body carried as diagnostic text.
    Http { status: u16, body: String },
    /// Malformed or unrecognized payload.
    Protocol(String),
    /// The session task is no longer running.
    Closed,
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(m) => write!(f, "validation error: {m}"),
            Self::Network(m) => write!(f, "network error: {m}"),
            Self::Http { status, body } => write!(f, "http error {status}: {body}"),
            Self::Protocol(m) => write!(f, "protocol error: {m}"),
            Self::Closed => write!(f, "session is closed"),
        }
    }
}

impl std::error::Error for ClientError {}

impl ClientError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
