/// Decode failure for messages pulled off the queue. The two variants
/// identify which layer of the nested format failed to parse.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid delivery envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("invalid command payload: {0}")]
    Command(#[source] serde_json::Error),
}

impl DecodeError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Envelope(_) => "envelope",
            Self::Command(_) => "command",
        }
    }
}
