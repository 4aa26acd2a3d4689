/// Typed errors for broker operations. `Setup` failures abort startup;
/// `Receive` failures are fatal for a consumer run; `Publish` failures are
/// returned to the session layer; `Teardown` and `Acknowledge` failures are
/// logged by their callers and never propagate further.
#[derive(Clone, Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("subscription setup failed at {stage}: {message}")]
    Setup { stage: &'static str, message: String },
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("receive failed: {0}")]
    Receive(String),
    #[error("acknowledge failed: {0}")]
    Acknowledge(String),
    #[error("teardown failed: {0}")]
    Teardown(String),
}

impl BrokerError {
    pub fn setup(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Setup {
            stage,
            message: message.into(),
        }
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Setup { .. } => "setup",
            Self::Publish(_) => "publish",
            Self::Receive(_) => "receive",
            Self::Acknowledge(_) => "acknowledge",
            Self::Teardown(_) => "teardown",
        }
    }
}
