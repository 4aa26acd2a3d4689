use std::sync::Arc;

use skybridge_core::ClientMessage;

use crate::client::BrokerClient;
use crate::error::BrokerError;

/// Publishes messages originating from live sessions to the broker topic.
/// Performs no retry; the session layer owns the failure.
pub struct Forwarder {
    broker: Arc<dyn BrokerClient>,
    topic_arn: String,
}

impl Forwarder {
    pub fn new(broker: Arc<dyn BrokerClient>, topic_arn: impl Into<String>) -> Self {
        Self {
            broker,
            topic_arn: topic_arn.into(),
        }
    }

    pub async fn forward(&self, message: &ClientMessage) -> Result<(), BrokerError> {
        let body = message
            .encode()
            .map_err(|e| BrokerError::Publish(format!("encode failed: {e}")))?;
        self.broker.publish(&self.topic_arn, &body).await?;
        tracing::debug!(action = %message.action, "Forwarded client message to topic");
        Ok(())
    }
}
