use std::time::Duration;

use async_trait::async_trait;

use crate::error::BrokerError;

/// One message pulled off a queue. The receipt handle is what `delete`
/// needs to acknowledge this particular delivery.
#[derive(Clone, Debug)]
pub struct QueueMessage {
    pub body: String,
    pub receipt_handle: String,
}

/// Boundary to the cloud pub/sub broker: topic publication plus durable
/// queues with long-poll receive and per-message deletion.
///
/// Implementations are constructed explicitly and shared as
/// `Arc<dyn BrokerClient>` so every component that talks to the broker can
/// be handed a test double instead.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Create (or re-resolve) a durable queue, returning its URL.
    async fn create_queue(&self, name: &str) -> Result<String, BrokerError>;

    /// Resolve a queue URL to its ARN.
    async fn queue_arn(&self, queue_url: &str) -> Result<String, BrokerError>;

    /// Subscribe a queue to a topic, returning the subscription ARN.
    async fn subscribe(&self, topic_arn: &str, queue_arn: &str) -> Result<String, BrokerError>;

    /// Remove a subscription created by `subscribe`.
    async fn unsubscribe(&self, subscription_arn: &str) -> Result<(), BrokerError>;

    /// Long-poll receive: waits up to `wait` for messages, returning at
    /// most `max_messages`. An empty vec means the wait elapsed.
    async fn receive(
        &self,
        queue_url: &str,
        max_messages: i32,
        wait: Duration,
    ) -> Result<Vec<QueueMessage>, BrokerError>;

    /// Acknowledge one delivery so the broker stops redelivering it.
    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), BrokerError>;

    /// Publish a body to a topic, fanning out to subscribed queues.
    async fn publish(&self, topic_arn: &str, body: &str) -> Result<(), BrokerError>;
}
