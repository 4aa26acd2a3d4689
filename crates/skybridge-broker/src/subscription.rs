use std::sync::Arc;

use skybridge_core::Settings;
use uuid::Uuid;

use crate::client::BrokerClient;
use crate::error::BrokerError;

/// Identifiers for one live topic-to-queue wiring.
#[derive(Clone, Debug)]
pub struct Subscription {
    pub topic_arn: String,
    pub queue_url: String,
    pub queue_arn: String,
    pub subscription_arn: String,
}

/// Owns the lifecycle of the command queue's topic subscription for one
/// consumer run: `establish` wires it up, `teardown` releases it at most
/// once on whatever exit path runs first.
pub struct SubscriptionManager {
    broker: Arc<dyn BrokerClient>,
    topic_arn: String,
    queue_name: String,
    active: Option<Subscription>,
}

impl SubscriptionManager {
    pub fn new(broker: Arc<dyn BrokerClient>, settings: &Settings) -> Self {
        let queue_name = settings
            .sqs_command_queue_name
            .clone()
            .unwrap_or_else(|| format!("skybridge-commands-{}", Uuid::now_v7()));
        Self {
            broker,
            topic_arn: settings.sns_incoming_topic_arn.clone(),
            queue_name,
            active: None,
        }
    }

    /// Create the durable queue, resolve its ARN, and subscribe it to the
    /// topic. Any failing step aborts startup; the queue itself is left in
    /// place (it is durable and reusable by name).
    pub async fn establish(&mut self) -> Result<Subscription, BrokerError> {
        let queue_url = self.broker.create_queue(&self.queue_name).await?;
        let queue_arn = self.broker.queue_arn(&queue_url).await?;
        let subscription_arn = self.broker.subscribe(&self.topic_arn, &queue_arn).await?;

        let subscription = Subscription {
            topic_arn: self.topic_arn.clone(),
            queue_url,
            queue_arn,
            subscription_arn,
        };
        tracing::info!(
            queue_url = %subscription.queue_url,
            subscription_arn = %subscription.subscription_arn,
            "Command queue subscribed to topic"
        );
        self.active = Some(subscription.clone());
        Ok(subscription)
    }

    /// Unsubscribe the queue from the topic. Idempotent: the network call
    /// happens at most once, and calling with nothing active is a no-op.
    /// Failures are logged, never propagated.
    pub async fn teardown(&mut self) {
        let Some(subscription) = self.active.take() else {
            return;
        };
        match self.broker.unsubscribe(&subscription.subscription_arn).await {
            Ok(()) => {
                tracing::info!(
                    subscription_arn = %subscription.subscription_arn,
                    "Unsubscribed command queue from topic"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    subscription_arn = %subscription.subscription_arn,
                    "Unsubscribe failed during teardown"
                );
            }
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn subscription(&self) -> Option<&Subscription> {
        self.active.as_ref()
    }
}
