use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use skybridge_broker::{BrokerClient, BrokerError};
use skybridge_core::Notification;

use crate::router::CommandRouter;

/// Bounded long-poll wait per receive call.
const POLL_WAIT: Duration = Duration::from_secs(20);
/// Bounded batch size per receive call.
const MAX_BATCH: i32 = 10;

/// Long-polls the command queue and routes each decoded command to its
/// session. Owns acknowledgment: every delivery is deleted exactly once,
/// in receipt order, whatever its processing outcome.
pub struct Consumer {
    broker: Arc<dyn BrokerClient>,
    queue_url: String,
    router: CommandRouter,
}

impl Consumer {
    pub fn new(broker: Arc<dyn BrokerClient>, queue_url: impl Into<String>, router: CommandRouter) -> Self {
        Self {
            broker,
            queue_url: queue_url.into(),
            router,
        }
    }

    /// Run until the token is cancelled or the broker fails. The token is
    /// only observed between batches; an in-flight batch always finishes
    /// acknowledgment before the loop exits. A receive transport error is
    /// fatal for the run and propagates after the loop stops.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), BrokerError> {
        tracing::info!(queue_url = %self.queue_url, "Consumer started");
        loop {
            let batch = tokio::select! {
                // Never start another poll once cancellation is observed.
                biased;
                _ = cancel.cancelled() => break,
                result = self.broker.receive(&self.queue_url, MAX_BATCH, POLL_WAIT) => result?,
            };

            for message in batch {
                match Notification::decode(&message.body) {
                    Ok(command) => self.router.dispatch(command),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            layer = e.error_kind(),
                            "Discarding message that failed to decode"
                        );
                    }
                }
                // Acknowledge regardless of outcome; malformed payloads are
                // permanently dropped rather than redelivered.
                if let Err(e) = self.broker.delete(&self.queue_url, &message.receipt_handle).await {
                    tracing::warn!(error = %e, "Failed to acknowledge message");
                }
            }
        }
        tracing::info!(queue_url = %self.queue_url, "Consumer stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionRegistry;
    use skybridge_broker::{MockBroker, SubscriptionManager};
    use skybridge_core::{ClientId, Settings};

    const TOPIC: &str = "arn:mock:sns:::incoming";

    fn settings() -> Settings {
        Settings {
            environment: Default::default(),
            sns_incoming_topic_arn: TOPIC.into(),
            sqs_command_queue_name: Some("commands".into()),
            aws_region: "eu-west-1".into(),
            aws_endpoint_url: None,
            host: "127.0.0.1".into(),
            port: 0,
            log_level: "info".into(),
        }
    }

    struct Fixture {
        broker: Arc<MockBroker>,
        registry: Arc<ConnectionRegistry>,
        queue_url: String,
        manager: SubscriptionManager,
    }

    async fn fixture() -> Fixture {
        let broker = Arc::new(MockBroker::new());
        let mut manager = SubscriptionManager::new(broker.clone(), &settings());
        let subscription = manager.establish().await.unwrap();
        Fixture {
            broker,
            registry: Arc::new(ConnectionRegistry::new(32)),
            queue_url: subscription.queue_url,
            manager,
        }
    }

    fn consumer(fx: &Fixture) -> Consumer {
        Consumer::new(
            fx.broker.clone(),
            fx.queue_url.clone(),
            CommandRouter::new(Arc::clone(&fx.registry)),
        )
    }

    #[tokio::test]
    async fn delivers_command_to_registered_session() {
        let fx = fixture().await;
        let mut rx = fx.registry.register(ClientId::new("c1")).unwrap();

        fx.broker
            .publish(TOPIC, r#"{"client_id":"c1","command":"ping","data":{}}"#)
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let consumer = consumer(&fx);
        let run = tokio::spawn({
            let cancel = cancel.clone();
            async move { consumer.run(cancel).await }
        });

        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.command, "ping");
        assert!(frame.data.is_empty());

        // Delivery is acknowledged: nothing left waiting or in flight.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fx.broker.queue_depth(&fx.queue_url), 0);
        assert_eq!(fx.broker.in_flight_len(&fx.queue_url), 0);

        cancel.cancel();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unknown_target_is_still_acknowledged() {
        let fx = fixture().await;
        let mut rx = fx.registry.register(ClientId::new("c1")).unwrap();

        fx.broker
            .publish(TOPIC, r#"{"client_id":"ghost","command":"ping","data":{}}"#)
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let consumer = consumer(&fx);
        let run = tokio::spawn({
            let cancel = cancel.clone();
            async move { consumer.run(cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fx.broker.queue_depth(&fx.queue_url), 0);
        assert_eq!(fx.broker.in_flight_len(&fx.queue_url), 0);
        assert!(rx.try_recv().is_err());

        cancel.cancel();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn malformed_body_is_discarded_and_acknowledged() {
        let fx = fixture().await;

        fx.broker.publish(TOPIC, "not a command at all").await.unwrap();

        let cancel = CancellationToken::new();
        let consumer = consumer(&fx);
        let run = tokio::spawn({
            let cancel = cancel.clone();
            async move { consumer.run(cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fx.broker.queue_depth(&fx.queue_url), 0);
        assert_eq!(fx.broker.in_flight_len(&fx.queue_url), 0);

        cancel.cancel();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancellation_exits_cleanly_and_teardown_runs_once() {
        let mut fx = fixture().await;

        let cancel = CancellationToken::new();
        let consumer = consumer(&fx);
        let run = tokio::spawn({
            let cancel = cancel.clone();
            async move { consumer.run(cancel).await }
        });

        // Let the consumer settle into its long-poll wait, then cancel.
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        run.await.unwrap().unwrap();

        fx.manager.teardown().await;
        assert_eq!(fx.broker.unsubscribe_calls(), 1);
    }

    #[tokio::test]
    async fn receive_failure_is_fatal() {
        let fx = fixture().await;
        fx.broker.set_fail_receive(true);

        let consumer = consumer(&fx);
        let err = consumer.run(CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.error_kind(), "receive");
    }

    #[tokio::test]
    async fn batch_is_drained_in_receipt_order() {
        let fx = fixture().await;
        let mut rx = fx.registry.register(ClientId::new("c1")).unwrap();

        for i in 0..3 {
            fx.broker
                .publish(
                    TOPIC,
                    &format!(r#"{{"client_id":"c1","command":"step-{i}","data":{{}}}}"#),
                )
                .await
                .unwrap();
        }

        let cancel = CancellationToken::new();
        let consumer = consumer(&fx);
        let run = tokio::spawn({
            let cancel = cancel.clone();
            async move { consumer.run(cancel).await }
        });

        for i in 0..3 {
            let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(frame.command, format!("step-{i}"));
        }

        cancel.cancel();
        run.await.unwrap().unwrap();
    }
}
