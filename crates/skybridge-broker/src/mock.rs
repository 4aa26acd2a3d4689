use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::client::{BrokerClient, QueueMessage};
use crate::error::BrokerError;

/// In-memory broker for deterministic testing without a cloud dependency.
///
/// Behaves like the real thing at the trait boundary: published bodies are
/// wrapped in a delivery envelope (with extra wrapper fields, as the topic
/// delivery path adds them), `receive` long-polls until a message arrives
/// or the wait elapses, and a delivered message stays in flight until
/// `delete` acknowledges it.
pub struct MockBroker {
    state: Mutex<State>,
    notify: Notify,
    fail_receive: AtomicBool,
    fail_publish: AtomicBool,
    fail_subscribe: AtomicBool,
    unsubscribe_calls: AtomicUsize,
}

#[derive(Default)]
struct State {
    /// Queues keyed by URL.
    queues: HashMap<String, Queue>,
    /// Topic ARN to subscribed queue URLs.
    topics: HashMap<String, Vec<String>>,
    /// Subscription ARN to (topic ARN, queue URL).
    subscriptions: HashMap<String, (String, String)>,
    /// Every publish in order, pre-envelope.
    published: Vec<(String, String)>,
}

struct Queue {
    arn: String,
    available: VecDeque<String>,
    in_flight: HashMap<String, String>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            fail_receive: AtomicBool::new(false),
            fail_publish: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            unsubscribe_calls: AtomicUsize::new(0),
        }
    }

    /// Make the next and all following `receive` calls fail.
    pub fn set_fail_receive(&self, fail: bool) {
        self.fail_receive.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::Relaxed);
    }

    /// How many times `unsubscribe` was invoked, successful or not.
    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::Relaxed)
    }

    /// Raw bodies published so far, in order, before envelope wrapping.
    pub fn published(&self) -> Vec<(String, String)> {
        self.state.lock().published.clone()
    }

    /// Messages waiting in a queue (excludes in-flight deliveries).
    pub fn queue_depth(&self, queue_url: &str) -> usize {
        self.state
            .lock()
            .queues
            .get(queue_url)
            .map(|q| q.available.len())
            .unwrap_or(0)
    }

    /// Deliveries handed out by `receive` and not yet acknowledged.
    pub fn in_flight_len(&self, queue_url: &str) -> usize {
        self.state
            .lock()
            .queues
            .get(queue_url)
            .map(|q| q.in_flight.len())
            .unwrap_or(0)
    }
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerClient for MockBroker {
    async fn create_queue(&self, name: &str) -> Result<String, BrokerError> {
        let url = format!("mock://sqs/{name}");
        let mut state = self.state.lock();
        state.queues.entry(url.clone()).or_insert_with(|| Queue {
            arn: format!("arn:mock:sqs:::{name}"),
            available: VecDeque::new(),
            in_flight: HashMap::new(),
        });
        Ok(url)
    }

    async fn queue_arn(&self, queue_url: &str) -> Result<String, BrokerError> {
        self.state
            .lock()
            .queues
            .get(queue_url)
            .map(|q| q.arn.clone())
            .ok_or_else(|| BrokerError::setup("queue_arn", format!("unknown queue: {queue_url}")))
    }

    async fn subscribe(&self, topic_arn: &str, queue_arn: &str) -> Result<String, BrokerError> {
        if self.fail_subscribe.load(Ordering::Relaxed) {
            return Err(BrokerError::setup("subscribe", "injected subscribe failure"));
        }
        let mut state = self.state.lock();
        let queue_url = state
            .queues
            .iter()
            .find(|(_, q)| q.arn == queue_arn)
            .map(|(url, _)| url.clone())
            .ok_or_else(|| BrokerError::setup("subscribe", format!("unknown queue arn: {queue_arn}")))?;

        let subscription_arn = format!("{topic_arn}:{}", Uuid::now_v7());
        state
            .topics
            .entry(topic_arn.to_owned())
            .or_default()
            .push(queue_url.clone());
        state
            .subscriptions
            .insert(subscription_arn.clone(), (topic_arn.to_owned(), queue_url));
        Ok(subscription_arn)
    }

    async fn unsubscribe(&self, subscription_arn: &str) -> Result<(), BrokerError> {
        self.unsubscribe_calls.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();
        let (topic_arn, queue_url) = state
            .subscriptions
            .remove(subscription_arn)
            .ok_or_else(|| {
                BrokerError::Teardown(format!("unknown subscription arn: {subscription_arn}"))
            })?;
        if let Some(urls) = state.topics.get_mut(&topic_arn) {
            urls.retain(|url| *url != queue_url);
        }
        Ok(())
    }

    async fn receive(
        &self,
        queue_url: &str,
        max_messages: i32,
        wait: Duration,
    ) -> Result<Vec<QueueMessage>, BrokerError> {
        if self.fail_receive.load(Ordering::Relaxed) {
            return Err(BrokerError::Receive("injected receive failure".into()));
        }
        let deadline = tokio::time::Instant::now() + wait;
        let max = max_messages.max(0) as usize;
        loop {
            {
                let mut state = self.state.lock();
                let queue = state
                    .queues
                    .get_mut(queue_url)
                    .ok_or_else(|| BrokerError::Receive(format!("unknown queue: {queue_url}")))?;
                if !queue.available.is_empty() {
                    let mut batch = Vec::new();
                    while batch.len() < max {
                        match queue.available.pop_front() {
                            Some(body) => {
                                let receipt_handle = format!("rcpt-{}", Uuid::now_v7());
                                queue.in_flight.insert(receipt_handle.clone(), body.clone());
                                batch.push(QueueMessage {
                                    body,
                                    receipt_handle,
                                });
                            }
                            None => break,
                        }
                    }
                    return Ok(batch);
                }
            }
            let notified = self.notify.notified();
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), BrokerError> {
        let mut state = self.state.lock();
        let queue = state
            .queues
            .get_mut(queue_url)
            .ok_or_else(|| BrokerError::Acknowledge(format!("unknown queue: {queue_url}")))?;
        // Deleting an already-acknowledged handle is fine, as on the real broker.
        queue.in_flight.remove(receipt_handle);
        Ok(())
    }

    async fn publish(&self, topic_arn: &str, body: &str) -> Result<(), BrokerError> {
        if self.fail_publish.load(Ordering::Relaxed) {
            return Err(BrokerError::Publish("injected publish failure".into()));
        }
        let envelope = serde_json::json!({
            "Type": "Notification",
            "MessageId": Uuid::now_v7().to_string(),
            "TopicArn": topic_arn,
            "Message": body,
        })
        .to_string();

        {
            let mut state = self.state.lock();
            state.published.push((topic_arn.to_owned(), body.to_owned()));
            let urls = state.topics.get(topic_arn).cloned().unwrap_or_default();
            for url in urls {
                if let Some(queue) = state.queues.get_mut(&url) {
                    queue.available.push_back(envelope.clone());
                }
            }
        }
        self.notify.notify_one();
        Ok(())
    }
}
