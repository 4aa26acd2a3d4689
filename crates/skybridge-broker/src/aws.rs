use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::QueueAttributeName;
use skybridge_core::Settings;

use crate::client::{BrokerClient, QueueMessage};
use crate::error::BrokerError;

/// Real SNS/SQS-backed broker client. Region and the optional custom
/// endpoint (for local emulators) come from `Settings`.
pub struct AwsBroker {
    sqs: aws_sdk_sqs::Client,
    sns: aws_sdk_sns::Client,
}

impl AwsBroker {
    pub async fn from_settings(settings: &Settings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.aws_region.clone()));
        if let Some(endpoint) = &settings.aws_endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;
        Self {
            sqs: aws_sdk_sqs::Client::new(&shared),
            sns: aws_sdk_sns::Client::new(&shared),
        }
    }
}

fn sdk_err<E: std::error::Error>(e: E) -> String {
    format!("{}", DisplayErrorContext(e))
}

#[async_trait]
impl BrokerClient for AwsBroker {
    async fn create_queue(&self, name: &str) -> Result<String, BrokerError> {
        let resp = self
            .sqs
            .create_queue()
            .queue_name(name)
            .send()
            .await
            .map_err(|e| BrokerError::setup("create_queue", sdk_err(e)))?;
        resp.queue_url()
            .map(str::to_owned)
            .ok_or_else(|| BrokerError::setup("create_queue", "response carried no queue URL"))
    }

    async fn queue_arn(&self, queue_url: &str) -> Result<String, BrokerError> {
        let resp = self
            .sqs
            .get_queue_attributes()
            .queue_url(queue_url)
            .attribute_names(QueueAttributeName::QueueArn)
            .send()
            .await
            .map_err(|e| BrokerError::setup("queue_arn", sdk_err(e)))?;
        resp.attributes()
            .and_then(|attrs| attrs.get(&QueueAttributeName::QueueArn))
            .map(String::to_owned)
            .ok_or_else(|| BrokerError::setup("queue_arn", "QueueArn attribute missing"))
    }

    async fn subscribe(&self, topic_arn: &str, queue_arn: &str) -> Result<String, BrokerError> {
        let resp = self
            .sns
            .subscribe()
            .topic_arn(topic_arn)
            .protocol("sqs")
            .endpoint(queue_arn)
            .return_subscription_arn(true)
            .send()
            .await
            .map_err(|e| BrokerError::setup("subscribe", sdk_err(e)))?;
        resp.subscription_arn()
            .map(str::to_owned)
            .ok_or_else(|| BrokerError::setup("subscribe", "response carried no subscription ARN"))
    }

    async fn unsubscribe(&self, subscription_arn: &str) -> Result<(), BrokerError> {
        self.sns
            .unsubscribe()
            .subscription_arn(subscription_arn)
            .send()
            .await
            .map_err(|e| BrokerError::Teardown(sdk_err(e)))?;
        Ok(())
    }

    async fn receive(
        &self,
        queue_url: &str,
        max_messages: i32,
        wait: Duration,
    ) -> Result<Vec<QueueMessage>, BrokerError> {
        let resp = self
            .sqs
            .receive_message()
            .queue_url(queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait.as_secs() as i32)
            .send()
            .await
            .map_err(|e| BrokerError::Receive(sdk_err(e)))?;
        let messages = resp
            .messages()
            .iter()
            .filter_map(|m| {
                Some(QueueMessage {
                    body: m.body()?.to_owned(),
                    receipt_handle: m.receipt_handle()?.to_owned(),
                })
            })
            .collect();
        Ok(messages)
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), BrokerError> {
        self.sqs
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| BrokerError::Acknowledge(sdk_err(e)))?;
        Ok(())
    }

    async fn publish(&self, topic_arn: &str, body: &str) -> Result<(), BrokerError> {
        self.sns
            .publish()
            .topic_arn(topic_arn)
            .message(body)
            .send()
            .await
            .map_err(|e| BrokerError::Publish(sdk_err(e)))?;
        Ok(())
    }
}
