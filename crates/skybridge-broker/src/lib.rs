pub mod aws;
pub mod client;
pub mod error;
pub mod forwarder;
pub mod subscription;

pub mod mock;

pub use aws::AwsBroker;
pub use client::{BrokerClient, QueueMessage};
pub use error::BrokerError;
pub use forwarder::Forwarder;
pub use mock::MockBroker;
pub use subscription::{Subscription, SubscriptionManager};
