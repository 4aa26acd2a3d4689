use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use skybridge_broker::{AwsBroker, BrokerClient, Forwarder, SubscriptionManager};
use skybridge_core::Settings;
use skybridge_server::{AppState, CommandRouter, ConnectionRegistry, Consumer, ServerConfig};

#[derive(Parser)]
#[command(name = "skybridge", about = "Bridge between a cloud pub/sub broker and live WebSocket sessions")]
struct Cli {
    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the bridge server (the default).
    Serve,
    /// Publish a raw payload to the incoming topic.
    Send { payload: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::load().context("failed to load settings")?;
    init_tracing(&settings);

    let cli = Cli::parse();
    match cli.command.unwrap_or(Cmd::Serve) {
        Cmd::Serve => serve(settings).await,
        Cmd::Send { payload } => send(settings, payload).await,
    }
}

fn init_tracing(settings: &Settings) {
    // Keep the AWS SDK and HTTP plumbing out of the default output.
    let default_filter = format!(
        "{},aws_config=warn,aws_smithy_runtime=warn,hyper_util=warn",
        settings.log_level
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&default_filter)),
        )
        .init();
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    tracing::info!(environment = %settings.environment, "Starting skybridge");

    let broker: Arc<dyn BrokerClient> = Arc::new(AwsBroker::from_settings(&settings).await);

    let mut subscriptions = SubscriptionManager::new(Arc::clone(&broker), &settings);
    let subscription = match subscriptions.establish().await {
        Ok(subscription) => subscription,
        Err(e) => {
            // Release whatever partial wiring happened before the failure.
            subscriptions.teardown().await;
            return Err(e).context("failed to establish command queue subscription");
        }
    };

    let config = ServerConfig::from_settings(&settings);
    let registry = Arc::new(ConnectionRegistry::new(config.max_send_queue));
    let forwarder = Arc::new(Forwarder::new(
        Arc::clone(&broker),
        settings.sns_incoming_topic_arn.clone(),
    ));
    let cancel = CancellationToken::new();

    let consumer = Consumer::new(
        Arc::clone(&broker),
        subscription.queue_url,
        CommandRouter::new(Arc::clone(&registry)),
    );
    let mut consumer_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { consumer.run(cancel).await }
    });

    let state = AppState {
        registry,
        forwarder,
        environment: settings.environment,
        cancel: cancel.clone(),
    };
    let server = skybridge_server::start(config, state)
        .await
        .context("failed to bind server")?;
    tracing::info!(port = server.port, "Skybridge ready");

    // Either the operator stops us, or the consumer dies on a transport
    // failure; both paths cancel, drain, and tear the subscription down.
    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => tracing::info!("Shutdown signal received"),
                Err(e) => tracing::warn!(error = %e, "Shutdown signal listener failed"),
            }
            cancel.cancel();
            consumer_task.await
        }
        result = &mut consumer_task => {
            cancel.cancel();
            result
        }
    };
    subscriptions.teardown().await;

    match outcome {
        Ok(Ok(())) => {
            tracing::info!("Shutdown complete");
            Ok(())
        }
        Ok(Err(e)) => Err(e).context("consumer failed"),
        Err(e) => Err(e).context("consumer task panicked"),
    }
}

async fn send(settings: Settings, payload: String) -> anyhow::Result<()> {
    tracing::info!(payload = %payload, "Publishing payload to incoming topic");
    let broker = AwsBroker::from_settings(&settings).await;
    broker
        .publish(&settings.sns_incoming_topic_arn, &payload)
        .await
        .context("publish failed")?;
    tracing::info!("Published successfully");
    Ok(())
}
