use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use skybridge_broker::Forwarder;
use skybridge_core::{ClientId, EnvironmentName, Settings};

use crate::registry::ConnectionRegistry;
use crate::session;

/// Server configuration distilled from `Settings`.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: EnvironmentName,
    pub max_send_queue: usize,
}

impl ServerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            environment: settings.environment,
            max_send_queue: 256,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub forwarder: Arc<Forwarder>,
    pub environment: EnvironmentName,
    pub cancel: CancellationToken,
}

#[derive(Serialize)]
struct Greeting {
    message: String,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/ws/{client_id}", get(ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Bind and start serving. Returns a handle carrying the bound port;
/// shutdown is driven by the state's cancellation token.
pub async fn start(config: ServerConfig, state: AppState) -> Result<ServerHandle, std::io::Error> {
    let cancel = state.cancel.clone();
    let router = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(port = local_addr.port(), "Skybridge server started");

    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server,
    })
}

/// Handle returned by `start()`; keeps the serve task alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
}

async fn root_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(Greeting {
        message: format!("Hello World {}", state.environment),
    })
}

async fn health_handler() -> impl IntoResponse {
    Json("OK")
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        session::handle_session(
            socket,
            ClientId::new(client_id),
            state.registry,
            state.forwarder,
            state.cancel,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures::{SinkExt, StreamExt};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_util::sync::CancellationToken;

    use crate::consumer::Consumer;
    use crate::router::CommandRouter;
    use skybridge_broker::{BrokerClient, MockBroker, SubscriptionManager};
    use skybridge_core::Settings;

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

    struct TestApp {
        broker: Arc<MockBroker>,
        cancel: CancellationToken,
        port: u16,
        _handle: ServerHandle,
    }

    async fn spawn_app() -> TestApp {
        let settings = settings();
        let broker = Arc::new(MockBroker::new());
        let broker_dyn: Arc<dyn BrokerClient> = broker.clone();

        let mut manager = SubscriptionManager::new(Arc::clone(&broker_dyn), &settings);
        let subscription = manager.establish().await.unwrap();

        let registry = Arc::new(ConnectionRegistry::new(32));
        let forwarder = Arc::new(Forwarder::new(Arc::clone(&broker_dyn), TOPIC));
        let cancel = CancellationToken::new();

        let consumer = Consumer::new(
            Arc::clone(&broker_dyn),
            subscription.queue_url,
            CommandRouter::new(Arc::clone(&registry)),
        );
        tokio::spawn({
            let cancel = cancel.clone();
            async move { consumer.run(cancel).await }
        });

        let state = AppState {
            registry,
            forwarder,
            environment: settings.environment,
            cancel: cancel.clone(),
        };
        let handle = start(ServerConfig::from_settings(&settings), state).await.unwrap();

        TestApp {
            broker,
            cancel,
            port: handle.port,
            _handle: handle,
        }
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = spawn_app().await;
        let url = format!("http://127.0.0.1:{}/health", app.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: String = resp.json().await.unwrap();
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn root_endpoint_echoes_environment() {
        let app = spawn_app().await;
        let url = format!("http://127.0.0.1:{}/", app.port);
        let body: serde_json::Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
        assert_eq!(body["message"], "Hello World DEVELOPMENT");
    }

    #[tokio::test]
    async fn command_published_to_topic_reaches_session() {
        let app = spawn_app().await;
        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{}/ws/c1", app.port))
            .await
            .unwrap();

        // Give the upgrade handler time to register the session.
        tokio::time::sleep(Duration::from_millis(50)).await;

        app.broker
            .publish(TOPIC, r#"{"client_id":"c1","command":"ping","data":{}}"#)
            .await
            .unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let frame: serde_json::Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
        assert_eq!(frame["command"], "ping");
        assert_eq!(frame["data"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn session_message_is_forwarded_to_topic() {
        let app = spawn_app().await;
        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{}/ws/c1", app.port))
            .await
            .unwrap();

        ws.send(Message::Text(r#"{"action":"hello","payload":{"n":1}}"#.into()))
            .await
            .unwrap();

        let mut published = Vec::new();
        for _ in 0..50 {
            published = app.broker.published();
            if !published.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, TOPIC);
        let body: serde_json::Value = serde_json::from_str(&published[0].1).unwrap();
        assert_eq!(body["action"], "hello");
        assert_eq!(body["payload"]["n"], 1);
    }

    #[tokio::test]
    async fn duplicate_client_id_is_rejected() {
        let app = spawn_app().await;
        let (mut first, _) = connect_async(format!("ws://127.0.0.1:{}/ws/c1", app.port))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (mut second, _) = connect_async(format!("ws://127.0.0.1:{}/ws/c1", app.port))
            .await
            .unwrap();
        let msg = tokio::time::timeout(Duration::from_secs(2), second.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(
            matches!(&msg, Message::Close(Some(frame)) if frame.code == CloseCode::Policy),
            "expected policy close, got: {msg:?}"
        );

        // The original session is untouched.
        let _ = first.send(Message::Text(r#"{"action":"still-alive"}"#.into())).await;
    }

    #[tokio::test]
    async fn publish_failure_closes_the_session() {
        let app = spawn_app().await;
        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{}/ws/c1", app.port))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        app.broker.set_fail_publish(true);
        ws.send(Message::Text(r#"{"action":"doomed"}"#.into()))
            .await
            .unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(
            matches!(&msg, Message::Close(Some(frame)) if frame.code == CloseCode::Error),
            "expected error close, got: {msg:?}"
        );
    }

    #[tokio::test]
    async fn cancellation_closes_sessions() {
        let app = spawn_app().await;
        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{}/ws/c1", app.port))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        app.cancel.cancel();

        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(
            matches!(&msg, Message::Close(Some(frame)) if frame.code == CloseCode::Away),
            "expected away close, got: {msg:?}"
        );
    }

    #[tokio::test]
    async fn invalid_client_frame_is_ignored() {
        let app = spawn_app().await;
        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{}/ws/c1", app.port))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        ws.send(Message::Text("not json".into())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(app.broker.published().is_empty());

        // Session stays usable afterwards.
        ws.send(Message::Text(r#"{"action":"ok"}"#.into())).await.unwrap();
        let mut published = Vec::new();
        for _ in 0..50 {
            published = app.broker.published();
            if !published.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(published.len(), 1);
    }
}
