#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::any,
};
use prost::Message as ProstMessage;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tsdb::{
    ClientConnection, StoreRegistry,
    config::ServerConfig,
    protocol::{ClientRequest, ServerResponse, Status},
};

#[derive(Clone)]
struct AppState {
    /// Stores opened on demand by name.
    registry: Arc<StoreRegistry>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tsdb=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Loaded configuration: database_directory={}, listen_port={}",
        config.database_directory.display(),
        config.listen_port
    );

    if let Err(e) = std::fs::create_dir_all(&config.database_directory) {
        tracing::error!("Failed to create data directory: {e}");
        std::process::exit(1);
    }

    let state = AppState {
        registry: Arc::new(StoreRegistry::new(config.database_directory.clone())),
    };

    let app = Router::new()
        .route("/ws", any(ws_handler))
        .with_state(state);

    // Connect to the websocket on ws://127.0.0.1:<port>/ws
    let addr = SocketAddr::from(([127, 0, 0, 1], config.listen_port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind: {e}");
            std::process::exit(1);
        });

    axum::serve(listener, app).await.unwrap_or_else(|e| {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    });
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    tracing::debug!("got a websocket connection");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let connection = ClientConnection::new(state.registry);

    loop {
        let msg = match socket.recv().await {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                tracing::warn!("websocket receive error: {e}");
                return;
            }
            None => {
                tracing::debug!("client disconnected");
                return;
            }
        };

        // Only binary frames carry requests
        let data = match msg {
            Message::Binary(data) => data,
            Message::Text(text) => {
                tracing::debug!("received text message (ignoring): {text}");
                continue;
            }
            Message::Ping(data) => {
                if socket.send(Message::Pong(data)).await.is_err() {
                    return;
                }
                continue;
            }
            Message::Pong(_) => continue,
            Message::Close(_) => {
                tracing::debug!("client sent close");
                return;
            }
        };

        let request = match ClientRequest::decode(data.as_ref()) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("failed to decode ClientRequest: {e}");
                let response = ServerResponse::with_status(
                    None,
                    Status::InvalidRequest,
                    format!("Failed to decode message: {e}"),
                );
                if send_response(&mut socket, &response).await.is_err() {
                    return;
                }
                continue;
            }
        };

        tracing::debug!("received ClientRequest with request_id: {:?}", request.request_id);

        let response = connection.handle_message(request).await;
        if send_response(&mut socket, &response).await.is_err() {
            tracing::debug!("client disconnected");
            return;
        }
    }
}

async fn send_response(socket: &mut WebSocket, response: &ServerResponse) -> Result<(), ()> {
    let bytes = response.encode_to_vec();
    socket
        .send(Message::Binary(bytes.into()))
        .await
        .map_err(|_| ())
}
