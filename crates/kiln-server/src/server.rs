//! Development server implementation.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Component, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use kiln_pipeline::{Pipeline, PipelineConfig, Task};
use tokio::sync::{broadcast, mpsc, Mutex};
use tower_http::services::ServeDir;

use crate::watcher::{FileWatcher, TaskRoutes, WatchEvent};
use crate::websocket::{client_script, ReloadHub, ReloadMessage, CLIENT_PATH, WS_PATH};

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid address {0}: {1}")]
    Address(String, String),

    #[error("Failed to bind to {0}: {1}")]
    Bind(SocketAddr, String),

    #[error("File watch error: {0}")]
    Watch(String),
}

/// Shared server state.
struct ServerState {
    hub: ReloadHub,
}

/// Development server: static output, live reload and rebuild-on-change.
pub struct DevServer {
    pipeline: Pipeline,
    hub: ReloadHub,
}

impl DevServer {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            hub: ReloadHub::new(),
        }
    }

    /// Watch, serve, and block until the server stops.
    pub async fn start(self) -> Result<(), ServerError> {
        let config = Arc::clone(self.pipeline.config());
        let server = &config.server;

        let addr: SocketAddr = format!("{}:{}", server.host, server.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| {
                ServerError::Address(format!("{}:{}", server.host, server.port), e.to_string())
            })?;

        let routes = TaskRoutes::from_config(&config).map_err(|e| ServerError::Watch(e.to_string()))?;
        let (watcher, rx) = FileWatcher::new(
            &routes.watch_roots(),
            routes,
            Duration::from_millis(server.debounce_ms),
        )
        .map_err(|e| ServerError::Watch(e.to_string()))?;

        let pipeline = self.pipeline.clone();
        let hub = self.hub.clone();
        tokio::spawn(async move {
            watch_loop(pipeline, hub, rx).await;
            // Keep watcher alive
            drop(watcher);
        });

        let app = router(config.path(&config.dest), self.hub.clone());

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(addr, e.to_string()))?;

        let url = format!("http://{}", addr);
        tracing::info!("Serving {} at {}", config.dest.display(), url);

        if server.open {
            if let Err(e) = open::that(&url) {
                tracing::warn!("Could not open browser: {}", e);
            }
        }

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Bind(addr, e.to_string()))?;

        Ok(())
    }
}

/// Routes: live reload endpoints, then the output directory for everything
/// else. HTML responses get the client script.
fn router(dest: PathBuf, hub: ReloadHub) -> Router {
    let state = Arc::new(ServerState { hub });

    Router::new()
        .route(WS_PATH, get(ws_handler))
        .route(CLIENT_PATH, get(client_handler))
        .fallback_service(ServeDir::new(dest))
        .layer(middleware::map_response(inject_client))
        .with_state(state)
}

/// Rerun tasks as batches arrive.
///
/// Reruns of one task are serialized; different tasks rebuild concurrently.
async fn watch_loop(pipeline: Pipeline, hub: ReloadHub, mut rx: mpsc::Receiver<WatchEvent>) {
    let locks: HashMap<Task, Arc<Mutex<()>>> = Task::ALL
        .iter()
        .map(|task| (*task, Arc::new(Mutex::new(()))))
        .collect();

    while let Some(event) = rx.recv().await {
        let Some(lock) = locks.get(&event.task).map(Arc::clone) else {
            continue;
        };
        let pipeline = pipeline.clone();
        let hub = hub.clone();

        tokio::spawn(async move {
            let _guard = lock.lock().await;
            rebuild(&pipeline, &hub, &event).await;
        });
    }
}

/// Rerun the task for one batch and notify browsers.
///
/// Returns the message that was broadcast.
pub async fn rebuild(pipeline: &Pipeline, hub: &ReloadHub, event: &WatchEvent) -> ReloadMessage {
    for path in &event.paths {
        tracing::info!("Changed: {}", path.display());
    }

    let message = match pipeline.run_task(event.task).await {
        Ok(_) => match event.task {
            Task::Styles => stylesheet_href(pipeline.config())
                .map(|href| ReloadMessage::Css { href })
                .unwrap_or(ReloadMessage::Reload),
            _ => ReloadMessage::Reload,
        },
        Err(e) => {
            tracing::error!("{} failed: {}", event.task, e);
            ReloadMessage::BuildError {
                task: event.task.to_string(),
                message: e.to_string(),
            }
        }
    };

    hub.send(message.clone());
    message
}

/// Site-absolute URL of the compiled stylesheet.
fn stylesheet_href(config: &PipelineConfig) -> Option<String> {
    let stem = config.styles.src.file_stem()?.to_string_lossy().into_owned();
    let segments: Vec<String> = config
        .styles
        .dest
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .chain([format!("{stem}.css")])
        .collect();
    Some(format!("/{}", segments.join("/")))
}

/// Insert the client script tag before `</body>`, or append it.
pub fn inject_script(html: &str) -> String {
    let tag = format!(r#"<script src="{CLIENT_PATH}"></script>"#);

    match html.to_ascii_lowercase().rfind("</body>") {
        Some(index) => format!("{}{}{}", &html[..index], tag, &html[index..]),
        None => format!("{html}{tag}"),
    }
}

async fn inject_client(response: Response) -> Response {
    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));

    if !is_html || response.status() != StatusCode::OK {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to read response body: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    let html = inject_script(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

/// Handler for the live reload WebSocket endpoint.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Forward hub messages to one browser.
async fn handle_ws(mut socket: WebSocket, state: Arc<ServerState>) {
    let mut rx = state.hub.subscribe();

    if send_json(&mut socket, &ReloadMessage::Connected).await.is_err() {
        return;
    }

    loop {
        match rx.recv().await {
            Ok(msg) => {
                if send_json(&mut socket, &msg).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Client lagged by {} messages", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn send_json(socket: &mut WebSocket, msg: &ReloadMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}

/// Handler for the client script.
async fn client_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        client_script(),
    )
}
