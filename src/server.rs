//! HTTP 传输：WebSocket 对话 + 管理 REST
//!
//! - `GET  /ws?lang=&user_id=`：每个连接一个会话，收 `{"message": ".."}`，发 ServerEvent JSON
//! - `/admin/api/agents[/:name]`、`/admin/api/tools`、`/admin/api/rebuild`：需 Bearer 或 `?key=`
//! - `GET  /health`

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, Request, State,
    },
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::admin::{AdminService, CreateAgent, PatchAgent};
use crate::core::{AdminError, AppComponents, TurnError};
use crate::gateway::{messages, ChatService, ClientMessage, ServerEvent};

pub struct AppState {
    pub chat: Arc<ChatService>,
    pub admin: Arc<AdminService>,
    /// 为空时管理接口不鉴权
    pub admin_api_key: String,
}

impl AppState {
    pub fn from_components(components: &AppComponents) -> Self {
        Self {
            chat: components.chat.clone(),
            admin: components.admin.clone(),
            admin_api_key: components.config.server.admin_api_key.clone(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/agents", get(api_agents_list).post(api_agents_create))
        .route(
            "/agents/:name",
            get(api_agent_get)
                .patch(api_agent_update)
                .put(api_agent_update)
                .delete(api_agent_delete),
        )
        .route("/tools", get(api_tools_list))
        .route("/rebuild", post(api_rebuild))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin_key));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/ws", get(ws_handler))
        .nest("/admin/api", admin)
        .with_state(state)
}

/// 定期清理空闲会话
pub fn spawn_session_reaper(chat: Arc<ChatService>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            chat.cleanup_expired().await;
        }
    })
}

// ---------- 鉴权 ----------

#[derive(Debug, Default, Deserialize)]
struct KeyQuery {
    key: Option<String>,
}

async fn require_admin_key(
    State(state): State<Arc<AppState>>,
    Query(query): Query<KeyQuery>,
    headers: HeaderMap,
    req: Request,
    next: Next,
) -> Response {
    if state.admin_api_key.is_empty() {
        return next.run(req).await;
    }
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    let presented = bearer.or(query.key.as_deref());
    if presented == Some(state.admin_api_key.as_str()) {
        next.run(req).await
    } else {
        tracing::warn!("Rejected admin request to {}", req.uri().path());
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "missing or invalid admin key" })),
        )
            .into_response()
    }
}

// ---------- 管理 REST ----------

struct ApiError(AdminError);

impl From<AdminError> for ApiError {
    fn from(e: AdminError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            AdminError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AdminError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AdminError::Invalid(_) => (StatusCode::BAD_REQUEST, "invalid"),
            AdminError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store"),
            AdminError::Rebuild(_) => (StatusCode::UNPROCESSABLE_ENTITY, "rebuild"),
        };
        if status.is_server_error() {
            tracing::error!("Admin request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string(), "kind": kind }))).into_response()
    }
}

async fn api_agents_list(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.admin.list_agents().await)
}

async fn api_agent_get(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.admin.get_agent(&name).await?))
}

async fn api_agents_create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAgent>,
) -> Result<impl IntoResponse, ApiError> {
    let agent = state.admin.create_agent(req).await?;
    Ok((StatusCode::CREATED, Json(agent)))
}

async fn api_agent_update(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(patch): Json<PatchAgent>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.admin.update_agent(&name, patch).await?))
}

async fn api_agent_delete(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.admin.delete_override(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn api_tools_list(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.admin.list_tools())
}

async fn api_rebuild(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.admin.rebuild().await?))
}

// ---------- WebSocket 对话 ----------

#[derive(Debug, Default, Deserialize)]
struct WsQuery {
    lang: Option<String>,
    user_id: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

/// 一个连接 = 一个会话。读循环只负责收消息；回合在单独的任务里按顺序处理，
/// 断开时取消进行中的回合。
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, query: WsQuery) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!("Failed to serialize server event: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let chat = state.chat.clone();
    let (session_id, init_events) = chat.open_session(query.lang.as_deref(), query.user_id).await;
    chat.attach(&session_id).await;
    let lang = match init_events.first() {
        Some(ServerEvent::SessionInit { lang, .. }) => lang.clone(),
        _ => "en".to_string(),
    };
    for event in init_events {
        let _ = tx.send(event);
    }

    let cancel = CancellationToken::new();
    let (in_tx, mut in_rx) = mpsc::unbounded_channel::<String>();
    let turns = {
        let chat = chat.clone();
        let session_id = session_id.clone();
        let cancel = cancel.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(text) = in_rx.recv().await {
                match chat.handle_message(&session_id, &text, &cancel, &tx).await {
                    Ok(_) => {}
                    Err(TurnError::Cancelled { .. }) => break,
                    Err(e) => {
                        tracing::error!(session = %session_id, "Turn failed: {}", e);
                        let _ = tx.send(ServerEvent::error(messages::internal_error(&lang)));
                        break;
                    }
                }
            }
        })
    };

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(t)) => t,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(msg) => {
                if in_tx.send(msg.message).is_err() {
                    break;
                }
            }
            Err(e) => tracing::debug!("Ignoring malformed client frame: {}", e),
        }
    }

    tracing::info!(session = %session_id, "WebSocket disconnected");
    chat.close_session(&session_id, &cancel).await;
    drop(in_tx);
    let _ = turns.await;
    drop(tx);
    let _ = writer.await;
}
