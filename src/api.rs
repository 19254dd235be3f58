use crate::config::Config;
use crate::error::ChatError;
use crate::events::{self, Event};
use crate::model::{Conversation, ConversationKind, Match, Message, MessageKind, Presence, Profile};
use crate::presence::PresenceTracker;
use crate::{conversations, db, likes, matches, messages, profiles};
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool<SqliteConnectionManager>,
    pub presence: Arc<PresenceTracker>,
    pub event_tx: broadcast::Sender<String>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        if let Some(dir) = config.db_path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let pool = db::init_pool(&config.db_path)?;
        let (event_tx, _rx) = broadcast::channel(100);
        Ok(Self {
            pool,
            presence: Arc::new(PresenceTracker::new()),
            event_tx,
            config,
        })
    }
}

/// Build the HTTP application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/profiles", post(upsert_profile))
        .route("/api/like", post(like))
        .route("/api/unlike", post(unlike))
        .route("/api/match/:user_a/:user_b", get(get_match))
        .route("/api/conversations", get(list_conversations))
        .route("/api/conversations/inquiry", post(create_inquiry))
        .route("/api/conversations/:id", get(get_conversation))
        .route(
            "/api/conversations/pair/:kind/:user_a/:user_b",
            get(get_conversation_by_pair),
        )
        .route("/api/messages", post(post_message).get(get_messages))
        .route("/api/messages/read", post(mark_read))
        .route("/api/heartbeat", post(heartbeat))
        .route("/api/presence/:user_id", get(get_presence))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct ErrorResp {
    error: String,
    message: String,
}

type ApiError = (StatusCode, Json<ErrorResp>);

fn reject(err: ChatError) -> ApiError {
    let status = match &err {
        ChatError::Validation(_) => StatusCode::BAD_REQUEST,
        ChatError::NotFound(_) => StatusCode::NOT_FOUND,
        ChatError::Forbidden(_) => StatusCode::FORBIDDEN,
        ChatError::MatchInactive | ChatError::Conflict => StatusCode::CONFLICT,
        ChatError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (
        status,
        Json(ErrorResp {
            error: err.code().into(),
            message: err.to_string(),
        }),
    )
}

fn conn(state: &AppState) -> Result<PooledConnection<SqliteConnectionManager>, ApiError> {
    state.pool.get().map_err(|e| reject(ChatError::from(e)))
}

async fn upsert_profile(
    State(state): State<AppState>,
    Json(profile): Json<Profile>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = conn(&state)?;
    profiles::upsert(&conn, &profile).map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct PairReq {
    from: Uuid,
    to: Uuid,
}

#[derive(Serialize)]
struct LikeResp {
    created: bool,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    match_record: Option<Match>,
}

async fn like(
    State(state): State<AppState>,
    Json(req): Json<PairReq>,
) -> Result<impl IntoResponse, ApiError> {
    let mut conn = conn(&state)?;
    let out = likes::like(&mut conn, req.from, req.to).map_err(reject)?;
    if let Some(change) = &out.match_change {
        if change.changed {
            events::emit(
                &state.event_tx,
                &Event::MatchStatusChanged {
                    record: change.record.clone(),
                },
            );
        }
    }
    Ok(Json(LikeResp {
        created: out.created,
        match_record: out.match_change.map(|c| c.record),
    }))
}

#[derive(Serialize)]
struct UnlikeResp {
    removed: bool,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    match_record: Option<Match>,
}

async fn unlike(
    State(state): State<AppState>,
    Json(req): Json<PairReq>,
) -> Result<impl IntoResponse, ApiError> {
    let mut conn = conn(&state)?;
    let out = likes::unlike(&mut conn, req.from, req.to).map_err(reject)?;
    if let Some(change) = &out.match_change {
        if change.changed {
            events::emit(
                &state.event_tx,
                &Event::MatchStatusChanged {
                    record: change.record.clone(),
                },
            );
        }
    }
    Ok(Json(UnlikeResp {
        removed: out.removed,
        match_record: out.match_change.map(|c| c.record),
    }))
}

async fn get_match(
    State(state): State<AppState>,
    Path((user_a, user_b)): Path<(Uuid, Uuid)>,
) -> Result<Json<Match>, ApiError> {
    let conn = conn(&state)?;
    let m = matches::get_by_pair(&conn, user_a, user_b)
        .map_err(reject)?
        .ok_or_else(|| reject(ChatError::NotFound("match")))?;
    Ok(Json(m))
}

#[derive(Deserialize)]
struct InquiryReq {
    user_a: Uuid,
    user_b: Uuid,
}

async fn create_inquiry(
    State(state): State<AppState>,
    Json(req): Json<InquiryReq>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = conn(&state)?;
    let conv =
        conversations::get_or_create_inquiry(&conn, req.user_a, req.user_b).map_err(reject)?;
    Ok((StatusCode::CREATED, Json(conv)))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = conn(&state)?;
    let conv = conversations::require(&conn, id).map_err(reject)?;
    Ok(Json(conv))
}

/// Lookup by kind and unordered pair; the deterministic id makes this a
/// point read.
async fn get_conversation_by_pair(
    State(state): State<AppState>,
    Path((kind, user_a, user_b)): Path<(ConversationKind, Uuid, Uuid)>,
) -> Result<Json<Conversation>, ApiError> {
    let conn = conn(&state)?;
    let id = conversations::conversation_id(kind, user_a, user_b);
    let conv = conversations::require(&conn, id).map_err(reject)?;
    Ok(Json(conv))
}

#[derive(Deserialize)]
struct ListConversationsQuery {
    user_id: Uuid,
}

#[derive(Serialize)]
struct ConversationSummary {
    #[serde(flatten)]
    conversation: crate::model::Conversation,
    other_participant: Option<Uuid>,
    unread: i64,
}

async fn list_conversations(
    State(state): State<AppState>,
    Query(q): Query<ListConversationsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = conn(&state)?;
    let convs = conversations::list_for_user(&conn, q.user_id).map_err(reject)?;
    let mut out = Vec::with_capacity(convs.len());
    for conv in convs {
        let unread = messages::unread_count(&conn, &conv, q.user_id).map_err(reject)?;
        out.push(ConversationSummary {
            other_participant: conversations::other_participant(&conv, q.user_id),
            conversation: conv,
            unread,
        });
    }
    Ok(Json(out))
}

#[derive(Deserialize)]
struct SendReq {
    conversation_id: Uuid,
    sender_id: Uuid,
    body: String,
    #[serde(default)]
    kind: Option<MessageKind>,
}

async fn post_message(
    State(state): State<AppState>,
    Json(req): Json<SendReq>,
) -> Result<impl IntoResponse, ApiError> {
    let mut conn = conn(&state)?;
    let msg = messages::send(
        &mut conn,
        req.conversation_id,
        req.sender_id,
        &req.body,
        req.kind.unwrap_or(MessageKind::Text),
    )
    .map_err(reject)?;
    events::emit(
        &state.event_tx,
        &Event::MessageAppended {
            conversation_id: msg.conversation_id,
            message: msg.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(msg)))
}

#[derive(Deserialize)]
struct ListMessagesQuery {
    conversation_id: Uuid,
    after: Option<i64>,
    limit: Option<usize>,
}

async fn get_messages(
    State(state): State<AppState>,
    Query(q): Query<ListMessagesQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let conn = conn(&state)?;
    let msgs = messages::list(&conn, q.conversation_id, q.after, q.limit.unwrap_or(50))
        .map_err(reject)?;
    Ok(Json(msgs))
}

#[derive(Deserialize)]
struct MarkReadReq {
    conversation_id: Uuid,
    reader_id: Uuid,
    through_seq: i64,
}

async fn mark_read(
    State(state): State<AppState>,
    Json(req): Json<MarkReadReq>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = conn(&state)?;
    messages::mark_read(&conn, req.conversation_id, req.reader_id, req.through_seq)
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct HeartbeatReq {
    user_id: Uuid,
    /// Optional client timestamp, defaults to server time.
    at: Option<i64>,
}

#[derive(Serialize)]
struct HeartbeatResp {
    accepted: bool,
}

async fn heartbeat(
    State(state): State<AppState>,
    Json(req): Json<HeartbeatReq>,
) -> Json<HeartbeatResp> {
    let at = req
        .at
        .unwrap_or_else(|| OffsetDateTime::now_utc().unix_timestamp());
    let accepted = state.presence.heartbeat(req.user_id, at);
    Json(HeartbeatResp { accepted })
}

async fn get_presence(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Json<Presence> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    Json(
        state
            .presence
            .get(user_id, now, state.config.online_threshold_secs),
    )
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(stream: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = stream.split();
    let mut rx = BroadcastStream::new(state.event_tx.subscribe());
    loop {
        tokio::select! {
            event = rx.next() => match event {
                Some(Ok(payload)) => {
                    if sender.send(WsMessage::Text(payload)).await.is_err() {
                        break;
                    }
                }
                // a lagging subscriber drops events, never blocks senders
                Some(Err(_)) => {}
                None => break,
            },
            msg = receiver.next() => match msg {
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }
}

/// Run the HTTP server with the resolved configuration.
pub async fn run_http_server(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = config.bind.parse()?;
    let state = AppState::new(config)?;
    tracing::info!(%addr, "community chat listening");
    axum::Server::bind(&addr)
        .serve(build_router(state).into_make_service())
        .await?;
    Ok(())
}

// Integration tests live in tests/ directory
