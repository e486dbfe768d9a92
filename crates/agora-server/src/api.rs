use std::sync::{Arc, Mutex};

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        FromRequestParts, Path, Query, State,
    },
    http::{request::Parts, HeaderMap, Method, StatusCode},
    response::Response,
    routing::{delete, get, patch, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use agora_feed::{PushChannel, PushHub};
use agora_shared::{FeedEvent, FeedScope, Member, MemberId, Message, MessageId, Page};
use agora_store::{
    Channel, ChannelId, ChannelKind, Conversation, Database, Mutation, NewAttachment, Profile,
    ProfileId, Role, Server, ServerId, StoreError,
};

use crate::config::ServerConfig;
use crate::error::ServerError;

/// Header naming the member a request acts as. Authentication happens
/// upstream; this server trusts the value.
pub const MEMBER_HEADER: &str = "x-member-id";

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub hub: Arc<PushHub>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(db: Database, config: ServerConfig) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            hub: Arc::new(PushHub::new()),
            config: Arc::new(config),
        }
    }

    fn with_db<T>(
        &self,
        f: impl FnOnce(&Database) -> Result<T, ServerError>,
    ) -> Result<T, ServerError> {
        let db = self
            .db
            .lock()
            .map_err(|_| ServerError::Internal("database lock poisoned".into()))?;
        f(&db)
    }

    /// Announce a message write to live subscribers of its scope.
    fn announce(&self, event: FeedEvent) {
        self.hub.publish(&event);
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/profiles", post(create_profile))
        .route("/servers", post(create_server))
        .route("/servers/{id}/members", get(list_members).post(join_server))
        .route("/servers/{id}/channels", get(list_channels).post(create_channel))
        .route("/channels/{id}", delete(delete_channel))
        .route("/members/{id}/role", patch(set_member_role))
        .route("/conversations", post(open_conversation))
        .route(
            "/scopes/{kind}/{id}/messages",
            get(list_messages).post(post_message),
        )
        .route("/scopes/{kind}/{id}/events", get(scope_events))
        .route("/messages/{id}", patch(edit_message).delete(delete_message))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ─── Acting member ───

/// The member named by the [`MEMBER_HEADER`] header.
pub struct ActingMember(pub MemberId);

impl<S: Send + Sync> FromRequestParts<S> for ActingMember {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(MEMBER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| ActingMember(MemberId::from(v)))
            .ok_or_else(|| ServerError::Unauthorized(format!("missing {MEMBER_HEADER} header")))
    }
}

fn load_member(db: &Database, id: &MemberId) -> Result<Member, ServerError> {
    db.get_member(id).map_err(|e| match e {
        StoreError::NotFound => ServerError::Unauthorized(format!("unknown member {id}")),
        other => other.into(),
    })
}

fn same_server(member: &Member, server_id: &ServerId) -> Result<(), ServerError> {
    if &member.server_id == server_id {
        Ok(())
    } else {
        Err(ServerError::Forbidden(format!(
            "member {} does not belong to server {server_id}",
            member.id
        )))
    }
}

// ─── Health ───

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ─── Profiles, servers, members ───

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateProfileRequest {
    name: String,
    image_url: Option<String>,
}

async fn create_profile(
    State(state): State<AppState>,
    Json(req): Json<CreateProfileRequest>,
) -> Result<(StatusCode, Json<Profile>), ServerError> {
    let profile =
        state.with_db(|db| Ok(db.create_profile(&req.name, req.image_url.as_deref())?))?;
    Ok((StatusCode::CREATED, Json(profile)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateServerRequest {
    profile_id: ProfileId,
    name: String,
    image_url: Option<String>,
}

#[derive(Serialize)]
struct ServerCreatedResponse {
    server: Server,
    /// The owner's ADMIN membership.
    member: Member,
    /// The reserved `general` channel.
    channel: Channel,
}

async fn create_server(
    State(state): State<AppState>,
    Json(req): Json<CreateServerRequest>,
) -> Result<(StatusCode, Json<ServerCreatedResponse>), ServerError> {
    let (server, member, channel) = state.with_db(|db| {
        Ok(db.create_server(&req.profile_id, &req.name, req.image_url.as_deref())?)
    })?;
    info!(server_id = %server.id, owner = %req.profile_id, "Server created");
    Ok((
        StatusCode::CREATED,
        Json(ServerCreatedResponse {
            server,
            member,
            channel,
        }),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinServerRequest {
    profile_id: ProfileId,
    invite_code: String,
}

async fn join_server(
    State(state): State<AppState>,
    Path(server_id): Path<ServerId>,
    Json(req): Json<JoinServerRequest>,
) -> Result<(StatusCode, Json<Member>), ServerError> {
    let member = state.with_db(|db| {
        let server = db.get_server_by_invite(&req.invite_code).map_err(|e| match e {
            StoreError::NotFound => ServerError::Forbidden("invalid invite code".into()),
            other => other.into(),
        })?;
        if server.id != server_id {
            return Err(ServerError::Forbidden("invalid invite code".into()));
        }
        Ok(db.join_server(&req.invite_code, &req.profile_id)?)
    })?;
    Ok((StatusCode::CREATED, Json(member)))
}

async fn list_members(
    State(state): State<AppState>,
    ActingMember(me): ActingMember,
    Path(server_id): Path<ServerId>,
) -> Result<Json<Vec<Member>>, ServerError> {
    let members = state.with_db(|db| {
        same_server(&load_member(db, &me)?, &server_id)?;
        Ok(db.list_members(&server_id)?)
    })?;
    Ok(Json(members))
}

#[derive(Deserialize)]
struct SetRoleRequest {
    role: Role,
}

async fn set_member_role(
    State(state): State<AppState>,
    ActingMember(me): ActingMember,
    Path(target): Path<MemberId>,
    Json(req): Json<SetRoleRequest>,
) -> Result<Json<Member>, ServerError> {
    let member = state.with_db(|db| {
        let actor = load_member(db, &me)?;
        Ok(db.set_member_role(&actor, &target, req.role)?)
    })?;
    info!(member_id = %member.id, role = %member.role, "Member role changed");
    Ok(Json(member))
}

// ─── Channels and conversations ───

#[derive(Deserialize)]
struct CreateChannelRequest {
    name: String,
    #[serde(default)]
    kind: ChannelKind,
}

async fn list_channels(
    State(state): State<AppState>,
    ActingMember(me): ActingMember,
    Path(server_id): Path<ServerId>,
) -> Result<Json<Vec<Channel>>, ServerError> {
    let channels = state.with_db(|db| {
        same_server(&load_member(db, &me)?, &server_id)?;
        Ok(db.list_channels_for_server(&server_id)?)
    })?;
    Ok(Json(channels))
}

async fn create_channel(
    State(state): State<AppState>,
    ActingMember(me): ActingMember,
    Path(server_id): Path<ServerId>,
    Json(req): Json<CreateChannelRequest>,
) -> Result<(StatusCode, Json<Channel>), ServerError> {
    let channel = state.with_db(|db| {
        let actor = load_member(db, &me)?;
        same_server(&actor, &server_id)?;
        Ok(db.create_channel(&actor, &req.name, req.kind)?)
    })?;
    Ok((StatusCode::CREATED, Json(channel)))
}

async fn delete_channel(
    State(state): State<AppState>,
    ActingMember(me): ActingMember,
    Path(channel_id): Path<ChannelId>,
) -> Result<StatusCode, ServerError> {
    state.with_db(|db| {
        let actor = load_member(db, &me)?;
        Ok(db.delete_channel(&actor, &channel_id)?)
    })?;
    info!(channel_id = %channel_id, "Channel deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenConversationRequest {
    member_id: MemberId,
}

async fn open_conversation(
    State(state): State<AppState>,
    ActingMember(me): ActingMember,
    Json(req): Json<OpenConversationRequest>,
) -> Result<Json<Conversation>, ServerError> {
    let conversation = state.with_db(|db| {
        let actor = load_member(db, &me)?;
        Ok(db.get_or_create_conversation(&actor.id, &req.member_id)?)
    })?;
    Ok(Json(conversation))
}

// ─── Messages ───

#[derive(Deserialize)]
struct HistoryQuery {
    cursor: Option<String>,
    limit: Option<u32>,
}

async fn list_messages(
    State(state): State<AppState>,
    ActingMember(me): ActingMember,
    Path((kind, id)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Page>, ServerError> {
    let scope = FeedScope::parse(&kind, &id)?;
    let limit = state.config.page_limit(query.limit);
    let before = query
        .cursor
        .filter(|c| !c.is_empty())
        .map(MessageId::from);

    let page = state.with_db(|db| {
        let member = load_member(db, &me)?;
        db.check_access(&scope, &member)?;
        Ok(db.list_messages(&scope, before.as_ref(), limit)?)
    })?;
    Ok(Json(page))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostMessageRequest {
    #[serde(default)]
    content: String,
    file_url: Option<String>,
    file_type: Option<String>,
}

async fn post_message(
    State(state): State<AppState>,
    ActingMember(me): ActingMember,
    Path((kind, id)): Path<(String, String)>,
    Json(req): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ServerError> {
    let scope = FeedScope::parse(&kind, &id)?;
    let attachment = match (req.file_url, req.file_type) {
        (Some(file_url), Some(file_type)) => Some(NewAttachment {
            file_url,
            file_type,
        }),
        (None, None) => None,
        _ => {
            return Err(ServerError::BadRequest(
                "fileUrl and fileType must be given together".into(),
            ))
        }
    };

    let message = state.with_db(|db| {
        let author = load_member(db, &me)?;
        Ok(db.create_message(&author, &scope, &req.content, attachment)?)
    })?;

    state.announce(FeedEvent::MessageCreated(message.clone()));
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Deserialize)]
struct EditMessageRequest {
    content: String,
}

async fn edit_message(
    State(state): State<AppState>,
    ActingMember(me): ActingMember,
    Path(id): Path<MessageId>,
    Json(req): Json<EditMessageRequest>,
) -> Result<Json<Message>, ServerError> {
    let mutation = state.with_db(|db| {
        let actor = load_member(db, &me)?;
        Ok(db.update_message(&actor, &id, &req.content)?)
    })?;
    Ok(Json(publish_mutation(&state, mutation, FeedEvent::MessageUpdated)))
}

async fn delete_message(
    State(state): State<AppState>,
    ActingMember(me): ActingMember,
    Path(id): Path<MessageId>,
) -> Result<Json<Message>, ServerError> {
    let mutation = state.with_db(|db| {
        let actor = load_member(db, &me)?;
        Ok(db.soft_delete_message(&actor, &id)?)
    })?;
    Ok(Json(publish_mutation(&state, mutation, FeedEvent::MessageDeleted)))
}

/// Writes that found a tombstone changed nothing, so nothing is announced.
fn publish_mutation(
    state: &AppState,
    mutation: Mutation,
    event: fn(Message) -> FeedEvent,
) -> Message {
    if !mutation.is_applied() {
        debug!(msg_id = %mutation.message().id, "write on deleted message, nothing to announce");
        return mutation.into_message();
    }
    let message = mutation.into_message();
    state.announce(event(message.clone()));
    message
}

// ─── Live events ───

/// Browsers cannot set headers on a WebSocket handshake, so the events
/// route also takes the acting member as `?member=`.
#[derive(Deserialize)]
struct EventsQuery {
    member: Option<String>,
}

async fn scope_events(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    Query(query): Query<EventsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ServerError> {
    let scope = FeedScope::parse(&kind, &id)?;
    let member = headers
        .get(MEMBER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(query.member);
    authorize_events(&state, &scope, member.as_deref())?;
    let hub = state.hub.clone();
    Ok(ws.on_upgrade(move |socket| stream_events(socket, hub, scope)))
}

/// Subscribing to a scope takes the same access as reading its history.
fn authorize_events(
    state: &AppState,
    scope: &FeedScope,
    member: Option<&str>,
) -> Result<(), ServerError> {
    let member = member
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(MemberId::from)
        .ok_or_else(|| ServerError::Unauthorized("missing acting member".into()))?;
    state.with_db(|db| {
        let member = load_member(db, &member)?;
        Ok(db.check_access(scope, &member)?)
    })
}

/// Forward every event for `scope` to the socket until either side hangs up.
async fn stream_events(socket: WebSocket, hub: Arc<PushHub>, scope: FeedScope) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let token = hub.subscribe(&scope, tx);
    let (mut sender, mut receiver) = socket.split();
    debug!(%scope, "Event stream opened");

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                let json = match event.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode event");
                        continue;
                    }
                };
                if sender.send(WsMessage::Text(json.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    // Subscribers only listen.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    hub.unsubscribe(token);
    debug!(%scope, "Event stream closed");
}
