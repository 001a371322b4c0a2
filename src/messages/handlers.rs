use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::services::AuthUser,
    error::AppResult,
    messages::{
        dto::{Conversation, MarkReadResponse, SendMessageRequest},
        repo_types::Message,
        services,
    },
    state::AppState,
};

pub fn messages_routes() -> Router<AppState> {
    Router::new()
        .route("/messages", post(send_message))
        .route("/messages/conversations", get(list_conversations))
        .route("/messages/conversations/:partner_id", get(get_conversation))
        .route("/messages/conversation/:partner_id", get(list_thread))
        .route("/messages/read/:partner_id", put(mark_read))
}

#[instrument(skip(state, body))]
pub async fn send_message(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(body): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<Message>)> {
    let msg = services::send(&state, caller.id, body.recipient, &body.content).await?;
    Ok((StatusCode::CREATED, Json(msg)))
}

#[instrument(skip(state))]
pub async fn list_conversations(
    State(state): State<AppState>,
    caller: AuthUser,
) -> AppResult<Json<Vec<Conversation>>> {
    Ok(Json(services::list_conversations(&state, caller.id).await?))
}

/// Single conversation; a shell when the two users have not talked yet.
#[instrument(skip(state))]
pub async fn get_conversation(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(partner_id): Path<Uuid>,
) -> AppResult<Json<Conversation>> {
    Ok(Json(
        services::conversation_with(&state, caller.id, partner_id).await?,
    ))
}

#[instrument(skip(state))]
pub async fn list_thread(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(partner_id): Path<Uuid>,
) -> AppResult<Json<Vec<Message>>> {
    Ok(Json(
        services::list_conversation(&state, caller.id, partner_id).await?,
    ))
}

#[instrument(skip(state))]
pub async fn mark_read(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(partner_id): Path<Uuid>,
) -> AppResult<Json<MarkReadResponse>> {
    let updated = services::mark_read(&state, caller.id, partner_id).await?;
    Ok(Json(MarkReadResponse { updated }))
}
