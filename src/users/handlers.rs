use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::services::AuthUser,
    error::AppResult,
    state::AppState,
    users::{
        dto::{UpdateUserRequest, UserView},
        services,
    },
};

pub fn users_routes() -> Router<AppState> {
    Router::new()
        .route("/users/doctors", get(list_doctors))
        .route("/users/:id", get(get_user).put(update_user))
}

#[instrument(skip(state))]
pub async fn list_doctors(State(state): State<AppState>) -> AppResult<Json<Vec<UserView>>> {
    let doctors = services::list_doctors(&state).await?;
    Ok(Json(doctors.into_iter().map(UserView::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserView>> {
    let user = services::require_user(&state, id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<UserView>> {
    let user = services::update_user(&state, caller, id, payload).await?;
    Ok(Json(user.into()))
}
