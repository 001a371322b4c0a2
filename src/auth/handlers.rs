use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, RefreshRequest, RegisterRequest},
        services::{authenticate, register_user, AuthUser, JwtKeys},
    },
    error::{AppError, AppResult},
    state::AppState,
    users::dto::UserView,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let user = register_user(&state, payload).await?;
    let keys = JwtKeys::from_ref(&state);
    let (access_token, refresh_token) = keys.issue_pair(&user)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            access_token,
            refresh_token,
            user: user.into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let user = authenticate(&state, payload).await?;
    let keys = JwtKeys::from_ref(&state);
    let (access_token, refresh_token) = keys.issue_pair(&user)?;

    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: user.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| AppError::Unauthorized(e.to_string()))?;

    // Role is re-read so a changed account is reflected in the new pair.
    let Some(user) = state.users.get(claims.sub).await? else {
        warn!(user_id = %claims.sub, "refresh for unknown user");
        return Err(AppError::Unauthorized("User not found".into()));
    };

    let (access_token, refresh_token) = keys.issue_pair(&user)?;
    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: user.into(),
    }))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    caller: AuthUser,
) -> AppResult<Json<UserView>> {
    let user = state.users.get(caller.id).await?.ok_or_else(|| {
        warn!(user_id = %caller.id, "token subject no longer exists");
        AppError::Unauthorized("User not found".into())
    })?;
    Ok(Json(user.into()))
}

#[cfg(test)]
mod me_tests {
    use super::*;
    use crate::users::repo_types::{Profile, Role};

    #[test]
    fn test_me_response_serialization() {
        let response = UserView {
            id: uuid::Uuid::new_v4(),
            name: "Test".into(),
            email: "test@example.com".to_string(),
            role: Role::Patient,
            profile: Profile::default(),
            created_at: time::OffsetDateTime::now_utc(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(json.contains("\"role\":\"patient\""));
        assert!(!json.contains("password"));
    }
}
