use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::services::AuthUser,
    error::{AppError, AppResult},
    state::AppState,
    users::{
        dto::UpdateUserRequest,
        repo_types::{Role, User},
    },
};

/// Resolves a user or fails with `NotFound`.
pub async fn require_user(state: &AppState, id: Uuid) -> AppResult<User> {
    state
        .users
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
}

pub async fn list_doctors(state: &AppState) -> AppResult<Vec<User>> {
    Ok(state.users.list_by_role(Role::Doctor).await?)
}

/// Applies a name/profile change. Only the account owner or an admin may do this.
pub async fn update_user(
    state: &AppState,
    caller: AuthUser,
    id: Uuid,
    req: UpdateUserRequest,
) -> AppResult<User> {
    let user = require_user(state, id).await?;
    if !caller.can_act_for(id) {
        warn!(caller = %caller.id, target = %id, "profile update refused");
        return Err(AppError::Forbidden("Not authorized".into()));
    }

    let name = match req.name.map(|n| n.trim().to_string()) {
        Some(n) if n.is_empty() => return Err(AppError::validation("Name cannot be blank")),
        other => other,
    };

    let mut profile = user.profile;
    if let Some(patch) = req.profile {
        profile.merge(patch);
    }
    if user.role == Role::Doctor {
        if let Some(field) = profile.missing_doctor_field() {
            return Err(AppError::validation(format!("Doctors must provide {field}")));
        }
    }

    let updated = state
        .users
        .update(id, name, profile)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    info!(user_id = %id, by = %caller.id, "profile updated");
    Ok(updated)
}
