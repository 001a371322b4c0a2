use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    appointments::{
        dto::{AppointmentView, BookAppointmentRequest},
        repo_types::Appointment,
        services,
    },
    auth::services::AuthUser,
    error::AppResult,
    state::AppState,
};

pub fn appointments_routes() -> Router<AppState> {
    Router::new()
        .route("/appointments", post(book_appointment))
        .route("/appointments/:user_id", get(list_appointments))
}

#[instrument(skip(state, body))]
pub async fn book_appointment(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(body): Json<BookAppointmentRequest>,
) -> AppResult<(StatusCode, Json<Appointment>)> {
    let appt = services::book(&state, caller, body).await?;
    Ok((StatusCode::CREATED, Json(appt)))
}

#[instrument(skip(state))]
pub async fn list_appointments(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<AppointmentView>>> {
    Ok(Json(services::list_for_user(&state, caller, user_id).await?))
}
