use std::collections::HashMap;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    appointments::{
        dto::{AppointmentView, BookAppointmentRequest},
        repo_types::{Appointment, NewAppointment},
    },
    auth::services::AuthUser,
    error::{AppError, AppResult},
    state::AppState,
    users::{dto::UserView, repo_types::Role, services::require_user},
};

/// Books a pending appointment. Patients book for themselves; admins book on behalf of `patient`.
pub async fn book(
    state: &AppState,
    caller: AuthUser,
    req: BookAppointmentRequest,
) -> AppResult<Appointment> {
    let patient = match (caller.role, req.patient) {
        (Role::Doctor, _) => {
            return Err(AppError::Forbidden("Doctors cannot book appointments".into()))
        }
        (Role::Admin, Some(p)) => p,
        (Role::Admin, None) => return Err(AppError::validation("patient is required")),
        (Role::Patient, Some(p)) if p != caller.id => {
            return Err(AppError::Forbidden("Patients can only book for themselves".into()))
        }
        (Role::Patient, _) => caller.id,
    };

    let time = req.time.trim().to_string();
    if time.is_empty() {
        return Err(AppError::validation("time is required"));
    }

    match state.users.get(req.doctor).await? {
        Some(doc) if doc.role == Role::Doctor => {}
        _ => {
            warn!(doctor = %req.doctor, "booking with unknown doctor");
            return Err(AppError::validation("Doctor does not exist"));
        }
    }
    match state.users.get(patient).await? {
        Some(p) if p.role == Role::Patient => {}
        _ => return Err(AppError::validation("Patient does not exist")),
    }

    let appt = state
        .appointments
        .insert(NewAppointment {
            patient,
            doctor: req.doctor,
            date: req.date,
            time,
        })
        .await?;
    info!(appointment_id = %appt.id, %patient, doctor = %appt.doctor, "appointment booked");
    Ok(appt)
}

/// Appointments where `user_id` is either party, with both parties resolved.
pub async fn list_for_user(
    state: &AppState,
    caller: AuthUser,
    user_id: Uuid,
) -> AppResult<Vec<AppointmentView>> {
    if !caller.can_act_for(user_id) {
        return Err(AppError::Forbidden("Not authorized".into()));
    }
    require_user(state, user_id).await?;

    let appts = state.appointments.list_for_user(user_id).await?;
    let mut people: HashMap<Uuid, UserView> = HashMap::new();
    let mut views = Vec::with_capacity(appts.len());
    for appt in appts {
        for id in [appt.patient, appt.doctor] {
            if !people.contains_key(&id) {
                people.insert(id, require_user(state, id).await?.into());
            }
        }
        let patient = people[&appt.patient].clone();
        let doctor = people[&appt.doctor].clone();
        views.push(AppointmentView::new(appt, patient, doctor));
    }
    Ok(views)
}
