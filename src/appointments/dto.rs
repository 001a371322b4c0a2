use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::appointments::repo_types::{Appointment, AppointmentStatus};
use crate::users::dto::UserView;

/// Body of `POST /appointments`. `patient` is only honoured for admins.
#[derive(Debug, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor: Uuid,
    pub date: Date,
    pub time: String,
    #[serde(default)]
    pub patient: Option<Uuid>,
}

/// Appointment with both parties resolved.
#[derive(Debug, Serialize)]
pub struct AppointmentView {
    pub id: Uuid,
    pub patient: UserView,
    pub doctor: UserView,
    pub date: Date,
    pub time: String,
    pub status: AppointmentStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl AppointmentView {
    pub fn new(appt: Appointment, patient: UserView, doctor: UserView) -> Self {
        Self {
            id: appt.id,
            patient,
            doctor,
            date: appt.date,
            time: appt.time,
            status: appt.status,
            created_at: appt.created_at,
        }
    }
}
