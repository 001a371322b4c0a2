use axum::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::appointments::repo_types::{
    Appointment, AppointmentRow, AppointmentStatus, NewAppointment,
};

#[async_trait]
pub trait AppointmentLedger: Send + Sync {
    async fn insert(&self, new: NewAppointment) -> anyhow::Result<Appointment>;
    /// Appointments where `user` is the patient or the doctor, by date then booking time.
    async fn list_for_user(&self, user: Uuid) -> anyhow::Result<Vec<Appointment>>;
}

const APPOINTMENT_COLUMNS: &str = "id, patient_id, doctor_id, date, time, status, created_at";

#[derive(Clone)]
pub struct PgAppointmentLedger {
    db: PgPool,
}

impl PgAppointmentLedger {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AppointmentLedger for PgAppointmentLedger {
    async fn insert(&self, new: NewAppointment) -> anyhow::Result<Appointment> {
        let row = sqlx::query_as::<_, AppointmentRow>(&format!(
            r#"
            INSERT INTO appointments (patient_id, doctor_id, date, time)
            VALUES ($1, $2, $3, $4)
            RETURNING {APPOINTMENT_COLUMNS}
            "#
        ))
        .bind(new.patient)
        .bind(new.doctor)
        .bind(new.date)
        .bind(&new.time)
        .fetch_one(&self.db)
        .await?;
        row.try_into()
    }

    async fn list_for_user(&self, user: Uuid) -> anyhow::Result<Vec<Appointment>> {
        let rows = sqlx::query_as::<_, AppointmentRow>(&format!(
            r#"
            SELECT {APPOINTMENT_COLUMNS}
            FROM appointments
            WHERE patient_id = $1 OR doctor_id = $1
            ORDER BY date ASC, created_at ASC
            "#
        ))
        .bind(user)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(Appointment::try_from).collect()
    }
}

#[derive(Default)]
pub struct MemoryAppointmentLedger {
    appointments: RwLock<Vec<Appointment>>,
}

impl MemoryAppointmentLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppointmentLedger for MemoryAppointmentLedger {
    async fn insert(&self, new: NewAppointment) -> anyhow::Result<Appointment> {
        let appt = Appointment {
            id: Uuid::new_v4(),
            patient: new.patient,
            doctor: new.doctor,
            date: new.date,
            time: new.time,
            status: AppointmentStatus::Pending,
            created_at: OffsetDateTime::now_utc(),
        };
        self.appointments.write().await.push(appt.clone());
        Ok(appt)
    }

    async fn list_for_user(&self, user: Uuid) -> anyhow::Result<Vec<Appointment>> {
        let mut found: Vec<Appointment> = self
            .appointments
            .read()
            .await
            .iter()
            .filter(|a| a.patient == user || a.doctor == user)
            .cloned()
            .collect();
        // stable sort keeps insertion order within a day
        found.sort_by_key(|a| a.date);
        Ok(found)
    }
}
