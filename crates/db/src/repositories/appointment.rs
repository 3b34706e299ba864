use homequote_core::domain::appointment::{Appointment, AppointmentId};
use homequote_core::domain::customer::CustomerId;
use homequote_core::domain::user::UserId;

use super::{column, timestamp_column, AppointmentRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAppointmentRepository {
    pool: DbPool,
}

impl SqlAppointmentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_appointment(row: &sqlx::sqlite::SqliteRow) -> Result<Appointment, RepositoryError> {
    Ok(Appointment {
        id: AppointmentId(column(row, "id")?),
        customer_id: CustomerId(column(row, "customer_id")?),
        user_id: UserId(column(row, "user_id")?),
        title: column(row, "title")?,
        starts_at: timestamp_column(row, "starts_at")?,
        ends_at: timestamp_column(row, "ends_at")?,
        notes: column(row, "notes")?,
        created_at: timestamp_column(row, "created_at")?,
    })
}

#[async_trait::async_trait]
impl AppointmentRepository for SqlAppointmentRepository {
    async fn list(&self, user_id: Option<&UserId>) -> Result<Vec<Appointment>, RepositoryError> {
        let rows = match user_id {
            Some(user_id) => {
                sqlx::query(
                    "SELECT id, customer_id, user_id, title, starts_at, ends_at, notes, created_at
                     FROM appointment WHERE user_id = ? ORDER BY starts_at ASC",
                )
                .bind(&user_id.0)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, customer_id, user_id, title, starts_at, ends_at, notes, created_at
                     FROM appointment ORDER BY starts_at ASC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_appointment).collect::<Result<Vec<_>, _>>()
    }

    async fn save(&self, appointment: Appointment) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO appointment (id, customer_id, user_id, title, starts_at, ends_at, notes, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 starts_at = excluded.starts_at,
                 ends_at = excluded.ends_at,
                 notes = excluded.notes",
        )
        .bind(&appointment.id.0)
        .bind(&appointment.customer_id.0)
        .bind(&appointment.user_id.0)
        .bind(&appointment.title)
        .bind(appointment.starts_at.to_rfc3339())
        .bind(appointment.ends_at.to_rfc3339())
        .bind(&appointment.notes)
        .bind(appointment.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
