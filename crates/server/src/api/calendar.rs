//! Sales appointment calendar.
//!
//! - `POST /api/calendar/appointments`
//! - `GET  /api/calendar/appointments?user_id=`

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use homequote_core::{
    domain::{
        appointment::{Appointment, AppointmentId},
        customer::CustomerId,
        user::{Role, UserId},
    },
    ApplicationError,
};
use serde::Deserialize;
use tracing::info;

use super::{not_found, ApiError, ApiState, Caller, ForRequest};

#[derive(Clone, Debug, Deserialize)]
pub struct AppointmentInput {
    pub customer_id: String,
    /// Defaults to the caller.
    #[serde(default)]
    pub user_id: Option<String>,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AppointmentQuery {
    pub user_id: Option<String>,
}

pub async fn create_appointment(
    State(state): State<ApiState>,
    caller: Caller,
    Json(body): Json<AppointmentInput>,
) -> Result<(StatusCode, Json<Appointment>), ApiError> {
    let cid = caller.correlation_id.as_str();
    let user_id = scoped_user(&caller, body.user_id.as_deref())?
        .unwrap_or_else(|| caller.actor.id().clone());

    let appointment = Appointment {
        id: AppointmentId::generate(),
        customer_id: CustomerId(body.customer_id.trim().to_string()),
        user_id,
        title: body.title.trim().to_string(),
        starts_at: body.starts_at,
        ends_at: body.ends_at,
        notes: body.notes.filter(|notes| !notes.trim().is_empty()),
        created_at: Utc::now(),
    };
    appointment.validate().for_request(cid)?;

    state
        .customers
        .find_by_id(&appointment.customer_id)
        .await
        .for_request(cid)?
        .ok_or_else(|| caller.fail(not_found("customer", &appointment.customer_id.0)))?;

    let booked = state.appointments.list(Some(&appointment.user_id)).await.for_request(cid)?;
    if let Some(clash) = booked.iter().find(|existing| existing.overlaps(&appointment)) {
        return Err(caller.fail(ApplicationError::Conflict(format!(
            "overlaps appointment `{}` ({} - {})",
            clash.id.0,
            clash.starts_at.to_rfc3339(),
            clash.ends_at.to_rfc3339()
        ))));
    }

    state.appointments.save(appointment.clone()).await.for_request(cid)?;
    info!(
        event_name = "calendar.appointment.created",
        correlation_id = %cid,
        appointment_id = %appointment.id.0,
        user_id = %appointment.user_id.0,
        starts_at = %appointment.starts_at.to_rfc3339(),
        "appointment booked"
    );

    Ok((StatusCode::CREATED, Json(appointment)))
}

/// Reps only see their own calendar.
pub async fn list_appointments(
    State(state): State<ApiState>,
    caller: Caller,
    Query(query): Query<AppointmentQuery>,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    let user_id = match scoped_user(&caller, query.user_id.as_deref())? {
        Some(user_id) => Some(user_id),
        None if caller.actor.role().rank() >= Role::SalesManager.rank() => None,
        None => Some(caller.actor.id().clone()),
    };

    let appointments =
        state.appointments.list(user_id.as_ref()).await.for_request(&caller.correlation_id)?;
    Ok(Json(appointments))
}

fn scoped_user(caller: &Caller, requested: Option<&str>) -> Result<Option<UserId>, ApiError> {
    let Some(requested) = requested.map(str::trim).filter(|id| !id.is_empty()) else {
        return Ok(None);
    };
    caller.require(
        requested == caller.user_id() || caller.actor.role().rank() >= Role::SalesManager.rank(),
        "manage another user's calendar",
    )?;
    Ok(Some(UserId(requested.to_string())))
}
