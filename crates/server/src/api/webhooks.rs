//! Identity provider webhook.
//!
//! `POST /api/webhooks/clerk` keeps local users in step with the identity
//! provider: `user.created` and `user.updated` upsert, `user.deleted`
//! deactivates. Other event types are acknowledged and ignored.

use axum::{extract::State, Json};
use chrono::Utc;
use homequote_core::{
    audit::{AuditCategory, AuditEvent, AuditOutcome},
    domain::user::{Role, User, UserId},
    DomainError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::{ApiError, ApiState, ForRequest, RequestMeta};

#[derive(Clone, Debug, Deserialize)]
pub struct ClerkEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct ClerkUser {
    id: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    primary_email_address_id: Option<String>,
    #[serde(default)]
    email_addresses: Vec<ClerkEmail>,
    #[serde(default)]
    public_metadata: Value,
}

#[derive(Clone, Debug, Deserialize)]
struct ClerkEmail {
    #[serde(default)]
    id: Option<String>,
    email_address: String,
}

impl ClerkUser {
    fn primary_email(&self) -> Option<&str> {
        let primary = self.primary_email_address_id.as_deref();
        self.email_addresses
            .iter()
            .find(|email| primary.is_some() && email.id.as_deref() == primary)
            .or_else(|| self.email_addresses.first())
            .map(|email| email.email_address.as_str())
    }

    /// Unknown or missing roles fall back to sales representative.
    fn role(&self) -> Role {
        self.public_metadata
            .get("role")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(Role::SalesRepresentative)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

pub async fn clerk_webhook(
    State(state): State<ApiState>,
    meta: RequestMeta,
    Json(event): Json<ClerkEvent>,
) -> Result<Json<WebhookAck>, ApiError> {
    let cid = meta.correlation_id.as_str();
    let ack = match event.event_type.as_str() {
        "user.created" | "user.updated" => upsert_user(&state, cid, event.data).await?,
        "user.deleted" => deactivate_user(&state, cid, &event.data).await?,
        other => {
            info!(
                event_name = "identity.webhook.ignored",
                correlation_id = %cid,
                webhook_event_type = %other,
                "ignoring identity webhook event"
            );
            WebhookAck { status: "ignored", user_id: None }
        }
    };

    if let Some(user_id) = &ack.user_id {
        state
            .record_audit(
                AuditEvent::new(
                    None,
                    cid,
                    format!("identity.webhook.{}", ack.status),
                    AuditCategory::Identity,
                    "identity-provider",
                    AuditOutcome::Success,
                )
                .with_metadata("user_id", user_id)
                .with_metadata("webhook_event_type", &event.event_type),
            )
            .await;
    }
    Ok(Json(ack))
}

async fn upsert_user(state: &ApiState, cid: &str, data: Value) -> Result<WebhookAck, ApiError> {
    let payload: ClerkUser = serde_json::from_value(data)
        .map_err(|error| DomainError::Validation(format!("malformed user payload: {error}")))
        .for_request(cid)?;
    let email = payload
        .primary_email()
        .map(str::to_string)
        .ok_or_else(|| DomainError::Validation("user payload has no email address".to_string()))
        .for_request(cid)?;

    let now = Utc::now();
    let user_id = UserId(payload.id.clone());
    let existing = state.users.find_by_id(&user_id).await.for_request(cid)?;
    let user = User {
        id: user_id,
        email,
        first_name: payload.first_name.clone().filter(|name| !name.trim().is_empty()),
        last_name: payload.last_name.clone().filter(|name| !name.trim().is_empty()),
        role: payload.role(),
        active: true,
        created_at: existing.as_ref().map(|user| user.created_at).unwrap_or(now),
        updated_at: now,
    };
    state.users.save(user.clone()).await.for_request(cid)?;

    info!(
        event_name = "identity.webhook.user_synced",
        correlation_id = %cid,
        user_id = %user.id.0,
        role = %user.role,
        created = existing.is_none(),
        "identity user synced"
    );
    Ok(WebhookAck { status: "synced", user_id: Some(user.id.0) })
}

async fn deactivate_user(
    state: &ApiState,
    cid: &str,
    data: &Value,
) -> Result<WebhookAck, ApiError> {
    let Some(id) = data.get("id").and_then(Value::as_str) else {
        return Err(ApiError::new(
            DomainError::Validation("user.deleted payload has no id".to_string()).into(),
            cid,
        ));
    };

    let Some(mut user) = state.users.find_by_id(&UserId(id.to_string())).await.for_request(cid)?
    else {
        warn!(
            event_name = "identity.webhook.unknown_user",
            correlation_id = %cid,
            user_id = %id,
            "delete event for a user that was never synced"
        );
        return Ok(WebhookAck { status: "ignored", user_id: None });
    };

    user.active = false;
    user.updated_at = Utc::now();
    state.users.save(user.clone()).await.for_request(cid)?;

    info!(
        event_name = "identity.webhook.user_deactivated",
        correlation_id = %cid,
        user_id = %user.id.0,
        "identity user deactivated"
    );
    Ok(WebhookAck { status: "deactivated", user_id: Some(user.id.0) })
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use homequote_core::domain::user::{Role, UserId};
    use serde_json::json;

    use super::*;
    use crate::api::test_support::seeded_state;
    use crate::api::RequestMeta;

    fn meta() -> RequestMeta {
        RequestMeta { correlation_id: "req-webhook".to_string() }
    }

    fn event(event_type: &str, data: serde_json::Value) -> ClerkEvent {
        ClerkEvent { event_type: event_type.to_string(), data }
    }

    #[tokio::test]
    async fn created_user_takes_role_from_public_metadata() {
        let (state, _pool) = seeded_state().await;

        let Json(ack) = clerk_webhook(
            State(state.clone()),
            meta(),
            Json(event(
                "user.created",
                json!({
                    "id": "user_2new",
                    "first_name": "Dana",
                    "last_name": "Lee",
                    "primary_email_address_id": "idn_2",
                    "email_addresses": [
                        { "id": "idn_1", "email_address": "old@example.com" },
                        { "id": "idn_2", "email_address": "dana@example.com" }
                    ],
                    "public_metadata": { "role": "sales_manager" }
                }),
            )),
        )
        .await
        .expect("created");
        assert_eq!(ack.status, "synced");

        let user = state
            .users
            .find_by_id(&UserId("user_2new".to_string()))
            .await
            .expect("lookup")
            .expect("user");
        assert_eq!(user.email, "dana@example.com");
        assert_eq!(user.role, Role::SalesManager);
        assert!(user.active);
    }

    #[tokio::test]
    async fn missing_role_defaults_to_sales_rep_and_delete_deactivates() {
        let (state, _pool) = seeded_state().await;

        let Json(synced) = clerk_webhook(
            State(state.clone()),
            meta(),
            Json(event(
                "user.updated",
                json!({
                    "id": "user_2plain",
                    "email_addresses": [{ "email_address": "plain@example.com" }]
                }),
            )),
        )
        .await
        .expect("upsert");
        assert_eq!(synced.user_id.as_deref(), Some("user_2plain"));

        let Json(ack) = clerk_webhook(
            State(state.clone()),
            meta(),
            Json(event("user.deleted", json!({ "id": "user_2plain", "deleted": true }))),
        )
        .await
        .expect("deleted");
        assert_eq!(ack.status, "deactivated");

        let user = state
            .users
            .find_by_id(&UserId("user_2plain".to_string()))
            .await
            .expect("lookup")
            .expect("user");
        assert_eq!(user.role, Role::SalesRepresentative);
        assert!(!user.active);
    }

    #[tokio::test]
    async fn unknown_events_are_acknowledged() {
        let (state, _pool) = seeded_state().await;

        let Json(ack) =
            clerk_webhook(State(state), meta(), Json(event("session.created", json!({}))))
                .await
                .expect("ignored");
        assert_eq!(ack, WebhookAck { status: "ignored", user_id: None });
    }

    #[tokio::test]
    async fn payload_without_email_is_rejected() {
        let (state, _pool) = seeded_state().await;

        let rejected = clerk_webhook(
            State(state),
            meta(),
            Json(event("user.created", json!({ "id": "user_2noemail" }))),
        )
        .await
        .expect_err("no email");
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
    }
}
