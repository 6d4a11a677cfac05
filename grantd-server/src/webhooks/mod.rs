//! Webhook event emission: durable queue rows plus an immediate
//! best-effort delivery attempt per endpoint.

pub mod worker;

use crate::ids;
use crate::state::AppState;
use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use log::error;
use serde::Serialize;
use sha2::Sha256;

pub const EVENT_GRANT_CREATED: &str = "grant.created";
pub const EVENT_GRANT_REVOKED: &str = "grant.revoked";
pub const EVENT_TOKEN_ISSUED: &str = "token.issued";

pub const VALID_EVENTS: [&str; 3] = [EVENT_GRANT_CREATED, EVENT_GRANT_REVOKED, EVENT_TOKEN_ISSUED];

/// HMAC-SHA256 signature over the JSON body, in the
/// `X-Grantd-Signature: sha256=<hex>` wire form.
pub fn sign_payload(secret: &str, payload: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[derive(Serialize)]
struct Event<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    #[serde(rename = "createdAt")]
    created_at: String,
    data: &'a serde_json::Value,
}

/// Emit an event to every subscribed endpoint of the developer.
///
/// Each endpoint gets a durable `webhook_deliveries` row (the retry worker
/// guarantees eventual delivery) and one immediate fire-and-forget attempt.
/// Failures are logged and never reach the caller's response path.
pub async fn emit_event(
    state: &AppState,
    developer_id: &str,
    event_type: &str,
    data: serde_json::Value,
) {
    let webhooks = match state.store.webhooks_for_event(developer_id, event_type) {
        Ok(webhooks) => webhooks,
        Err(err) => {
            error!("Failed to resolve webhooks for {event_type}: {err}");
            return;
        }
    };
    if webhooks.is_empty() {
        return;
    }

    let event_id = ids::new_event_id();
    let event = Event {
        id: &event_id,
        event_type,
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        data: &data,
    };
    let payload = match serde_json::to_string(&event) {
        Ok(payload) => payload,
        Err(err) => {
            error!("Failed to serialize {event_type} event: {err}");
            return;
        }
    };

    for webhook in webhooks {
        let signature = sign_payload(&webhook.secret, &payload);
        let delivery = match state.store.enqueue_delivery(
            &webhook.id,
            developer_id,
            &event_id,
            event_type,
            &payload,
            &signature,
            &webhook.url,
            state.config.webhooks.max_attempts,
        ) {
            Ok(delivery) => delivery,
            Err(err) => {
                error!("Failed to enqueue delivery for webhook {}: {err}", webhook.id);
                continue;
            }
        };

        // Immediate attempt, detached from the caller's response path.
        let task_state = state.clone();
        tokio::spawn(async move {
            worker::attempt(&task_state, &delivery).await;
        });
    }
}
