use super::{now_epoch, scopes_from_json, scopes_to_json, Store, StoreError};
use crate::ids;
use rusqlite::{params, OptionalExtension, Row};

/// A developer's webhook endpoint subscription.
#[derive(Debug, Clone)]
pub struct Webhook {
    pub id: String,
    pub developer_id: String,
    pub url: String,
    pub secret: String,
    pub events: Vec<String>,
    pub created_at: i64,
}

/// One queued delivery attempt row.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: String,
    pub webhook_id: String,
    pub developer_id: String,
    pub event_id: String,
    pub event_type: String,
    pub payload: String,
    pub signature: String,
    pub url: String,
    pub status: String,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub next_retry_at: i64,
    pub delivered_at: Option<i64>,
}

fn webhook_from_row(row: &Row<'_>) -> rusqlite::Result<Webhook> {
    Ok(Webhook {
        id: row.get(0)?,
        developer_id: row.get(1)?,
        url: row.get(2)?,
        secret: row.get(3)?,
        events: scopes_from_json(&row.get::<_, String>(4)?),
        created_at: row.get(5)?,
    })
}

fn delivery_from_row(row: &Row<'_>) -> rusqlite::Result<Delivery> {
    Ok(Delivery {
        id: row.get(0)?,
        webhook_id: row.get(1)?,
        developer_id: row.get(2)?,
        event_id: row.get(3)?,
        event_type: row.get(4)?,
        payload: row.get(5)?,
        signature: row.get(6)?,
        url: row.get(7)?,
        status: row.get(8)?,
        attempts: row.get(9)?,
        max_attempts: row.get(10)?,
        last_error: row.get(11)?,
        next_retry_at: row.get(12)?,
        delivered_at: row.get(13)?,
    })
}

const WEBHOOK_COLUMNS: &str = "id, developer_id, url, secret, events, created_at";
const DELIVERY_COLUMNS: &str = "id, webhook_id, developer_id, event_id, event_type, payload, \
     signature, url, status, attempts, max_attempts, last_error, next_retry_at, delivered_at";

impl Store {
    pub fn create_webhook(
        &self,
        developer_id: &str,
        url: &str,
        secret: &str,
        events: &[String],
    ) -> Result<Webhook, StoreError> {
        let id = ids::new_webhook_id();
        let created_at = now_epoch();
        self.conn().execute(
            "INSERT INTO webhooks (id, developer_id, url, secret, events, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                developer_id,
                url,
                secret,
                scopes_to_json(events)?,
                created_at
            ],
        )?;
        Ok(Webhook {
            id,
            developer_id: developer_id.to_string(),
            url: url.to_string(),
            secret: secret.to_string(),
            events: events.to_vec(),
            created_at,
        })
    }

    pub fn list_webhooks(&self, developer_id: &str) -> Result<Vec<Webhook>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {WEBHOOK_COLUMNS} FROM webhooks
             WHERE developer_id = ?1 ORDER BY created_at DESC, id DESC"
        ))?;
        let webhooks = stmt
            .query_map([developer_id], webhook_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(webhooks)
    }

    pub fn delete_webhook(&self, developer_id: &str, webhook_id: &str) -> Result<bool, StoreError> {
        let changed = self.conn().execute(
            "DELETE FROM webhooks WHERE id = ?1 AND developer_id = ?2",
            params![webhook_id, developer_id],
        )?;
        Ok(changed > 0)
    }

    /// Endpoints subscribed to a given event type. Event lists are small
    /// JSON arrays, so matching happens here rather than in SQL.
    pub fn webhooks_for_event(
        &self,
        developer_id: &str,
        event_type: &str,
    ) -> Result<Vec<Webhook>, StoreError> {
        let webhooks = self
            .list_webhooks(developer_id)?
            .into_iter()
            .filter(|w| w.events.iter().any(|e| e == event_type))
            .collect();
        Ok(webhooks)
    }

    /// Queue a delivery for the retry worker; `next_retry_at = now` makes
    /// it immediately eligible.
    #[allow(clippy::too_many_arguments)]
    pub fn enqueue_delivery(
        &self,
        webhook_id: &str,
        developer_id: &str,
        event_id: &str,
        event_type: &str,
        payload: &str,
        signature: &str,
        url: &str,
        max_attempts: u32,
    ) -> Result<Delivery, StoreError> {
        let id = ids::new_delivery_id();
        let next_retry_at = now_epoch();
        self.conn().execute(
            "INSERT INTO webhook_deliveries
                 (id, webhook_id, developer_id, event_id, event_type, payload, signature,
                  url, status, attempts, max_attempts, next_retry_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', 0, ?9, ?10)",
            params![
                id,
                webhook_id,
                developer_id,
                event_id,
                event_type,
                payload,
                signature,
                url,
                max_attempts,
                next_retry_at,
            ],
        )?;
        Ok(Delivery {
            id,
            webhook_id: webhook_id.to_string(),
            developer_id: developer_id.to_string(),
            event_id: event_id.to_string(),
            event_type: event_type.to_string(),
            payload: payload.to_string(),
            signature: signature.to_string(),
            url: url.to_string(),
            status: "pending".to_string(),
            attempts: 0,
            max_attempts,
            last_error: None,
            next_retry_at,
            delivered_at: None,
        })
    }

    /// Pending deliveries whose retry time has come, oldest first, bounded
    /// by the worker's batch size.
    pub fn due_deliveries(&self, now: i64, limit: u32) -> Result<Vec<Delivery>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries
             WHERE status = 'pending' AND next_retry_at <= ?1
             ORDER BY next_retry_at ASC, id ASC
             LIMIT ?2"
        ))?;
        let deliveries = stmt
            .query_map(params![now, limit], delivery_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(deliveries)
    }

    pub fn mark_delivery_delivered(
        &self,
        delivery_id: &str,
        attempts: u32,
    ) -> Result<(), StoreError> {
        self.conn().execute(
            "UPDATE webhook_deliveries
             SET status = 'delivered', attempts = ?2, delivered_at = ?3
             WHERE id = ?1",
            params![delivery_id, attempts, now_epoch()],
        )?;
        Ok(())
    }

    pub fn mark_delivery_retry(
        &self,
        delivery_id: &str,
        attempts: u32,
        error: &str,
        next_retry_at: i64,
    ) -> Result<(), StoreError> {
        self.conn().execute(
            "UPDATE webhook_deliveries
             SET attempts = ?2, last_error = ?3, next_retry_at = ?4
             WHERE id = ?1",
            params![delivery_id, attempts, error, next_retry_at],
        )?;
        Ok(())
    }

    pub fn mark_delivery_failed(
        &self,
        delivery_id: &str,
        attempts: u32,
        error: &str,
    ) -> Result<(), StoreError> {
        self.conn().execute(
            "UPDATE webhook_deliveries
             SET status = 'failed', attempts = ?2, last_error = ?3
             WHERE id = ?1",
            params![delivery_id, attempts, error],
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub fn delivery_by_id(&self, delivery_id: &str) -> Result<Option<Delivery>, StoreError> {
        let delivery = self
            .conn()
            .query_row(
                &format!("SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries WHERE id = ?1"),
                [delivery_id],
                delivery_from_row,
            )
            .optional()?;
        Ok(delivery)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::seeded_store;
    use super::*;

    fn subscribed(store: &Store, developer_id: &str, events: &[&str]) -> Webhook {
        let events: Vec<String> = events.iter().map(|s| s.to_string()).collect();
        store
            .create_webhook(developer_id, "https://example.test/hook", "s3cr3t", &events)
            .unwrap()
    }

    #[test]
    fn event_matching_filters_subscriptions() {
        let (store, developer, _agent) = seeded_store();
        subscribed(&store, &developer.id, &["grant.revoked"]);
        subscribed(&store, &developer.id, &["grant.created", "token.issued"]);

        let matching = store
            .webhooks_for_event(&developer.id, "grant.revoked")
            .unwrap();
        assert_eq!(matching.len(), 1);

        let none = store
            .webhooks_for_event(&developer.id, "grant.expired")
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn due_deliveries_respect_schedule_and_batch() {
        let (store, developer, _agent) = seeded_store();
        let webhook = subscribed(&store, &developer.id, &["grant.revoked"]);

        for _ in 0..3 {
            store
                .enqueue_delivery(
                    &webhook.id,
                    &developer.id,
                    "evt_1",
                    "grant.revoked",
                    "{}",
                    "sha256=abc",
                    &webhook.url,
                    5,
                )
                .unwrap();
        }

        let now = now_epoch();
        assert_eq!(store.due_deliveries(now, 50).unwrap().len(), 3);
        assert_eq!(store.due_deliveries(now, 2).unwrap().len(), 2);
        // Nothing is due before its retry time.
        assert!(store.due_deliveries(now - 10, 50).unwrap().is_empty());
    }

    #[test]
    fn delivery_state_transitions() {
        let (store, developer, _agent) = seeded_store();
        let webhook = subscribed(&store, &developer.id, &["token.issued"]);
        let delivery = store
            .enqueue_delivery(
                &webhook.id,
                &developer.id,
                "evt_1",
                "token.issued",
                "{}",
                "sha256=abc",
                &webhook.url,
                5,
            )
            .unwrap();

        store
            .mark_delivery_retry(&delivery.id, 1, "HTTP 500", now_epoch() + 30)
            .unwrap();
        let row = store.delivery_by_id(&delivery.id).unwrap().unwrap();
        assert_eq!(row.status, "pending");
        assert_eq!(row.attempts, 1);
        assert_eq!(row.last_error.as_deref(), Some("HTTP 500"));
        // Pushed past `now`, so no longer due.
        assert!(store.due_deliveries(now_epoch(), 50).unwrap().is_empty());

        store.mark_delivery_failed(&delivery.id, 5, "HTTP 500").unwrap();
        let row = store.delivery_by_id(&delivery.id).unwrap().unwrap();
        assert_eq!(row.status, "failed");

        let second = store
            .enqueue_delivery(
                &webhook.id,
                &developer.id,
                "evt_2",
                "token.issued",
                "{}",
                "sha256=abc",
                &webhook.url,
                5,
            )
            .unwrap();
        store.mark_delivery_delivered(&second.id, 1).unwrap();
        let row = store.delivery_by_id(&second.id).unwrap().unwrap();
        assert_eq!(row.status, "delivered");
        assert!(row.delivered_at.is_some());
    }

    #[test]
    fn delete_webhook_is_scoped() {
        let (store, developer, _agent) = seeded_store();
        let webhook = subscribed(&store, &developer.id, &["grant.created"]);
        let other = store.seed_developer("other_key", None).unwrap();

        assert!(!store.delete_webhook(&other.id, &webhook.id).unwrap());
        assert!(store.delete_webhook(&developer.id, &webhook.id).unwrap());
        assert!(store.list_webhooks(&developer.id).unwrap().is_empty());
    }
}
