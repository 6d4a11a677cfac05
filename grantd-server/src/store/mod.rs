//! Authoritative relational store for every protocol record.
//!
//! All state transitions are single conditional statements (compare-and-swap
//! on status) so concurrent callers racing on the same record converge on
//! exactly one winner; losers observe an empty update and report "already
//! done".

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

mod agents;
mod audit;
mod auth_requests;
mod developers;
mod grants;
mod policies;
pub mod schema;
mod tokens;
mod webhooks;

pub use agents::Agent;
pub use audit::{AuditEntry, AuditFilter, NewAuditEntry};
pub use auth_requests::{AuthRequest, NewAuthRequest};
pub use developers::Developer;
pub use grants::{Grant, GrantFilter, RevokedGrant};
pub use policies::{NewPolicy, PolicyRecord};
pub use tokens::{RefreshTokenContext, TokenState};
pub use webhooks::{Delivery, Webhook};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("audit chain contention for developer {0}")]
    ChainContention(String),
}

/// SQLite-backed store handle, cheap to clone across handlers.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open a file-backed store.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (tests and local experiments).
    pub fn memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_connection(conn: &Connection) -> Result<(), StoreError> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        // WAL mode for file-backed DBs (no-op for in-memory)
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        conn.execute_batch(schema::SCHEMA)?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    /// Health probe used by the readiness endpoint.
    pub fn health_check(&self) -> Result<(), String> {
        self.conn()
            .query_row("SELECT 1", [], |_| Ok(()))
            .map_err(|e| format!("SQLite health check failed: {e}"))
    }
}

/// Current time as UTC epoch seconds, the store's instant representation.
pub fn now_epoch() -> i64 {
    Utc::now().timestamp()
}

/// Render a stored instant for API responses.
pub fn epoch_to_rfc3339(epoch: i64) -> String {
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .unwrap_or_default()
        .to_rfc3339()
}

pub(crate) fn scopes_to_json(scopes: &[String]) -> Result<String, StoreError> {
    Ok(serde_json::to_string(scopes)?)
}

pub(crate) fn scopes_from_json(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Store with one seeded developer and agent, the baseline for most
    /// store-level tests.
    pub fn seeded_store() -> (Store, Developer, Agent) {
        let store = Store::memory().unwrap();
        let developer = store.seed_developer("test_api_key", Some("acme")).unwrap();
        let agent = store
            .create_agent(
                &developer.id,
                "assistant",
                Some("test assistant"),
                &["read".to_string(), "write".to_string()],
            )
            .unwrap();
        (store, developer, agent)
    }
}
