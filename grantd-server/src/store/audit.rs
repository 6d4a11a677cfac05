use super::{Store, StoreError};
use crate::ids;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, ErrorCode, OptionalExtension, Row};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// How many times an append races on the chain tail before giving up.
const CHAIN_MAX_RETRIES: u32 = 5;

/// An immutable, hash-chained record of an agent action.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: String,
    pub agent_id: String,
    pub agent_did: String,
    pub grant_id: String,
    pub principal_id: String,
    pub developer_id: String,
    pub action: String,
    pub status: String,
    pub metadata: serde_json::Value,
    pub hash: String,
    pub prev_hash: Option<String>,
    pub timestamp: String,
}

/// Caller-supplied fields of a new entry; id, hash and chain position are
/// assigned by the ledger.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub agent_id: String,
    pub agent_did: String,
    pub grant_id: String,
    pub principal_id: String,
    pub developer_id: String,
    pub action: String,
    pub status: String,
    pub metadata: serde_json::Value,
}

/// Optional filters for audit listings.
#[derive(Debug, Default)]
pub struct AuditFilter {
    pub agent_id: Option<String>,
    pub grant_id: Option<String>,
    pub principal_id: Option<String>,
    pub action: Option<String>,
}

/// Canonical hash input. Field order is the canonical JSON order, so this
/// struct must not be reordered.
#[derive(Serialize)]
struct HashInput<'a> {
    id: &'a str,
    #[serde(rename = "agentId")]
    agent_id: &'a str,
    #[serde(rename = "agentDid")]
    agent_did: &'a str,
    #[serde(rename = "grantId")]
    grant_id: &'a str,
    #[serde(rename = "principalId")]
    principal_id: &'a str,
    #[serde(rename = "developerId")]
    developer_id: &'a str,
    action: &'a str,
    metadata: &'a serde_json::Value,
    timestamp: &'a str,
    #[serde(rename = "prevHash")]
    prev_hash: Option<&'a str>,
    status: &'a str,
}

/// 64-char lowercase hex SHA-256 over the canonical JSON of the entry.
fn compute_hash(entry: &AuditEntry) -> Result<String, StoreError> {
    let input = HashInput {
        id: &entry.id,
        agent_id: &entry.agent_id,
        agent_did: &entry.agent_did,
        grant_id: &entry.grant_id,
        principal_id: &entry.principal_id,
        developer_id: &entry.developer_id,
        action: &entry.action,
        metadata: &entry.metadata,
        timestamp: &entry.timestamp,
        prev_hash: entry.prev_hash.as_deref(),
        status: &entry.status,
    };
    let canonical = serde_json::to_string(&input)?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    let metadata: String = row.get(8)?;
    Ok(AuditEntry {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        agent_did: row.get(2)?,
        grant_id: row.get(3)?,
        principal_id: row.get(4)?,
        developer_id: row.get(5)?,
        action: row.get(6)?,
        status: row.get(7)?,
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
        hash: row.get(9)?,
        prev_hash: row.get(10)?,
        timestamp: row.get(11)?,
    })
}

const ENTRY_COLUMNS: &str = "id, agent_id, agent_did, grant_id, principal_id, developer_id, \
     action, status, metadata, hash, prev_hash, timestamp";

fn is_chain_conflict(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl Store {
    /// Append an entry to the developer's hash chain.
    ///
    /// The `(developer_id, prev_hash)` unique index is the serialization
    /// point: a writer that loses the race re-reads the new tail and
    /// retries rather than surfacing the conflict to the caller.
    pub fn append_audit_entry(&self, new: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        for _ in 0..CHAIN_MAX_RETRIES {
            let prev_hash = self.audit_tail_hash(&new.developer_id)?;
            let mut entry = AuditEntry {
                id: ids::new_audit_entry_id(),
                agent_id: new.agent_id.clone(),
                agent_did: new.agent_did.clone(),
                grant_id: new.grant_id.clone(),
                principal_id: new.principal_id.clone(),
                developer_id: new.developer_id.clone(),
                action: new.action.clone(),
                status: new.status.clone(),
                metadata: new.metadata.clone(),
                hash: String::new(),
                prev_hash,
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            };
            entry.hash = compute_hash(&entry)?;

            let inserted = self.conn().execute(
                &format!(
                    "INSERT INTO audit_entries ({ENTRY_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    entry.id,
                    entry.agent_id,
                    entry.agent_did,
                    entry.grant_id,
                    entry.principal_id,
                    entry.developer_id,
                    entry.action,
                    entry.status,
                    serde_json::to_string(&entry.metadata)?,
                    entry.hash,
                    entry.prev_hash,
                    entry.timestamp,
                ],
            );

            match inserted {
                Ok(_) => return Ok(entry),
                Err(err) if is_chain_conflict(&err) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(StoreError::ChainContention(new.developer_id))
    }

    /// Hash of the developer's most recent entry, `None` for an empty chain.
    fn audit_tail_hash(&self, developer_id: &str) -> Result<Option<String>, StoreError> {
        let hash = self
            .conn()
            .query_row(
                "SELECT hash FROM audit_entries
                 WHERE developer_id = ?1
                 ORDER BY timestamp DESC, rowid DESC
                 LIMIT 1",
                [developer_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(hash)
    }

    pub fn list_audit_entries(
        &self,
        developer_id: &str,
        filter: &AuditFilter,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM audit_entries
             WHERE developer_id = ?1
               AND (?2 IS NULL OR agent_id = ?2)
               AND (?3 IS NULL OR grant_id = ?3)
               AND (?4 IS NULL OR principal_id = ?4)
               AND (?5 IS NULL OR action = ?5)
             ORDER BY timestamp ASC, rowid ASC"
        ))?;
        let entries = stmt
            .query_map(
                params![
                    developer_id,
                    filter.agent_id,
                    filter.grant_id,
                    filter.principal_id,
                    filter.action
                ],
                entry_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn audit_entry_by_id(
        &self,
        developer_id: &str,
        entry_id: &str,
    ) -> Result<Option<AuditEntry>, StoreError> {
        let entry = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM audit_entries
                     WHERE id = ?1 AND developer_id = ?2"
                ),
                params![entry_id, developer_id],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }
}
