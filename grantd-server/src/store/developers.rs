use super::{now_epoch, Store, StoreError};
use crate::ids;
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};

/// The authenticated tenant every request is scoped to.
#[derive(Debug, Clone)]
pub struct Developer {
    pub id: String,
    pub name: Option<String>,
}

/// SHA-256 hex of an API key, the only form a key is ever stored in.
pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

impl Store {
    /// Resolve a developer from a raw API key. `None` means the key is
    /// unknown.
    pub fn developer_by_api_key(&self, api_key: &str) -> Result<Option<Developer>, StoreError> {
        let hash = hash_api_key(api_key);
        let developer = self
            .conn()
            .query_row(
                "SELECT id, name FROM developers WHERE api_key_hash = ?1",
                [&hash],
                |row| {
                    Ok(Developer {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(developer)
    }

    /// Create the bootstrap developer for a configured API key, or return
    /// the existing one. Developer account management proper lives outside
    /// this service.
    pub fn seed_developer(
        &self,
        api_key: &str,
        name: Option<&str>,
    ) -> Result<Developer, StoreError> {
        let hash = hash_api_key(api_key);
        let id = ids::new_developer_id();
        self.conn().execute(
            "INSERT INTO developers (id, api_key_hash, name, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(api_key_hash) DO NOTHING",
            params![id, hash, name, now_epoch()],
        )?;
        let developer = self
            .developer_by_api_key(api_key)?
            .expect("seeded developer must exist");
        Ok(developer)
    }
}
