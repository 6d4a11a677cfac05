use super::{now_epoch, scopes_to_json, Store, StoreError};
use crate::ids;
use grantd_policy::{Effect, Policy};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};

/// A stored policy rule, i.e. a `grantd_policy::Policy` plus ownership and
/// bookkeeping columns.
#[derive(Debug, Clone)]
pub struct PolicyRecord {
    pub id: String,
    pub developer_id: String,
    pub name: Option<String>,
    pub effect: Effect,
    pub priority: i64,
    pub agent_id: Option<String>,
    pub principal_id: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub time_of_day_start: Option<String>,
    pub time_of_day_end: Option<String>,
    pub created_at: i64,
}

impl PolicyRecord {
    /// The evaluation-engine view of this record.
    pub fn to_rule(&self) -> Policy {
        Policy {
            id: self.id.clone(),
            effect: self.effect,
            priority: self.priority,
            agent_id: self.agent_id.clone(),
            principal_id: self.principal_id.clone(),
            scopes: self.scopes.clone(),
            time_of_day_start: self.time_of_day_start.clone(),
            time_of_day_end: self.time_of_day_end.clone(),
        }
    }
}

/// Parameters for creating a policy.
pub struct NewPolicy<'a> {
    pub name: Option<&'a str>,
    pub effect: Effect,
    pub priority: i64,
    pub agent_id: Option<&'a str>,
    pub principal_id: Option<&'a str>,
    pub scopes: Option<&'a [String]>,
    pub time_of_day_start: Option<&'a str>,
    pub time_of_day_end: Option<&'a str>,
}

fn policy_from_row(row: &Row<'_>) -> rusqlite::Result<PolicyRecord> {
    let effect: String = row.get(3)?;
    let effect = effect
        .parse::<Effect>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    let scopes: Option<String> = row.get(7)?;
    Ok(PolicyRecord {
        id: row.get(0)?,
        developer_id: row.get(1)?,
        name: row.get(2)?,
        effect,
        priority: row.get(4)?,
        agent_id: row.get(5)?,
        principal_id: row.get(6)?,
        scopes: scopes.map(|raw| super::scopes_from_json(&raw)),
        time_of_day_start: row.get(8)?,
        time_of_day_end: row.get(9)?,
        created_at: row.get(10)?,
    })
}

const POLICY_COLUMNS: &str = "id, developer_id, name, effect, priority, agent_id, principal_id, \
     scopes, time_of_day_start, time_of_day_end, created_at";

impl Store {
    pub fn create_policy(
        &self,
        developer_id: &str,
        new: NewPolicy<'_>,
    ) -> Result<PolicyRecord, StoreError> {
        let id = ids::new_policy_id();
        let created_at = now_epoch();
        let scopes_json = new.scopes.map(scopes_to_json).transpose()?;
        self.conn().execute(
            "INSERT INTO policies
                 (id, developer_id, name, effect, priority, agent_id, principal_id,
                  scopes, time_of_day_start, time_of_day_end, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id,
                developer_id,
                new.name,
                new.effect.to_string(),
                new.priority,
                new.agent_id,
                new.principal_id,
                scopes_json,
                new.time_of_day_start,
                new.time_of_day_end,
                created_at,
            ],
        )?;
        Ok(PolicyRecord {
            id,
            developer_id: developer_id.to_string(),
            name: new.name.map(str::to_string),
            effect: new.effect,
            priority: new.priority,
            agent_id: new.agent_id.map(str::to_string),
            principal_id: new.principal_id.map(str::to_string),
            scopes: new.scopes.map(<[String]>::to_vec),
            time_of_day_start: new.time_of_day_start.map(str::to_string),
            time_of_day_end: new.time_of_day_end.map(str::to_string),
            created_at,
        })
    }

    /// Policies in evaluation order: priority descending, then creation
    /// order. The engine takes the first match, so this ordering is what
    /// makes evaluation deterministic.
    pub fn list_policies(&self, developer_id: &str) -> Result<Vec<PolicyRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {POLICY_COLUMNS} FROM policies
             WHERE developer_id = ?1
             ORDER BY priority DESC, created_at ASC, id ASC"
        ))?;
        let policies = stmt
            .query_map([developer_id], policy_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(policies)
    }

    pub fn policy_by_id(
        &self,
        developer_id: &str,
        policy_id: &str,
    ) -> Result<Option<PolicyRecord>, StoreError> {
        let policy = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {POLICY_COLUMNS} FROM policies
                     WHERE id = ?1 AND developer_id = ?2"
                ),
                params![policy_id, developer_id],
                policy_from_row,
            )
            .optional()?;
        Ok(policy)
    }

    pub fn delete_policy(&self, developer_id: &str, policy_id: &str) -> Result<bool, StoreError> {
        let changed = self.conn().execute(
            "DELETE FROM policies WHERE id = ?1 AND developer_id = ?2",
            params![policy_id, developer_id],
        )?;
        Ok(changed > 0)
    }
}
