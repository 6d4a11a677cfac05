//! Prefixed ULID identifiers for every record type.

use ulid::Ulid;

pub fn new_agent_id() -> String {
    format!("ag_{}", Ulid::new())
}

pub fn new_auth_request_id() -> String {
    format!("areq_{}", Ulid::new())
}

pub fn new_grant_id() -> String {
    format!("grnt_{}", Ulid::new())
}

pub fn new_token_id() -> String {
    format!("tok_{}", Ulid::new())
}

pub fn new_refresh_token_id() -> String {
    format!("ref_{}", Ulid::new())
}

pub fn new_audit_entry_id() -> String {
    format!("alog_{}", Ulid::new())
}

pub fn new_developer_id() -> String {
    format!("dev_{}", Ulid::new())
}

pub fn new_policy_id() -> String {
    format!("pol_{}", Ulid::new())
}

pub fn new_webhook_id() -> String {
    format!("wh_{}", Ulid::new())
}

pub fn new_delivery_id() -> String {
    format!("whd_{}", Ulid::new())
}

pub fn new_event_id() -> String {
    format!("evt_{}", Ulid::new())
}

pub fn new_code() -> String {
    Ulid::new().to_string()
}
