use utoipa::OpenApi;

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const AUTHORIZATION_TAG: &str = "Authorization API";
pub(crate) const GRANTS_TAG: &str = "Grants API";
pub(crate) const TOKENS_TAG: &str = "Tokens API";
pub(crate) const POLICIES_TAG: &str = "Policies API";
pub(crate) const AUDIT_TAG: &str = "Audit API";
pub(crate) const WEBHOOKS_TAG: &str = "Webhooks API";
pub(crate) const AGENTS_TAG: &str = "Agents API";
pub(crate) const KEYS_TAG: &str = "Keys API";

#[derive(OpenApi)]
#[openapi(
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = AGENTS_TAG, description = "Agent registration"),
        (name = AUTHORIZATION_TAG, description = "Consent flow endpoints"),
        (name = GRANTS_TAG, description = "Grant issuance, delegation, verification and revocation"),
        (name = TOKENS_TAG, description = "Token exchange, introspection and revocation"),
        (name = POLICIES_TAG, description = "Declarative auto-decision policies"),
        (name = AUDIT_TAG, description = "Tamper-evident audit ledger"),
        (name = WEBHOOKS_TAG, description = "Webhook subscriptions"),
        (name = KEYS_TAG, description = "Public signing keys"),
    ),
    info(
        title = "grantd API",
        description = "Authorization server for agent delegation chains",
        version = "0.1.0"
    )
)]
pub(crate) struct ApiDoc;
