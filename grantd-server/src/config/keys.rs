/// Key manager configuration options.
///
/// Exactly one of `rsa_private_key_pem` or `auto_generate` must be set; the
/// key manager fails fast at startup otherwise.
#[derive(Debug, Clone, Default)]
pub struct KeysConfig {
    /// PKCS#8 PEM-encoded RSA private key. Literal `\n` sequences are
    /// accepted so the key can be passed through a single-line env var.
    pub rsa_private_key_pem: String,

    /// Generate an ephemeral 2048-bit key pair at startup. Tokens signed
    /// with a generated key do not survive a restart.
    pub auto_generate: bool,
}

impl KeysConfig {
    /// Creates a new configuration from environment variables
    pub fn from_env(config: &Self) -> Self {
        let mut result = config.clone();

        if let Ok(pem) = std::env::var("GRANTD_KEYS_RSA_PRIVATE_KEY_PEM") {
            result.rsa_private_key_pem = pem;
        }

        if let Ok(auto) = std::env::var("GRANTD_KEYS_AUTO_GENERATE") {
            result.auto_generate = auto == "true" || auto == "1";
        }

        result
    }
}
