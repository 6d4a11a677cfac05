//! RSA key pair ownership, grant token signing/verification, and the public
//! JWKS document.
//!
//! The key manager is constructed once at startup and injected through
//! `AppState`; nothing else in the crate touches key material.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::config::KeysConfig;

const RSA_BITS: usize = 2048;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("No RSA key configured: set GRANTD_KEYS_RSA_PRIVATE_KEY_PEM or GRANTD_KEYS_AUTO_GENERATE=true")]
    NotConfigured,

    #[error("Invalid RSA private key: {0}")]
    InvalidKey(String),

    #[error("Key generation failed: {0}")]
    Generation(String),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Claims carried by every grant token.
///
/// Delegation fields are present only on tokens minted for delegated
/// grants; root grant tokens omit them entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantClaims {
    pub iss: String,
    /// Principal the agent acts on behalf of
    pub sub: String,
    /// Agent DID
    pub agt: String,
    /// Owning developer id
    pub dev: String,
    /// Granted scopes
    pub scp: Vec<String>,
    /// Token id
    pub jti: String,
    /// Grant id; falls back to `jti` when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grnt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    pub iat: i64,
    pub exp: i64,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub delegation: Option<DelegationClaims>,
}

/// The extra claims a delegated grant token carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationClaims {
    #[serde(rename = "parentAgt", skip_serializing_if = "Option::is_none")]
    pub parent_agt: Option<String>,
    #[serde(rename = "parentGrnt")]
    pub parent_grnt: String,
    #[serde(rename = "delegationDepth")]
    pub delegation_depth: i64,
}

impl GrantClaims {
    /// The grant this token belongs to (`grnt` claim, `jti` fallback).
    pub fn grant_id(&self) -> &str {
        self.grnt.as_deref().unwrap_or(&self.jti)
    }

    /// 0 for root grants, parent depth + 1 for delegated grants.
    pub fn delegation_depth(&self) -> i64 {
        self.delegation
            .as_ref()
            .map(|d| d.delegation_depth)
            .unwrap_or(0)
    }
}

/// A single public key in JWKS form. Private components never appear here.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Jwk {
    pub kty: String,
    pub n: String,
    pub e: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub use_: String,
    pub kid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

/// Holds the signing key pair and exposes signing/verification material.
pub struct KeyManager {
    issuer: String,
    kid: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    /// Base64url modulus/exponent, precomputed for the JWKS document.
    jwk_n: String,
    jwk_e: String,
}

impl KeyManager {
    /// Load the key pair from configuration, or generate one when allowed.
    /// Fails fast when neither option is available.
    pub fn from_config(config: &KeysConfig, issuer: &str) -> Result<Self, KeyError> {
        let private_key = if !config.rsa_private_key_pem.is_empty() {
            let pem = config.rsa_private_key_pem.replace("\\n", "\n");
            RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|e| KeyError::InvalidKey(e.to_string()))?
        } else if config.auto_generate {
            let mut rng = rand::thread_rng();
            RsaPrivateKey::new(&mut rng, RSA_BITS)
                .map_err(|e| KeyError::Generation(e.to_string()))?
        } else {
            return Err(KeyError::NotConfigured);
        };

        Self::from_private_key(private_key, issuer)
    }

    fn from_private_key(private_key: RsaPrivateKey, issuer: &str) -> Result<Self, KeyError> {
        let public_key = RsaPublicKey::from(&private_key);

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;

        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())?;

        Ok(Self {
            issuer: issuer.to_string(),
            kid: build_kid(),
            encoding_key,
            decoding_key,
            jwk_n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            jwk_e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Sign a grant token (RS256, `kid` in the header).
    pub fn sign(&self, claims: &GrantClaims) -> Result<String, KeyError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        Ok(encode(&header, claims, &self.encoding_key)?)
    }

    /// Full cryptographic verification: signature, RS256 pinned, expiry.
    #[allow(dead_code)]
    pub fn verify(&self, token: &str) -> Result<GrantClaims, KeyError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;
        Ok(decode::<GrantClaims>(token, &self.decoding_key, &validation)?.claims)
    }

    /// Signature verification with expiry deferred to the caller, so the
    /// authorization-state layer can report `expired` as a distinct reason
    /// instead of a blanket signature failure.
    pub fn verify_ignoring_expiry(&self, token: &str) -> Result<GrantClaims, KeyError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;
        validation.validate_exp = false;
        validation.required_spec_claims = Default::default();
        Ok(decode::<GrantClaims>(token, &self.decoding_key, &validation)?.claims)
    }

    /// Decode claims without verifying the signature, for callers that
    /// already trust the token's source.
    pub fn decode_unverified(&self, token: &str) -> Result<GrantClaims, KeyError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.insecure_disable_signature_validation();
        validation.validate_aud = false;
        validation.validate_exp = false;
        validation.required_spec_claims = Default::default();
        let key = DecodingKey::from_secret(&[]);
        Ok(decode::<GrantClaims>(token, &key, &validation)?.claims)
    }

    /// The public JWKS document: modulus/exponent only.
    pub fn public_jwks(&self) -> Jwks {
        Jwks {
            keys: vec![Jwk {
                kty: "RSA".to_string(),
                n: self.jwk_n.clone(),
                e: self.jwk_e.clone(),
                alg: "RS256".to_string(),
                use_: "sig".to_string(),
                kid: self.kid.clone(),
            }],
        }
    }
}

fn build_kid() -> String {
    format!("grantd-{}", Utc::now().format("%Y-%m"))
}
