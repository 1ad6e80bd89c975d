//! Private key loading and request-token signing.
//!
//! Keys are P-256 ECDSA keys in PKCS#8 PEM (the `.p8` download format) or
//! SEC1 PEM. Tokens are compact ES256 JWS values minted fresh on every
//! invocation; there is no token cache and no refresh.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL};
use chrono::{DateTime, Duration, TimeZone, Utc};
use p256::SecretKey;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::DecodePrivateKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::store::Secret;

/// Signing algorithm written into every token header.
pub const TOKEN_ALGORITHM: &str = "ES256";

/// Audience claim expected by the platform API.
pub const TOKEN_AUDIENCE: &str = "appstoreconnect-v1";

/// How long a minted token stays valid.
pub fn token_lifetime() -> Duration {
    Duration::minutes(10)
}

/// Error type for key loading and signing.
#[derive(Debug, Error)]
pub enum KeyError {
    /// The key file is missing, unreadable or not a supported encoding.
    #[error("invalid private key at {}: {reason}", path.display())]
    InvalidKey {
        path: std::path::PathBuf,
        reason: String,
    },

    /// Token generation failed.
    #[error("signing failed: {message}")]
    Signing { message: String },

    /// A token could not be decoded or did not verify.
    #[error("malformed token: {message}")]
    MalformedToken { message: String },

    /// Inline key material from the environment could not be decoded.
    #[error("invalid base64 in ${var}: {message}")]
    InlineDecode { var: &'static str, message: String },

    /// The temporary file for inline key material could not be written.
    #[error("cannot write temporary key file: {0}")]
    TempFile(#[source] std::io::Error),
}

/// A parsed private key, held only while a token is produced.
#[derive(Clone)]
pub struct PrivateKey {
    signing_key: SigningKey,
}

impl PrivateKey {
    /// Parse PEM text. Tries PKCS#8 first, then SEC1.
    pub fn from_pem(pem: &str) -> Result<Self, String> {
        let pkcs8_error = match SigningKey::from_pkcs8_pem(pem) {
            Ok(signing_key) => return Ok(Self { signing_key }),
            Err(e) => e,
        };
        match SecretKey::from_sec1_pem(pem) {
            Ok(secret) => Ok(Self {
                signing_key: SigningKey::from(&secret),
            }),
            Err(_) => Err(format!(
                "not a P-256 private key in PKCS#8 or SEC1 PEM ({})",
                pkcs8_error
            )),
        }
    }

    /// The matching public key.
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey::from(&self.signing_key)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

/// Check that `path` holds a usable private key. Read-only.
pub fn validate_key_file(path: &Path) -> Result<(), KeyError> {
    load_private_key(path).map(|_| ())
}

/// Read and parse the private key at `path`.
pub fn load_private_key(path: &Path) -> Result<PrivateKey, KeyError> {
    let invalid = |reason: String| KeyError::InvalidKey {
        path: path.to_path_buf(),
        reason,
    };

    if path.as_os_str().is_empty() {
        return Err(invalid("no path given".to_string()));
    }
    let pem = Zeroizing::new(fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?);
    PrivateKey::from_pem(&pem).map_err(invalid)
}

/// JWS header of a request token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    pub alg: String,
    pub kid: String,
    pub typ: String,
}

/// Claims of a request token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub aud: String,
}

/// A freshly minted request token.
#[derive(Debug, Clone)]
pub struct SignedToken {
    /// Compact JWS, redacted in Debug/Display.
    pub token: Secret,
    pub key_id: String,
    pub issuer_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SignedToken {
    /// The token value, for the `Authorization` header only.
    pub fn expose(&self) -> &str {
        self.token.expose()
    }
}

/// Mint a token valid from now for [`token_lifetime`].
///
/// Claims have whole-second resolution; within one process every token's
/// `exp` is strictly later than the previous one's, bumped by a second when
/// two are minted within the same second.
pub fn generate_token(
    key_id: &str,
    issuer_id: &str,
    key: &PrivateKey,
) -> Result<SignedToken, KeyError> {
    let now = Utc::now();
    let issued_at = seconds(now);
    let expires_at = next_expiry(seconds(now + token_lifetime()));
    sign_token(key_id, issuer_id, key, issued_at, expires_at)
}

/// Mint a token as if the current time were `now`.
pub fn generate_token_at(
    key_id: &str,
    issuer_id: &str,
    key: &PrivateKey,
    now: DateTime<Utc>,
) -> Result<SignedToken, KeyError> {
    sign_token(
        key_id,
        issuer_id,
        key,
        seconds(now),
        seconds(now + token_lifetime()),
    )
}

/// Last `exp` handed out by [`generate_token`].
static LAST_EXPIRY: AtomicI64 = AtomicI64::new(i64::MIN);

fn next_expiry(candidate: DateTime<Utc>) -> DateTime<Utc> {
    let wanted = candidate.timestamp();
    let previous = LAST_EXPIRY
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(wanted.max(last.saturating_add(1)))
        })
        .unwrap_or(wanted);
    let exp = wanted.max(previous.saturating_add(1));
    Utc.timestamp_opt(exp, 0).single().unwrap_or(candidate)
}

fn sign_token(
    key_id: &str,
    issuer_id: &str,
    key: &PrivateKey,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<SignedToken, KeyError> {
    let signing_error = |message: String| KeyError::Signing { message };

    let header = TokenHeader {
        alg: TOKEN_ALGORITHM.to_string(),
        kid: key_id.to_string(),
        typ: "JWT".to_string(),
    };
    let claims = TokenClaims {
        iss: issuer_id.to_string(),
        iat: issued_at.timestamp(),
        exp: expires_at.timestamp(),
        aud: TOKEN_AUDIENCE.to_string(),
    };

    let header_json = serde_json::to_vec(&header).map_err(|e| signing_error(e.to_string()))?;
    let claims_json = serde_json::to_vec(&claims).map_err(|e| signing_error(e.to_string()))?;
    let signing_input = format!(
        "{}.{}",
        BASE64URL.encode(header_json),
        BASE64URL.encode(claims_json)
    );

    // JWS wants the fixed-size r||s form, not DER.
    let signature: Signature = key
        .signing_key
        .try_sign(signing_input.as_bytes())
        .map_err(|e| signing_error(e.to_string()))?;
    let token = format!("{}.{}", signing_input, BASE64URL.encode(signature.to_bytes()));

    Ok(SignedToken {
        token: Secret::new(token),
        key_id: key_id.to_string(),
        issuer_id: issuer_id.to_string(),
        issued_at,
        expires_at,
    })
}

/// Decode a token's header and claims without checking the signature.
pub fn inspect_token(token: &str) -> Result<(TokenHeader, TokenClaims), KeyError> {
    let malformed = |message: String| KeyError::MalformedToken { message };

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(malformed("token must have 3 parts".to_string()));
    }
    let header_bytes = BASE64URL
        .decode(parts[0])
        .map_err(|e| malformed(format!("header: {}", e)))?;
    let claims_bytes = BASE64URL
        .decode(parts[1])
        .map_err(|e| malformed(format!("claims: {}", e)))?;

    let header: TokenHeader = serde_json::from_slice(&header_bytes)
        .map_err(|e| malformed(format!("header: {}", e)))?;
    let claims: TokenClaims = serde_json::from_slice(&claims_bytes)
        .map_err(|e| malformed(format!("claims: {}", e)))?;
    Ok((header, claims))
}

/// Check a token's signature against `verifying_key` and return its claims.
pub fn verify_token(token: &str, verifying_key: &VerifyingKey) -> Result<TokenClaims, KeyError> {
    let (header, claims) = inspect_token(token)?;
    if header.alg != TOKEN_ALGORITHM {
        return Err(KeyError::MalformedToken {
            message: format!("algorithm '{}' rejected", header.alg),
        });
    }

    let (signing_input, signature_b64) = token
        .rsplit_once('.')
        .ok_or_else(|| KeyError::MalformedToken {
            message: "missing signature".to_string(),
        })?;
    let signature_bytes = BASE64URL
        .decode(signature_b64)
        .map_err(|e| KeyError::MalformedToken {
            message: format!("signature: {}", e),
        })?;
    let signature =
        Signature::from_slice(&signature_bytes).map_err(|e| KeyError::MalformedToken {
            message: format!("signature: {}", e),
        })?;

    verifying_key
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| KeyError::MalformedToken {
            message: "signature does not verify".to_string(),
        })?;
    Ok(claims)
}

/// Truncate to whole seconds, matching the claim resolution.
fn seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(at.timestamp(), 0).single().unwrap_or(at)
}
