//! Cryptographic operations for signal delivery and app onboarding.
//!
//! - HMAC-SHA256 computation and verification for outbound request bodies
//! - RSA access-key generation for out-of-band app verification
//! - HS256 entry-token signing for app onboarding redirects

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::DemuxError;

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// HMAC-SHA256 body signing
// ---------------------------------------------------------------------------

/// Compute the HMAC-SHA256 signature for an outbound request body.
///
/// The signature covers the exact bytes of the body, keyed by the destination
/// app's secret. Returns a hex-encoded signature string, sent as the
/// `X-Demux-Signature` header.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");

    mac.update(body);

    hex::encode(mac.finalize().into_bytes())
}

/// Verify a body signature using constant-time comparison.
///
/// Returns true if the expected signature matches the computed one.
pub fn verify_signature(expected_hex: &str, secret: &str, body: &[u8]) -> bool {
    let computed = sign_payload(secret, body);
    constant_time_eq(expected_hex.as_bytes(), computed.as_bytes())
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

// ---------------------------------------------------------------------------
// Access keys
// ---------------------------------------------------------------------------

/// An RSA key pair associated with an app.
///
/// Only the public key is intended for storage; the private key is handed to
/// the external app once and never persisted. The fingerprint identifies the
/// public key based on its DER encoding.
#[derive(Debug, Clone)]
pub struct AccessKey {
    /// Public key in PEM format.
    pub public_key: String,
    /// Private key in PEM format. Provide to the external app; do not store.
    pub private_key: String,
    /// `SHA256:<base64 digest of the public key DER>`.
    pub fingerprint: String,
}

/// Generate a new RSA-2048 access key pair with a content fingerprint.
pub fn generate_access_key() -> Result<AccessKey, DemuxError> {
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use rsa::{RsaPrivateKey, RsaPublicKey};

    let mut rng = rand::rngs::OsRng;
    let private = RsaPrivateKey::new(&mut rng, 2048)
        .map_err(|e| DemuxError::KeyGeneration(e.to_string()))?;
    let public = RsaPublicKey::from(&private);

    let der = public
        .to_public_key_der()
        .map_err(|e| DemuxError::KeyGeneration(e.to_string()))?;
    let fingerprint = format!("SHA256:{}", BASE64.encode(Sha256::digest(der.as_bytes())));

    let public_key = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| DemuxError::KeyGeneration(e.to_string()))?;
    let private_key = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| DemuxError::KeyGeneration(e.to_string()))?
        .to_string();

    Ok(AccessKey {
        public_key,
        private_key,
        fingerprint,
    })
}

// ---------------------------------------------------------------------------
// Entry tokens
// ---------------------------------------------------------------------------

/// Claims embedded in a signed entry token.
#[derive(Debug, Serialize, Deserialize)]
pub struct EntryClaims {
    /// Arbitrary onboarding data supplied by the caller.
    pub data: serde_json::Value,
    /// Expiration, seconds since the epoch.
    pub exp: i64,
}

/// Sign a time-limited entry token (HS256) embedding arbitrary claims.
pub fn sign_entry_token(
    secret: &str,
    data: &serde_json::Value,
    ttl: std::time::Duration,
) -> Result<String, DemuxError> {
    let claims = EntryClaims {
        data: data.clone(),
        exp: Utc::now().timestamp() + ttl.as_secs() as i64,
    };

    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| DemuxError::Token(e.to_string()))
}

/// Decode and validate an entry token, returning its claims.
pub fn decode_entry_token(secret: &str, token: &str) -> Result<EntryClaims, DemuxError> {
    jsonwebtoken::decode::<EntryClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| DemuxError::Token(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
