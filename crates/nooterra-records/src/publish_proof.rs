//! `ProviderPublishProof`: a compact EdDSA JWS binding a provider's paid
//! tool manifest hash to its publishing identity.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use nooterra_crypto::{canonical::ToCanonical, CanonicalValue};
use nooterra_error::{ErrorCode, NooterraError};
use serde::{Deserialize, Serialize};

const ALG_EDDSA: &str = "EdDSA";
const TYP_JWT: &str = "JWT";

/// JWS header every publish proof carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishProofHeader {
    /// Signature algorithm; always `EdDSA`.
    pub alg: String,
    /// Key id identifying the signer's public key.
    pub kid: String,
    /// Token type; always `JWT`.
    pub typ: String,
}

impl ToCanonical for PublishProofHeader {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("alg", self.alg.to_canonical()),
            ("kid", self.kid.to_canonical()),
            ("typ", self.typ.to_canonical()),
        ])
    }
}

/// The claims a publish proof's payload commits to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishProofPayload {
    /// Intended audience (verifier identity).
    pub aud: String,
    /// Claim type, e.g. `"publish_proof"`.
    pub typ: String,
    /// Hash of the manifest this proof commits to.
    pub manifest_hash: String,
    /// The provider id this proof is published by.
    pub provider_id: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
    /// Optional anti-replay nonce.
    pub nonce: Option<String>,
}

impl ToCanonical for PublishProofPayload {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("aud", self.aud.to_canonical()),
            ("typ", self.typ.to_canonical()),
            ("manifestHash", self.manifest_hash.to_canonical()),
            ("providerId", self.provider_id.to_canonical()),
            ("iat", self.iat.to_canonical()),
            ("exp", self.exp.to_canonical()),
            ("nonce", self.nonce.to_canonical()),
        ])
    }
}

fn canonical_segment<T: ToCanonical>(value: &T) -> String {
    URL_SAFE_NO_PAD.encode(value.to_canonical().encode())
}

/// Encode a signed compact JWS: `base64url(header).base64url(payload).base64url(signature)`.
#[must_use]
pub fn encode_publish_proof(
    header: &PublishProofHeader,
    payload: &PublishProofPayload,
    signing_key: &SigningKey,
) -> String {
    let header_b64 = canonical_segment(header);
    let payload_b64 = canonical_segment(payload);
    let signing_input = format!("{header_b64}.{payload_b64}");
    let signature: Signature = signing_key.sign(signing_input.as_bytes());
    let sig_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());
    format!("{header_b64}.{payload_b64}.{sig_b64}")
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, NooterraError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        NooterraError::new(ErrorCode::PayloadInvalid, "publish proof segment is not valid base64url").with_source(e)
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|e| NooterraError::new(ErrorCode::PayloadInvalid, "publish proof segment is not valid JSON").with_source(e))
}

/// Parameters a publish proof's payload is expected to match.
#[derive(Debug, Clone)]
pub struct PublishProofExpectations<'a> {
    /// Expected audience.
    pub aud: &'a str,
    /// Expected provider id.
    pub provider_id: &'a str,
    /// Expected manifest hash.
    pub manifest_hash: &'a str,
}

const CLOCK_SKEW_ALLOWANCE_SECONDS: i64 = 300;

/// Verify a compact JWS publish-proof token: signature over
/// `header.payload`, declared `kid` matching the supplied verifying key,
/// and every claim matching `expected`.
pub fn verify_publish_proof(
    token: &str,
    expected: &PublishProofExpectations<'_>,
    verifying_key: &VerifyingKey,
    now: DateTime<Utc>,
) -> Result<PublishProofPayload, NooterraError> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(sig_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(NooterraError::new(ErrorCode::PayloadInvalid, "publish proof token must have 3 segments"));
    };

    let header: PublishProofHeader = decode_segment(header_b64)?;
    if header.alg != ALG_EDDSA {
        return Err(NooterraError::new(ErrorCode::AlgInvalid, "publish proof header.alg must be EdDSA")
            .with_context("alg", header.alg));
    }
    if header.typ != TYP_JWT {
        return Err(NooterraError::new(ErrorCode::PayloadInvalid, "publish proof header.typ must be JWT"));
    }

    let sig_bytes = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|e| NooterraError::new(ErrorCode::SignatureInvalid, "signature segment is not valid base64url").with_source(e))?;
    let sig_array: [u8; 64] = sig_bytes
        .as_slice()
        .try_into()
        .map_err(|_| NooterraError::new(ErrorCode::SignatureInvalid, "signature is not 64 bytes"))?;
    let signature = Signature::from_bytes(&sig_array);
    let signing_input = format!("{header_b64}.{payload_b64}");
    verifying_key
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|e| NooterraError::new(ErrorCode::SignatureInvalid, "publish proof signature invalid").with_source(e))?;

    let payload: PublishProofPayload = decode_segment(payload_b64)?;
    if payload.aud != expected.aud {
        return Err(NooterraError::new(ErrorCode::PayloadInvalid, "publish proof aud does not match expected audience"));
    }
    if payload.provider_id != expected.provider_id {
        return Err(NooterraError::new(ErrorCode::PayloadInvalid, "publish proof providerId does not match expected provider"));
    }
    if payload.manifest_hash != expected.manifest_hash {
        return Err(NooterraError::new(ErrorCode::PayloadInvalid, "publish proof manifestHash does not match expected manifest"));
    }

    let now_unix = now.timestamp();
    if payload.exp <= now_unix {
        return Err(NooterraError::new(ErrorCode::TokenExpired, "publish proof has expired")
            .with_context("exp", payload.exp)
            .with_context("now", now_unix));
    }
    if payload.iat > now_unix + CLOCK_SKEW_ALLOWANCE_SECONDS {
        return Err(NooterraError::new(ErrorCode::TokenNotYetValid, "publish proof iat is too far in the future")
            .with_context("iat", payload.iat)
            .with_context("now", now_unix));
    }

    Ok(payload)
}

/// Resolves a `kid` to the public key that should have signed it; the
/// only collaborator abstraction this module needs, kept separate from
/// any concrete JWKS fetch so the pure verification path above never
/// does I/O.
pub trait KeyResolver {
    /// Resolve `kid` to a verifying key, or `None` if unknown.
    fn resolve(&self, kid: &str) -> Option<VerifyingKey>;
}

#[cfg(feature = "jwks")]
pub use jwks::{fetch_jwks_key_resolver, JwksFetchConfig, StaticKeyResolver};

#[cfg(feature = "jwks")]
mod jwks {
    use std::collections::HashMap;
    use std::time::Duration;

    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    use ed25519_dalek::VerifyingKey;
    use nooterra_error::{ErrorCode, NooterraError};
    use serde::Deserialize;

    use super::KeyResolver;

    /// Tunables for a JWKS fetch; explicit parameters rather than
    /// environment reads, per the purity requirement this workspace's
    /// core crates hold to.
    #[derive(Debug, Clone, Copy)]
    pub struct JwksFetchConfig {
        /// Maximum time to wait for the whole fetch.
        pub timeout: Duration,
        /// Maximum response body size, in bytes.
        pub max_body_bytes: usize,
    }

    impl Default for JwksFetchConfig {
        fn default() -> Self {
            Self { timeout: Duration::from_secs(5), max_body_bytes: 1024 * 1024 }
        }
    }

    #[derive(Debug, Deserialize)]
    struct Jwk {
        kid: String,
        #[serde(default)]
        x: Option<String>,
        #[serde(default)]
        kty: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    struct JwksDocument {
        keys: Vec<Jwk>,
    }

    /// A [`KeyResolver`] backed by an in-memory map, produced once by an
    /// earlier JWKS fetch so later synchronous verification calls never
    /// need their own network access.
    #[derive(Debug, Clone, Default)]
    pub struct StaticKeyResolver {
        keys: HashMap<String, VerifyingKey>,
    }

    impl KeyResolver for StaticKeyResolver {
        fn resolve(&self, kid: &str) -> Option<VerifyingKey> {
            self.keys.get(kid).copied()
        }
    }

    /// Fetch a provider's JWKS document over HTTPS and build a
    /// [`StaticKeyResolver`] from its Ed25519 (`OKP`/`Ed25519`) keys.
    ///
    /// Rejects non-`https` urls outright (`JWKS_URL_UNSAFE`), bounds the
    /// response body to `config.max_body_bytes` (`JWKS_BODY_TOO_LARGE`),
    /// and the whole call to `config.timeout` (`TIMEOUT`).
    #[tracing::instrument(skip(config))]
    pub async fn fetch_jwks_key_resolver(url: &str, config: JwksFetchConfig) -> Result<StaticKeyResolver, NooterraError> {
        if !url.starts_with("https://") {
            return Err(NooterraError::new(ErrorCode::JwksUrlUnsafe, "JWKS url must be https").with_context("url", url));
        }

        let client = reqwest::Client::new();
        let fetch = async {
            let response = client
                .get(url)
                .send()
                .await
                .map_err(|e| NooterraError::new(ErrorCode::JwksFetchFailed, "JWKS fetch failed").with_source(e))?;

            let mut body: Vec<u8> = Vec::new();
            let mut stream = response.bytes_stream();
            use futures_util::StreamExt as _;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| NooterraError::new(ErrorCode::JwksFetchFailed, "JWKS fetch failed mid-stream").with_source(e))?;
                body.extend_from_slice(&chunk);
                if body.len() > config.max_body_bytes {
                    return Err(NooterraError::new(ErrorCode::JwksBodyTooLarge, "JWKS response exceeded the configured size cap")
                        .with_context("capBytes", config.max_body_bytes as i64));
                }
            }
            Ok(body)
        };

        let body = tokio::time::timeout(config.timeout, fetch)
            .await
            .map_err(|_| NooterraError::new(ErrorCode::Timeout, "JWKS fetch timed out"))??;

        let doc: JwksDocument = serde_json::from_slice(&body)
            .map_err(|e| NooterraError::new(ErrorCode::JwksJsonInvalid, "JWKS body is not valid JSON").with_source(e))?;
        if doc.keys.is_empty() {
            return Err(NooterraError::new(ErrorCode::JwksKeysMissing, "JWKS document has no keys"));
        }

        let mut keys = HashMap::new();
        for jwk in doc.keys {
            let Some(x) = jwk.x.as_ref() else { continue };
            let Ok(raw) = URL_SAFE_NO_PAD.decode(x) else { continue };
            let Ok(bytes): Result<[u8; 32], _> = raw.as_slice().try_into() else { continue };
            if let Ok(key) = VerifyingKey::from_bytes(&bytes) {
                keys.insert(jwk.kid, key);
            }
        }
        if keys.is_empty() {
            return Err(NooterraError::new(ErrorCode::JwksKeysMissing, "JWKS document had no usable Ed25519 keys"));
        }
        Ok(StaticKeyResolver { keys })
    }
}
