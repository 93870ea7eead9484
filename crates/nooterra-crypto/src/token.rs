//! Base64url token encoding shared by inbox cursors, publish-proof JWS
//! segments, and x402 decision tokens — every wire token in this
//! substrate is `base64url(canonical(value))` of one shape or another.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use nooterra_error::{ErrorCode, NooterraError};

use crate::canonical::ToCanonical;

/// Encode a canonicalizable value as an unpadded base64url string.
#[must_use]
pub fn encode_token<T: ToCanonical + ?Sized>(value: &T) -> String {
    URL_SAFE_NO_PAD.encode(value.to_canonical().encode())
}

/// Decode an unpadded base64url token back into raw canonical bytes (the
/// caller is responsible for parsing those bytes into the expected shape,
/// since the canonical encoding is not itself reversible to a typed value
/// without knowing the schema).
pub fn decode_token_bytes(token: &str) -> Result<Vec<u8>, NooterraError> {
    URL_SAFE_NO_PAD.decode(token).map_err(|e| {
        NooterraError::new(ErrorCode::PayloadInvalid, "token is not valid base64url").with_source(e)
    })
}
