use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::models::{CallerIdentity, Role};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("malformed session token")]
    Malformed,
    #[error("session token signature mismatch")]
    BadSignature,
    #[error("session expired")]
    Expired,
    #[error("session key rejected")]
    InvalidKey,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: i64,
    role: Role,
    /// Unix seconds.
    exp: i64,
}

fn mac(secret: &str) -> Result<HmacSha256, SessionError> {
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SessionError::InvalidKey)
}

/// Issues a bearer token for `identity`, valid for `ttl` from `now`.
pub fn issue(
    secret: &str,
    identity: &CallerIdentity,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<String, SessionError> {
    let claims = Claims {
        sub: identity.user_id,
        role: identity.role,
        exp: (now + ttl).timestamp(),
    };
    let json = serde_json::to_vec(&claims).map_err(|_| SessionError::Malformed)?;
    let body = URL_SAFE_NO_PAD.encode(json);

    let mut m = mac(secret)?;
    m.update(body.as_bytes());
    let sig = URL_SAFE_NO_PAD.encode(m.finalize().into_bytes());

    Ok(format!("{body}.{sig}"))
}

/// Checks signature and expiry of a token produced by [`issue`].
pub fn verify(secret: &str, token: &str, now: DateTime<Utc>) -> Result<CallerIdentity, SessionError> {
    let (body, sig) = token.trim().split_once('.').ok_or(SessionError::Malformed)?;
    let sig = URL_SAFE_NO_PAD
        .decode(sig)
        .map_err(|_| SessionError::Malformed)?;

    let mut m = mac(secret)?;
    m.update(body.as_bytes());
    m.verify_slice(&sig).map_err(|_| SessionError::BadSignature)?;

    let raw = URL_SAFE_NO_PAD
        .decode(body)
        .map_err(|_| SessionError::Malformed)?;
    let claims: Claims = serde_json::from_slice(&raw).map_err(|_| SessionError::Malformed)?;

    if claims.exp <= now.timestamp() {
        return Err(SessionError::Expired);
    }

    Ok(CallerIdentity {
        user_id: claims.sub,
        role: claims.role,
    })
}
