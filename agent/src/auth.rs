//! Backend JWT minting.
//!
//! The meeting backend authenticates websocket clients with an HS256 JWT
//! passed as a `token` query parameter. The agent signs its own short-lived
//! token with the shared backend secret.

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};

/// Identity the backend shows for agent-authored messages.
pub const AGENT_USER_ID: &str = "agent_transcriber";

/// Fallback shared secret, matching the backend's development default.
/// Deployments override it through `BACKEND_AUTH_SECRET`.
pub const DEFAULT_BACKEND_SECRET: &str =
    "uritomo-super-secret-key-change-this-in-production-12345";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Mint a backend token for the agent identity, valid for `hours`.
pub fn mint_backend_token(
    secret: &str,
    hours: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::hours(hours);

    let claims = BackendClaims {
        sub: AGENT_USER_ID.to_string(),
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };

    let header = Header::default(); // HS256
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&header, &claims, &key)
}
