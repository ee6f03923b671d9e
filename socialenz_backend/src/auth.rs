//! Password hashing and signed session tokens.

use crate::config::AuthConfig;
use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).context("failed to hash password")
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(password, hash).context("failed to verify password hash")
}

pub fn issue_token(auth: &AuthConfig, user_id: &str, username: &str) -> Result<String> {
    let iat = Utc::now().timestamp();
    let claims = Claims {
        user_id: user_id.to_string(),
        username: username.to_string(),
        iat,
        exp: iat + auth.token_ttl.as_secs() as i64,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(auth.jwt_secret.as_bytes()),
    )
    .context("failed to sign token")
}

/// Checks signature and expiry. Any failure is reported as an error; callers map it to 401.
pub fn verify_token(auth: &AuthConfig, token: &str) -> Result<Claims> {
    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(auth.jwt_secret.as_bytes()),
        &validation,
    )
    .context("invalid token")?;
    Ok(data.claims)
}
