//! JWT token creation and validation.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::Result, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use super::types::{AuthConfig, AuthUser, Claims};

/// Sessions older than this get a fresh token on their next request.
const REFRESH_AFTER_SECS: i64 = 24 * 60 * 60;

/// Sign a session token for `user`, valid for `token_duration_days`.
pub fn create_token(config: &AuthConfig, user: &AuthUser) -> Result<String> {
    let now = Utc::now();
    let exp = now + Duration::days(config.token_duration_days);

    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        name: user.name.clone(),
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
}

/// Check signature and expiry, returning the session claims.
pub fn validate_token(config: &AuthConfig, token: &str) -> Result<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
}

pub fn should_refresh(claims: &Claims) -> bool {
    Utc::now().timestamp() - claims.iat > REFRESH_AFTER_SECS
}
