//! Auth-related types and configuration.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use dagr_core::{AuthUserResponse, LoginInitResponse};

/// Scopes requested at login. Calendar access is needed for reading the
/// week and writing plans back.
pub const GOOGLE_SCOPES: [&str; 4] = [
    "openid",
    "email",
    "profile",
    "https://www.googleapis.com/auth/calendar",
];

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    pub email: String,
    /// User display name from Google
    pub name: Option<String>,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
}

/// Validated user from JWT
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
}

impl TryFrom<Claims> for AuthUser {
    type Error = uuid::Error;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        Ok(AuthUser {
            id: Uuid::parse_str(&claims.sub)?,
            email: claims.email,
            name: claims.name,
        })
    }
}

impl From<AuthUser> for AuthUserResponse {
    fn from(user: AuthUser) -> Self {
        AuthUserResponse {
            id: user.id,
            email: user.email,
            name: user.name,
        }
    }
}

/// Auth configuration loaded from environment
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Empty means any Google account may sign in.
    pub allowed_emails: Vec<String>,
    pub token_duration_days: i64,
    pub cookie_name: String,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub auth_redirect_uri: String,
}

impl AuthConfig {
    /// Load auth configuration from environment variables.
    ///
    /// Required env vars:
    /// - `JWT_SECRET`: Secret key for signing JWTs
    /// - `GOOGLE_CLIENT_ID`: Google OAuth client ID
    /// - `GOOGLE_CLIENT_SECRET`: Google OAuth client secret
    /// - `AUTH_REDIRECT_URI`: OAuth callback URI for user login
    ///
    /// Optional: `ALLOWED_EMAILS`, a comma-separated allowlist.
    pub fn from_env() -> Result<Self, String> {
        let jwt_secret =
            std::env::var("JWT_SECRET").map_err(|_| "JWT_SECRET must be set".to_string())?;

        let allowed_emails = parse_allowed_emails(&std::env::var("ALLOWED_EMAILS").unwrap_or_default());
        if allowed_emails.is_empty() {
            tracing::warn!("ALLOWED_EMAILS not set, any Google account can sign in");
        }

        Ok(Self {
            jwt_secret,
            allowed_emails,
            token_duration_days: 7,
            cookie_name: "auth_token".to_string(),
            google_client_id: std::env::var("GOOGLE_CLIENT_ID")
                .map_err(|_| "GOOGLE_CLIENT_ID must be set".to_string())?,
            google_client_secret: std::env::var("GOOGLE_CLIENT_SECRET")
                .map_err(|_| "GOOGLE_CLIENT_SECRET must be set".to_string())?,
            auth_redirect_uri: std::env::var("AUTH_REDIRECT_URI")
                .map_err(|_| "AUTH_REDIRECT_URI must be set".to_string())?,
        })
    }

    /// Check if an email address may sign in.
    pub fn is_email_allowed(&self, email: &str) -> bool {
        self.allowed_emails.is_empty() || self.allowed_emails.contains(&email.trim().to_lowercase())
    }
}

fn parse_allowed_emails(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(allowed: &str) -> AuthConfig {
        AuthConfig {
            jwt_secret: "secret".to_string(),
            allowed_emails: parse_allowed_emails(allowed),
            token_duration_days: 7,
            cookie_name: "auth_token".to_string(),
            google_client_id: "id".to_string(),
            google_client_secret: "secret".to_string(),
            auth_redirect_uri: "http://localhost/callback".to_string(),
        }
    }

    #[test]
    fn test_empty_allowlist_allows_everyone() {
        assert!(config("").is_email_allowed("anyone@example.com"));
        assert!(config(" , ").is_email_allowed("anyone@example.com"));
    }

    #[test]
    fn test_allowlist_is_case_insensitive() {
        let config = config("Ada@Example.com, grace@example.com");
        assert!(config.is_email_allowed("ada@example.com"));
        assert!(config.is_email_allowed("GRACE@example.com"));
        assert!(!config.is_email_allowed("mallory@example.com"));
    }
}
