//! Authentication middleware layer for protecting routes.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::AppState;

use super::jwt;
use super::types::{AuthConfig, AuthUser, Claims};

/// Middleware that requires a valid session.
///
/// Used with `axum::middleware::from_fn_with_state`. On success the
/// [`AuthUser`] is stored in the request extensions for handlers to pick up
/// with `Extension<AuthUser>`.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let config = &state.auth_config;

    let (user, claims) = match authenticate(request.headers(), config) {
        Ok(found) => found,
        Err(err) => return err.into_response(),
    };

    request.extensions_mut().insert(user.clone());
    let response = next.run(request).await;

    // Sliding session: reissue day-old tokens
    if jwt::should_refresh(&claims) {
        if let Ok(new_token) = jwt::create_token(config, &user) {
            let cookie =
                build_auth_cookie(&config.cookie_name, &new_token, config.token_duration_days);
            let (mut parts, body) = response.into_parts();
            if let Ok(cookie_value) = cookie.parse() {
                parts.headers.insert(header::SET_COOKIE, cookie_value);
            }
            return Response::from_parts(parts, body);
        }
    }

    response
}

pub(super) fn extract_token_from_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;

    for cookie_str in cookie_header.split(';') {
        if let Ok(cookie) = cookie::Cookie::parse(cookie_str.trim()) {
            if cookie.name() == cookie_name {
                return Some(cookie.value().to_string());
            }
        }
    }

    None
}

fn extract_token_from_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|s| s.trim().to_string())
}

fn secure_attr() -> &'static str {
    if std::env::var("RUST_ENV").unwrap_or_default() == "production" {
        "; Secure"
    } else {
        ""
    }
}

/// Build an auth cookie string.
pub fn build_auth_cookie(name: &str, value: &str, days: i64) -> String {
    let max_age = days * 24 * 60 * 60;
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
        name,
        value,
        max_age,
        secure_attr()
    )
}

/// Short-lived cookie carrying the OAuth `state` between login and callback.
/// Scoped to `path` so it only travels to the auth routes.
pub fn build_state_cookie(name: &str, value: &str, path: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; Path={}; HttpOnly; SameSite=Lax; Max-Age={}{}",
        name,
        value,
        path,
        max_age_secs,
        secure_attr()
    )
}

/// Cookie that clears the session.
pub fn build_logout_cookie(name: &str) -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", name)
}

fn authenticate(headers: &HeaderMap, config: &AuthConfig) -> Result<(AuthUser, Claims), ApiError> {
    let token = extract_token_from_cookie(headers, &config.cookie_name)
        .or_else(|| extract_token_from_header(headers))
        .ok_or_else(|| ApiError::Unauthorized("Missing authentication".to_string()))?;

    let claims: Claims = jwt::validate_token(config, &token)
        .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))?;

    if !config.is_email_allowed(&claims.email) {
        return Err(ApiError::Forbidden("Email not authorized".to_string()));
    }

    let user = AuthUser::try_from(claims.clone())
        .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))?;

    Ok((user, claims))
}

/// Extract and validate user from request headers.
///
/// Returns the authenticated user if the token is valid and email is allowed.
pub fn extract_auth_user(headers: &HeaderMap, config: &AuthConfig) -> Result<AuthUser, ApiError> {
    authenticate(headers, config).map(|(user, _)| user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};
    use uuid::Uuid;

    fn config(allowed: Vec<String>) -> AuthConfig {
        AuthConfig {
            jwt_secret: "middleware-test-secret".to_string(),
            allowed_emails: allowed,
            token_duration_days: 7,
            cookie_name: "auth_token".to_string(),
            google_client_id: "id".to_string(),
            google_client_secret: "secret".to_string(),
            auth_redirect_uri: "http://localhost/callback".to_string(),
        }
    }

    fn token_for(config: &AuthConfig, email: &str) -> (Uuid, String) {
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: None,
        };
        let token = jwt::create_token(config, &user).unwrap();
        (user.id, token)
    }

    #[test]
    fn test_cookie_and_bearer_are_accepted() {
        let config = config(vec![]);
        let (id, token) = token_for(&config, "ada@example.com");

        let mut cookie_headers = HeaderMap::new();
        cookie_headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; auth_token={}", token)).unwrap(),
        );
        assert_eq!(extract_auth_user(&cookie_headers, &config).unwrap().id, id);

        let mut bearer_headers = HeaderMap::new();
        bearer_headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        assert_eq!(extract_auth_user(&bearer_headers, &config).unwrap().id, id);
    }

    #[test]
    fn test_missing_token_is_unauthorized() {
        let err = extract_auth_user(&HeaderMap::new(), &config(vec![])).unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_email_removed_from_allowlist_is_forbidden() {
        let open = config(vec![]);
        let (_, token) = token_for(&open, "mallory@example.com");

        let restricted = config(vec!["ada@example.com".to_string()]);
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        let err = extract_auth_user(&headers, &restricted).unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_state_cookie_is_scoped_and_short_lived() {
        let cookie = build_state_cookie("oauth_state", "abc", "/api/auth", 600);
        assert!(cookie.starts_with("oauth_state=abc; Path=/api/auth; HttpOnly"));
        assert!(cookie.contains("Max-Age=600"));
    }

    #[test]
    fn test_logout_cookie_expires_immediately() {
        assert!(build_logout_cookie("auth_token").contains("Max-Age=0"));
        assert!(build_auth_cookie("auth_token", "abc", 7).contains("Max-Age=604800"));
    }
}
