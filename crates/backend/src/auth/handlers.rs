//! Authentication HTTP handlers.

use axum::extract::Query;
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;

use crate::db::{self, users::GoogleTokens};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

use super::middleware::{
    build_auth_cookie, build_logout_cookie, build_state_cookie, extract_auth_user,
    extract_token_from_cookie,
};
use super::{
    jwt,
    types::{AuthConfig, AuthUser, AuthUserResponse, LoginInitResponse, GOOGLE_SCOPES},
};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

const OAUTH_STATE_COOKIE: &str = "oauth_state";
const OAUTH_STATE_PATH: &str = "/api/auth";
const OAUTH_STATE_MAX_AGE_SECS: i64 = 600;
const CLEAR_OAUTH_STATE_COOKIE: &str = "oauth_state=; Path=/api/auth; HttpOnly; SameSite=Lax; Max-Age=0";

fn google_auth_url(config: &AuthConfig, csrf_state: &str) -> String {
    format!(
        "{}?\
         client_id={}&\
         redirect_uri={}&\
         response_type=code&\
         scope={}&\
         access_type=offline&\
         prompt=consent&\
         state={}",
        GOOGLE_AUTH_URL,
        urlencoding::encode(&config.google_client_id),
        urlencoding::encode(&config.auth_redirect_uri),
        urlencoding::encode(&GOOGLE_SCOPES.join(" ")),
        csrf_state
    )
}

/// Start Google OAuth login flow.
///
/// Returns a URL that the client should redirect the user to, and pins the
/// `state` it carries in a cookie that the callback checks.
pub async fn auth_login(State(state): State<AppState>) -> impl IntoResponse {
    let csrf_state = uuid::Uuid::new_v4().to_string();
    let auth_url = google_auth_url(&state.auth_config, &csrf_state);
    let cookie = build_state_cookie(
        OAUTH_STATE_COOKIE,
        &csrf_state,
        OAUTH_STATE_PATH,
        OAUTH_STATE_MAX_AGE_SECS,
    );

    ([(header::SET_COOKIE, cookie)], Json(LoginInitResponse { auth_url }))
}

#[derive(Debug, Deserialize)]
pub struct AuthCallbackParams {
    pub code: String,
    pub state: String,
}

/// The callback must come from the browser that started the login.
fn state_matches(headers: &HeaderMap, returned: &str) -> bool {
    match extract_token_from_cookie(headers, OAUTH_STATE_COOKIE) {
        Some(expected) => !expected.is_empty() && expected == returned,
        None => false,
    }
}

fn with_cleared_state(mut response: Response) -> Response {
    response.headers_mut().append(
        header::SET_COOKIE,
        HeaderValue::from_static(CLEAR_OAUTH_STATE_COOKIE),
    );
    response
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    email: String,
    name: Option<String>,
}

/// Handle Google OAuth callback.
///
/// Exchanges the authorization code for tokens, checks the allowlist,
/// records the user with their Google tokens and sets the auth cookie.
pub async fn auth_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AuthCallbackParams>,
) -> Response {
    if !state_matches(&headers, &params.state) {
        tracing::warn!("OAuth callback with missing or mismatched state");
        return with_cleared_state(Redirect::to("/?auth_error=invalid_state").into_response());
    }

    let response = match handle_callback_inner(&state, params).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Auth callback error: {:?}", e);
            Redirect::to("/?auth_error=auth_failed").into_response()
        }
    };
    with_cleared_state(response)
}

async fn handle_callback_inner(
    state: &AppState,
    params: AuthCallbackParams,
) -> Result<Response, ApiError> {
    let config = &state.auth_config;
    let client = &state.http;

    #[derive(serde::Serialize)]
    struct TokenRequest<'a> {
        code: &'a str,
        client_id: &'a str,
        client_secret: &'a str,
        redirect_uri: &'a str,
        grant_type: &'a str,
    }

    let token_response = client
        .post(GOOGLE_TOKEN_URL)
        .form(&TokenRequest {
            code: &params.code,
            client_id: &config.google_client_id,
            client_secret: &config.google_client_secret,
            redirect_uri: &config.auth_redirect_uri,
            grant_type: "authorization_code",
        })
        .send()
        .await
        .map_err(|e| ApiError::upstream(anyhow::anyhow!("Token exchange failed: {}", e)))?;

    if !token_response.status().is_success() {
        let status = token_response.status();
        let body = token_response.text().await.unwrap_or_default();
        tracing::error!("Token exchange failed: {} - {}", status, body);
        return Ok(Redirect::to("/?auth_error=token_exchange_failed").into_response());
    }

    let tokens: GoogleTokenResponse = token_response
        .json()
        .await
        .map_err(|e| ApiError::upstream(anyhow::anyhow!("Invalid token response: {}", e)))?;

    let user_info: GoogleUserInfo = client
        .get(GOOGLE_USERINFO_URL)
        .bearer_auth(&tokens.access_token)
        .send()
        .await
        .map_err(|e| ApiError::upstream(anyhow::anyhow!("Failed to get user info: {}", e)))?
        .json()
        .await
        .map_err(|e| ApiError::upstream(anyhow::anyhow!("Invalid user info response: {}", e)))?;

    tracing::info!("OAuth login attempt from: {}", user_info.email);

    if !config.is_email_allowed(&user_info.email) {
        tracing::warn!("Unauthorized login attempt from: {}", user_info.email);
        return Ok(Redirect::to("/?auth_error=unauthorized_email").into_response());
    }

    if tokens.refresh_token.is_none() {
        tracing::warn!("No refresh token received - keeping any stored one");
    }

    let mut conn = db::get_conn(&state.pool).await?;
    let user = db::users::upsert_login(
        &mut conn,
        &user_info.email,
        user_info.name.as_deref(),
        &GoogleTokens {
            refresh_token: tokens.refresh_token.as_deref(),
            access_token: &tokens.access_token,
            expires_at: tokens
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        },
    )
    .await?;

    let auth_user = AuthUser {
        id: user.id,
        email: user.email,
        name: user.name,
    };
    let token = jwt::create_token(config, &auth_user)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to create token: {}", e)))?;

    let cookie = build_auth_cookie(&config.cookie_name, &token, config.token_duration_days);

    tracing::info!(user_id = %auth_user.id, "Successful login for: {}", auth_user.email);

    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, "/"),
            (header::SET_COOKIE, cookie.as_str()),
        ],
    )
        .into_response())
}

/// Get current authenticated user info.
pub async fn auth_me(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<AuthUserResponse>> {
    let user = extract_auth_user(&headers, &state.auth_config)?;
    Ok(Json(user.into()))
}

/// Logout - clear auth cookie.
pub async fn auth_logout(State(state): State<AppState>) -> impl IntoResponse {
    let cookie = build_logout_cookie(&state.auth_config.cookie_name);

    (
        StatusCode::SEE_OTHER,
        [(header::LOCATION, "/".to_string()), (header::SET_COOKIE, cookie)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_url_requests_offline_calendar_access() {
        let config = AuthConfig {
            jwt_secret: "secret".to_string(),
            allowed_emails: vec![],
            token_duration_days: 7,
            cookie_name: "auth_token".to_string(),
            google_client_id: "client id".to_string(),
            google_client_secret: "secret".to_string(),
            auth_redirect_uri: "http://localhost:3000/api/auth/callback".to_string(),
        };

        let url = google_auth_url(&config, "csrf-123");
        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("client_id=client%20id"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("auth%2Fcalendar"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fapi%2Fauth%2Fcallback"));
        assert!(url.ends_with("state=csrf-123"));
    }

    fn cookie_headers(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn test_callback_state_must_match_cookie() {
        let headers = cookie_headers("theme=dark; oauth_state=csrf-123");
        assert!(state_matches(&headers, "csrf-123"));
        assert!(!state_matches(&headers, "csrf-456"));
        assert!(!state_matches(&headers, ""));
    }

    #[test]
    fn test_callback_without_state_cookie_is_rejected() {
        assert!(!state_matches(&HeaderMap::new(), "csrf-123"));
        assert!(!state_matches(&cookie_headers("auth_token=abc"), "csrf-123"));
        assert!(!state_matches(&cookie_headers("oauth_state="), ""));
    }

    #[test]
    fn test_state_cookie_is_cleared_alongside_session_cookie() {
        let response = (
            StatusCode::SEE_OTHER,
            [(header::SET_COOKIE, "auth_token=abc; Path=/")],
        )
            .into_response();

        let response = with_cleared_state(response);
        let cookies: Vec<_> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].starts_with("auth_token=abc"));
        assert!(cookies[1].starts_with("oauth_state=;"));
        assert!(cookies[1].contains("Path=/api/auth"));
        assert!(cookies[1].contains("Max-Age=0"));
    }
}
