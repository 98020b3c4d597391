use super::WebError;
use super::routes::AppState;
use crate::clock::client_offset;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

/// Set by the session layer in front of this service.
pub const AUTH_HANDLE_HEADER: &str = "x-auth-handle";
/// Client `Date.getTimezoneOffset()` in minutes, positive west of UTC.
pub const TIMEZONE_OFFSET_HEADER: &str = "x-timezone-offset";
pub const ADMIN_USERNAME_HEADER: &str = "x-admin-username";
pub const ADMIN_PASSWORD_HEADER: &str = "x-admin-password";

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// The session handle, if any. Not validated.
pub struct SessionHandle(pub Option<String>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for SessionHandle {
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(header(parts, AUTH_HANDLE_HEADER).map(str::to_string)))
    }
}

/// A logged-in, non-banned member; carries the normalised handle.
pub struct Member(pub String);

#[async_trait]
impl FromRequestParts<AppState> for Member {
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let handle = header(parts, AUTH_HANDLE_HEADER).ok_or(WebError::NotLoggedIn)?;
        Ok(Self(state.gate.member(handle).await?))
    }
}

/// Request authenticated with the configured admin credentials.
pub struct Admin;

#[async_trait]
impl FromRequestParts<AppState> for Admin {
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let username = header(parts, ADMIN_USERNAME_HEADER).unwrap_or_default();
        let password = header(parts, ADMIN_PASSWORD_HEADER).unwrap_or_default();
        state.admin.login(username, password)?;
        Ok(Self)
    }
}

/// Optional client time-zone offset, range-checked.
pub struct ClientTimezone(pub Option<i32>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientTimezone {
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(raw) = header(parts, TIMEZONE_OFFSET_HEADER) else {
            return Ok(Self(None));
        };
        let minutes: i32 = raw
            .parse()
            .map_err(|_| WebError::Input(format!("{} must be an integer number of minutes", TIMEZONE_OFFSET_HEADER)))?;
        client_offset(minutes)?;
        Ok(Self(Some(minutes)))
    }
}
