//! Request authentication and session context.
//!
//! Protected routes require a bearer access token issued by the identity
//! provider; the middleware resolves it to a user and attaches a
//! [`SessionContext`] extension. The active organization travels in the
//! `selected_organization_id` cookie, falling back to the mirrored user row.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::{self, ApiError};
use crate::repositories::UserRepository;
use crate::server::AppState;

/// Cookie carrying the active organization id.
pub const SELECTED_ORG_COOKIE: &str = "selected_organization_id";

/// Cookie lifetime: one year.
pub const SELECTED_ORG_COOKIE_MAX_AGE: u64 = 31_536_000;

/// Authenticated user identity for the current request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
}

/// Per-request session state injected by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user: CurrentUser,
    pub selected_organization_id: Option<String>,
}

impl SessionContext {
    /// The active organization, or a 400 when none is selected.
    pub fn require_selected_org(&self) -> Result<&str, ApiError> {
        self.selected_organization_id.as_deref().ok_or_else(|| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                "INVALID_OPERATION",
                "No organization selected",
            )
        })
    }
}

impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionContext>()
            .cloned()
            .ok_or_else(|| error::unauthorized(Some("Missing session context")))
    }
}

/// Build the `Set-Cookie` value persisting the active organization.
pub fn selected_org_cookie(organization_id: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SELECTED_ORG_COOKIE, organization_id, SELECTED_ORG_COOKIE_MAX_AGE
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Read the active organization cookie from request headers.
pub fn selected_org_from_headers(headers: &HeaderMap) -> Option<String> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in cookie_header.split(';') {
        let Some((name, value)) = pair.trim().split_once('=') else {
            continue;
        };
        if name == SELECTED_ORG_COOKIE && !value.is_empty() {
            return Some(value.to_string());
        }
    }
    None
}

/// Authenticate the request and attach a [`SessionContext`] extension.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match bearer_token(request.headers()) {
        Some(token) => token,
        None => {
            return error::unauthorized(Some("Missing bearer token")).into_response();
        }
    };

    let user = match state.provider.introspect_token(&token).await {
        Ok(user) => user,
        Err(err) if err.is_unauthorized() => {
            return error::unauthorized(Some("Invalid or expired access token")).into_response();
        }
        Err(err) => {
            return error::provider_error(&err).into_response();
        }
    };

    let selected_organization_id = match selected_org_from_headers(request.headers()) {
        Some(from_cookie) => Some(from_cookie),
        None => match UserRepository::new(&state.db).find_by_id(&user.id).await {
            Ok(row) => row.and_then(|r| r.selected_organization_id),
            Err(err) => {
                return ApiError::from(err).into_response();
            }
        },
    };

    let session = SessionContext {
        user: CurrentUser {
            id: user.id,
            email: user.email,
        },
        selected_organization_id,
    };
    request.extensions_mut().insert(session);

    next.run(request).await
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
}
