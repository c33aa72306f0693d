//! Login callback endpoint.
//!
//! Exchanges the authorization code with the identity provider, reconciles
//! local state for the user and redirects to the application with the
//! active organization cookie set.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::auth::selected_org_cookie;
use crate::error::{self, ApiError};
use crate::reconciler::Reconciler;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
}

/// Complete a provider login
#[utoipa::path(
    get,
    path = "/auth/callback",
    params(
        ("code" = Option<String>, Query, description = "Authorization code issued by the provider")
    ),
    responses(
        (status = 303, description = "Login completed; redirect to the application"),
        (status = 400, description = "Missing authorization code", body = ApiError),
        (status = 401, description = "Code rejected by the provider", body = ApiError),
        (status = 502, description = "Provider unreachable", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn login_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<impl IntoResponse, ApiError> {
    let code = params.code.filter(|c| !c.is_empty()).ok_or_else(|| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Missing authorization code",
        )
    })?;

    let authenticated = match state.provider.exchange_code(&code).await {
        Ok(authenticated) => authenticated,
        Err(err) if err.is_unauthorized() => {
            return Err(error::unauthorized(Some("Authorization code rejected")));
        }
        Err(err) => return Err(error::provider_error(&err)),
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        header::LOCATION,
        HeaderValue::from_str(&state.config.post_login_redirect)
            .unwrap_or_else(|_| HeaderValue::from_static("/")),
    );

    // Reconciliation is best effort here: a failure should not block login,
    // the next request or webhook delivery will converge the mirror.
    let reconciler = Reconciler::new(state.db.clone(), state.provider.clone());
    match reconciler.reconcile_login_state(&authenticated.user).await {
        Ok(selected_organization) => {
            let cookie = selected_org_cookie(&selected_organization, state.config.cookie_secure());
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                headers.insert(header::SET_COOKIE, value);
            }
        }
        Err(err) => {
            tracing::error!(
                user_id = %authenticated.user.id,
                "login reconciliation failed: {}",
                err
            );
        }
    }

    Ok((StatusCode::SEE_OTHER, headers))
}
