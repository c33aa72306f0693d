//! # Server Configuration
//!
//! Router assembly and server startup for the orgsync API.

use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
};
use sea_orm::DatabaseConnection;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth;
use crate::config::AppConfig;
use crate::handlers;
use crate::provider::IdentityProvider;
use crate::telemetry::{self, TraceContext};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub provider: Arc<dyn IdentityProvider>,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/organizations",
            get(handlers::organizations::list_organizations),
        )
        .route(
            "/organizations/select",
            post(handlers::organizations::select_organization),
        )
        .route(
            "/organizations/members",
            get(handlers::members::list_members),
        )
        .route(
            "/organizations/members/{user_id}",
            axum::routing::patch(handlers::members::update_member_role)
                .delete(handlers::members::remove_member),
        )
        .route(
            "/organizations/invitations",
            get(handlers::invitations::list_invitations)
                .post(handlers::invitations::send_invitation),
        )
        .route(
            "/organizations/invitations/{invitation_id}",
            delete(handlers::invitations::revoke_invitation),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let mut app = Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::health::healthz))
        .route("/auth/callback", get(handlers::callback::login_callback))
        .route(
            "/webhooks/identity",
            post(handlers::webhooks::identity_webhook),
        )
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_context_middleware));

    if let Some(origin) = state.config.cors_allowed_origin.as_deref() {
        match origin.parse::<axum::http::HeaderValue>() {
            Ok(origin_value) => {
                app = app.layer(
                    CorsLayer::new()
                        .allow_origin(origin_value)
                        .allow_methods(tower_http::cors::Any)
                        .allow_headers(tower_http::cors::Any),
                );
            }
            Err(_) => {
                tracing::warn!(origin, "invalid CORS origin; skipping CORS layer");
            }
        }
    }

    app.with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Outermost middleware: install the request's [`TraceContext`] so errors
/// raised anywhere below carry the correlation id, and echo it back in the
/// `x-trace-id` response header.
async fn trace_context_middleware(mut request: Request, next: Next) -> Response {
    let context = TraceContext::for_request(request.headers());
    request.extensions_mut().insert(context.clone());

    let mut response = telemetry::with_trace_context(context.clone(), next.run(request)).await;
    if let Ok(value) = HeaderValue::from_str(&context.trace_id) {
        response.headers_mut().insert("x-trace-id", value);
    }
    response
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
    provider: Arc<dyn IdentityProvider>,
) -> anyhow::Result<()> {
    let addr = config.bind_addr()?;
    let profile = config.profile.clone();

    let state = AppState {
        config: Arc::new(config),
        db,
        provider,
    };
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, profile, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health::healthz,
        crate::handlers::callback::login_callback,
        crate::handlers::webhooks::identity_webhook,
        crate::handlers::organizations::list_organizations,
        crate::handlers::organizations::select_organization,
        crate::handlers::members::list_members,
        crate::handlers::members::update_member_role,
        crate::handlers::members::remove_member,
        crate::handlers::invitations::list_invitations,
        crate::handlers::invitations::send_invitation,
        crate::handlers::invitations::revoke_invitation,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::health::HealthStatus,
            crate::handlers::organizations::OrganizationSummary,
            crate::handlers::organizations::SelectOrganizationRequest,
            crate::handlers::organizations::SelectedOrganizationResponse,
            crate::handlers::members::MemberResponse,
            crate::handlers::members::UpdateRoleRequest,
            crate::handlers::members::RoleUpdatedResponse,
            crate::handlers::invitations::InvitationResponse,
            crate::handlers::invitations::SendInvitationRequest,
        )
    ),
    info(
        title = "Orgsync API",
        description = "Mirrors identity provider organizations, memberships and invitations",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
