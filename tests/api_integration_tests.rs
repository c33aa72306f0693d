//! End-to-end API tests through the full router: authentication middleware,
//! organization selection, member and invitation endpoints, login callback.

mod test_utils;

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use orgsync::provider::AuthenticatedUser;
use orgsync::repositories::{InvitationRepository, MembershipRepository};
use orgsync::server::create_app;

use test_utils::{
    MockIdentityProvider, provider_user, seed_invitation, seed_membership, seed_organization,
    seed_user, setup_test_db, test_config, test_state,
};

const TOKEN: &str = "token_abc";

async fn seeded_app(
    provider: MockIdentityProvider,
    roles: &[(&str, &str)],
) -> (Router, sea_orm::DatabaseConnection, Arc<MockIdentityProvider>) {
    let db = setup_test_db().await.unwrap();
    seed_organization(&db, "org_1", "Acme").await.unwrap();
    for (user_id, role) in roles {
        seed_user(&db, user_id, &format!("{}@example.com", user_id))
            .await
            .unwrap();
        seed_membership(&db, user_id, "org_1", role).await.unwrap();
    }

    let provider = Arc::new(
        provider.with_access_token(TOKEN, provider_user("user_1", "user_1@example.com")),
    );
    let app = create_app(test_state(db.clone(), provider.clone(), test_config()));
    (app, db, provider)
}

fn authed(request: axum::http::request::Builder) -> axum::http::request::Builder {
    request
        .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
        .header(header::COOKIE, "selected_organization_id=org_1")
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() {
    let (app, _db, _provider) = seeded_app(MockIdentityProvider::new(), &[]).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/organizations")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn invalid_token_is_unauthorized() {
    let (app, _db, _provider) = seeded_app(MockIdentityProvider::new(), &[]).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/organizations")
                .header(header::AUTHORIZATION, "Bearer token_bogus")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn list_organizations_marks_the_selection() {
    let (app, db, _provider) =
        seeded_app(MockIdentityProvider::new(), &[("user_1", "owner")]).await;
    seed_organization(&db, "org_2", "Beta").await.unwrap();
    seed_membership(&db, "user_1", "org_2", "member").await.unwrap();

    let response = app
        .oneshot(
            authed(Request::builder().uri("/organizations"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let organizations = body.as_array().unwrap();
    assert_eq!(organizations.len(), 2);

    let selected: Vec<&Value> = organizations
        .iter()
        .filter(|o| o["selected"] == true)
        .collect();
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0]["id"], "org_1");
    assert_eq!(selected[0]["name"], "Acme");
    assert_eq!(selected[0]["role"], "owner");
}

#[tokio::test]
async fn select_organization_sets_the_cookie() {
    let (app, db, _provider) =
        seeded_app(MockIdentityProvider::new(), &[("user_1", "member")]).await;
    seed_organization(&db, "org_2", "Beta").await.unwrap();
    seed_membership(&db, "user_1", "org_2", "member").await.unwrap();

    let response = app
        .oneshot(
            authed(Request::builder().method("POST").uri("/organizations/select"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "organization_id": "org_2" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("selected_organization_id=org_2"));
    assert!(cookie.contains("HttpOnly"));

    let body = json_body(response).await;
    assert_eq!(body["organization_id"], "org_2");
}

#[tokio::test]
async fn members_endpoint_requires_a_selected_organization() {
    let (app, _db, _provider) =
        seeded_app(MockIdentityProvider::new(), &[("user_1", "owner")]).await;

    // Token but no cookie, and the mirrored user row has no selection.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/organizations/members")
                .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "INVALID_OPERATION");
}

#[tokio::test]
async fn list_members_includes_profiles() {
    let (app, _db, _provider) = seeded_app(
        MockIdentityProvider::new(),
        &[("user_1", "owner"), ("user_2", "member")],
    )
    .await;

    let response = app
        .oneshot(
            authed(Request::builder().uri("/organizations/members"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let members = body.as_array().unwrap();
    assert_eq!(members.len(), 2);
    assert!(
        members
            .iter()
            .any(|m| m["user_id"] == "user_2" && m["email"] == "user_2@example.com")
    );
}

#[tokio::test]
async fn owner_updates_a_member_role_over_http() {
    let (app, db, _provider) = seeded_app(
        MockIdentityProvider::new(),
        &[("user_1", "owner"), ("user_2", "member")],
    )
    .await;

    let response = app
        .oneshot(
            authed(
                Request::builder()
                    .method("PATCH")
                    .uri("/organizations/members/user_2"),
            )
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "role": "admin" }).to_string()))
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["user_id"], "user_2");
    assert_eq!(body["role"], "admin");

    let membership = MembershipRepository::new(&db)
        .find("user_2", "org_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(membership.role, "admin");
}

#[tokio::test]
async fn member_is_forbidden_from_removal_over_http() {
    let (app, _db, _provider) = seeded_app(
        MockIdentityProvider::new(),
        &[("user_1", "member"), ("user_2", "member")],
    )
    .await;

    let response = app
        .oneshot(
            authed(
                Request::builder()
                    .method("DELETE")
                    .uri("/organizations/members/user_2"),
            )
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["code"], "PERMISSION_DENIED");
}

#[tokio::test]
async fn admin_removes_a_member_over_http() {
    let (app, db, _provider) = seeded_app(
        MockIdentityProvider::new(),
        &[("user_1", "admin"), ("user_2", "member")],
    )
    .await;

    let response = app
        .oneshot(
            authed(
                Request::builder()
                    .method("DELETE")
                    .uri("/organizations/members/user_2"),
            )
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(
        MembershipRepository::new(&db)
            .find("user_2", "org_1")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn invitation_lifecycle_over_http() {
    let (app, db, _provider) =
        seeded_app(MockIdentityProvider::new(), &[("user_1", "admin")]).await;

    // Send.
    let response = app
        .clone()
        .oneshot(
            authed(
                Request::builder()
                    .method("POST")
                    .uri("/organizations/invitations"),
            )
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "email": "new@example.com", "role": "member" }).to_string(),
            ))
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["email"], "new@example.com");
    assert_eq!(body["status"], "pending");
    let invitation_id = body["id"].as_str().unwrap().to_string();

    // List shows it.
    let response = app
        .clone()
        .oneshot(
            authed(Request::builder().uri("/organizations/invitations"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    // Duplicate conflicts.
    let response = app
        .clone()
        .oneshot(
            authed(
                Request::builder()
                    .method("POST")
                    .uri("/organizations/invitations"),
            )
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "email": "new@example.com" }).to_string()))
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Revoke.
    let response = app
        .oneshot(
            authed(Request::builder().method("DELETE").uri(format!(
                "/organizations/invitations/{}",
                invitation_id
            )))
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let invitation = InvitationRepository::new(&db)
        .find_by_id(&invitation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(invitation.status, "revoked");
}

#[tokio::test]
async fn any_member_can_list_invitations() {
    let (app, db, _provider) =
        seeded_app(MockIdentityProvider::new(), &[("user_1", "member")]).await;
    seed_invitation(&db, "invite_1", "org_1", "new@example.com")
        .await
        .unwrap();

    let response = app
        .oneshot(
            authed(Request::builder().uri("/organizations/invitations"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn non_member_cannot_list_invitations_of_a_forged_selection() {
    let (app, db, _provider) = seeded_app(MockIdentityProvider::new(), &[]).await;
    seed_organization(&db, "org_secret", "Secret").await.unwrap();
    seed_user(&db, "user_insider", "insider@example.com")
        .await
        .unwrap();
    seed_membership(&db, "user_insider", "org_secret", "owner")
        .await
        .unwrap();
    seed_invitation(&db, "invite_1", "org_secret", "new@example.com")
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/organizations/invitations")
                .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
                .header(header::COOKIE, "selected_organization_id=org_secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn non_member_cannot_list_members_of_a_forged_selection() {
    let (app, db, _provider) = seeded_app(MockIdentityProvider::new(), &[]).await;
    seed_organization(&db, "org_secret", "Secret").await.unwrap();
    seed_user(&db, "user_insider", "insider@example.com")
        .await
        .unwrap();
    seed_membership(&db, "user_insider", "org_secret", "owner")
        .await
        .unwrap();

    // Authenticated, but not a member of org_secret; the cookie is attacker
    // controlled and must not expose the roster.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/organizations/members")
                .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
                .header(header::COOKIE, "selected_organization_id=org_secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["code"], "PERMISSION_DENIED");
    assert!(body.get("email").is_none());
}

#[tokio::test]
async fn login_callback_redirects_and_sets_cookie() {
    let db = setup_test_db().await.unwrap();
    let provider = Arc::new(MockIdentityProvider::new().with_exchangeable_code(
        "code_123",
        AuthenticatedUser {
            user: provider_user("user_1", "ada@example.com"),
            access_token: TOKEN.to_string(),
        },
    ));
    let app = create_app(test_state(db.clone(), provider, test_config()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/callback?code=code_123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/");

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(cookie.starts_with("selected_organization_id="));

    // First login provisioned the personal organization.
    let memberships = MembershipRepository::new(&db)
        .list_for_user("user_1")
        .await
        .unwrap();
    assert_eq!(memberships.len(), 1);
    assert_eq!(memberships[0].role, "owner");
}

#[tokio::test]
async fn login_callback_without_code_is_bad_request() {
    let db = setup_test_db().await.unwrap();
    let provider = Arc::new(MockIdentityProvider::new());
    let app = create_app(test_state(db, provider, test_config()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/callback")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_callback_with_rejected_code_is_unauthorized() {
    let db = setup_test_db().await.unwrap();
    let provider = Arc::new(MockIdentityProvider::new());
    let app = create_app(test_state(db, provider, test_config()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/callback?code=code_bogus")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn errors_are_problem_json() {
    let (app, _db, _provider) = seeded_app(MockIdentityProvider::new(), &[]).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/organizations")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/problem+json"
    );
    let body = json_body(response).await;
    assert_eq!(body["status"], 401);
    assert!(body["trace_id"].as_str().is_some());
}

#[tokio::test]
async fn request_id_flows_into_problem_responses() {
    let (app, _db, _provider) = seeded_app(MockIdentityProvider::new(), &[]).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/organizations")
                .header("x-request-id", "req-test-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get("x-trace-id").unwrap(),
        "req-test-123"
    );
    let body = json_body(response).await;
    assert_eq!(body["trace_id"], "req-test-123");
}
