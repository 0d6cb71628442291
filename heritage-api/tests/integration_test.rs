/// Integration tests for the Heritage API
///
/// The first group drives the full router with a database that is never
/// reached: authentication, routing, request validation and the error
/// envelope all answer before any query runs.
///
/// The second group needs PostgreSQL (`TEST_DATABASE_URL`) and walks the
/// main flows end-to-end: registration, families and roles, invitations,
/// the publication workflow, genealogy. Some of them race two requests
/// against each other and check that the database stays consistent.

mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use common::{access_token, offline_app, refresh_token, send, TestContext, SECRET};
use heritage_shared::auth::jwt::{create_token, Claims, TokenType};
use serde_json::json;
use tower::Service as _;
use uuid::Uuid;

#[tokio::test]
async fn test_protected_route_requires_token() {
    let (app, _uploads) = offline_app();

    let (status, body) = send(&app, Method::GET, "/v1/families", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);
    assert_eq!(body["error"], "unauthorized");
    assert_eq!(body["message"], "Missing credentials");
    assert_eq!(body["path"], "/v1/families");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_garbage_token_rejected() {
    let (app, _uploads) = offline_app();

    let (status, body) = send(&app, Method::GET, "/v1/users/me", Some("not-a-jwt"), None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid token");
}

#[tokio::test]
async fn test_token_signed_with_other_secret_rejected() {
    let (app, _uploads) = offline_app();
    let claims = Claims::new(Uuid::new_v4(), "ada@example.com", TokenType::Access);
    let token = create_token(&claims, "some-other-secret-that-is-long-enough").unwrap();

    let (status, _) = send(&app, Method::GET, "/v1/users/me", Some(&token), None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let (app, _uploads) = offline_app();
    let claims = Claims::with_expiration(
        Uuid::new_v4(),
        "ada@example.com",
        TokenType::Access,
        chrono::Duration::hours(-2),
    );
    let token = create_token(&claims, SECRET).unwrap();

    let (status, body) = send(&app, Method::GET, "/v1/notifications", Some(&token), None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Token expired");
}

#[tokio::test]
async fn test_refresh_token_is_not_an_access_token() {
    let (app, _uploads) = offline_app();
    let token = refresh_token(Uuid::new_v4(), "ada@example.com");

    let (status, body) = send(&app, Method::GET, "/v1/families", Some(&token), None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Access token required");
}

#[tokio::test]
async fn test_non_bearer_scheme_rejected() {
    let (app, _uploads) = offline_app();

    let request = Request::builder()
        .uri("/v1/families")
        .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().call(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_route_gets_not_found_envelope() {
    let (app, _uploads) = offline_app();

    let (status, body) = send(&app, Method::GET, "/no/such/route", None, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["path"], "/no/such/route");
}

#[tokio::test]
async fn test_wrong_method_gets_envelope() {
    let (app, _uploads) = offline_app();

    let (status, body) = send(&app, Method::DELETE, "/health", None, None).await;

    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["status"], 405);
    assert_eq!(body["path"], "/health");
}

#[tokio::test]
async fn test_missing_upload_gets_envelope() {
    let (app, _uploads) = offline_app();

    let (status, body) = send(&app, Method::GET, "/uploads/missing.jpg", None, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_stored_upload_is_served() {
    let (app, uploads) = offline_app();
    std::fs::write(uploads.path().join("portrait.txt"), b"grandma").unwrap();

    let request = Request::builder()
        .uri("/uploads/portrait.txt")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().call(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"grandma");
}

#[tokio::test]
async fn test_malformed_path_id_is_bad_request() {
    let (app, _uploads) = offline_app();
    let token = access_token(Uuid::new_v4(), "ada@example.com");

    let (status, body) = send(&app, Method::GET, "/v1/families/not-a-uuid", Some(&token), None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_invalid_body_is_unprocessable() {
    let (app, _uploads) = offline_app();
    let token = access_token(Uuid::new_v4(), "ada@example.com");

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/families",
        Some(&token),
        Some(json!({ "name": "" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["details"][0]["field"], "name");
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let (app, _uploads) = offline_app();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().call(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_weak_password_rejected_before_lookup() {
    let (app, _uploads) = offline_app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/auth/register",
        None,
        Some(json!({
            "email": "ada@example.com",
            "password": "password",
            "display_name": "Ada",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"][0]["field"], "password");
}

#[tokio::test]
async fn test_out_of_range_pagination_is_unprocessable() {
    let (app, _uploads) = offline_app();
    let token = access_token(Uuid::new_v4(), "ada@example.com");

    let (status, _) = send(
        &app,
        Method::GET,
        "/v1/notifications?limit=500",
        Some(&token),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_values_longer_than_their_columns_are_unprocessable() {
    let (app, _uploads) = offline_app();
    let token = access_token(Uuid::new_v4(), "ada@example.com");

    let (status, body) = send(
        &app,
        Method::PUT,
        "/v1/users/me",
        Some(&token),
        Some(json!({ "avatar_url": format!("https://example.com/{}", "a".repeat(588)) })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"][0]["field"], "avatar_url");

    let uri = format!("/v1/families/{}/trees/{}/members", Uuid::new_v4(), Uuid::new_v4());
    let (status, body) = send(
        &app,
        Method::POST,
        &uri,
        Some(&token),
        Some(json!({ "first_name": "Mai", "birth_place": "p".repeat(180) })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"][0]["field"], "birth_place");
}

#[tokio::test]
async fn test_security_headers_present() {
    let (app, _uploads) = offline_app();

    let request = Request::builder()
        .uri("/no/such/route")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().call(request).await.unwrap();
    let headers = response.headers();

    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert!(headers.get("content-security-policy").is_some());
    // Only sent in production
    assert!(headers.get("strict-transport-security").is_none());
}

#[tokio::test]
async fn test_health_reports_degraded_without_database() {
    let (app, _uploads) = offline_app();

    let (status, body) = send(&app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["database"], "disconnected");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

// Database-backed flows

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_register_login_refresh() {
    let ctx = TestContext::new().await.unwrap();
    let ada = ctx.register("ada").await;

    let (status, body) = send(
        &ctx.app,
        Method::POST,
        "/v1/auth/register",
        None,
        Some(json!({
            "email": ada.email.to_uppercase(),
            "password": common::PASSWORD,
            "display_name": "Ada again",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);

    let (status, _) = send(
        &ctx.app,
        Method::POST,
        "/v1/auth/login",
        None,
        Some(json!({ "email": ada.email, "password": "Wrong#Password1" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &ctx.app,
        Method::POST,
        "/v1/auth/login",
        None,
        Some(json!({ "email": ada.email, "password": common::PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "Bearer");

    let (status, body) = send(
        &ctx.app,
        Method::POST,
        "/v1/auth/refresh",
        None,
        Some(json!({ "refresh_token": ada.refresh_token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let fresh = body["access_token"].as_str().unwrap().to_string();

    let (status, me) = send(&ctx.app, Method::GET, "/v1/users/me", Some(&fresh), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], ada.id.to_string());
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_family_roles_and_invitations() {
    let ctx = TestContext::new().await.unwrap();
    let admin = ctx.register("admin").await;
    let reader = ctx.register("reader").await;
    let outsider = ctx.register("outsider").await;

    let family_id = ctx.create_family(&admin, "The Okafors").await;
    let family_uri = format!("/v1/families/{}", family_id);

    let (status, _) = send(&ctx.app, Method::GET, &family_uri, Some(&outsider.access_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    ctx.join(&admin, family_id, &reader, "reader").await;

    let (status, members) = send(
        &ctx.app,
        Method::GET,
        &format!("{}/members", family_uri),
        Some(&reader.access_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(members.as_array().unwrap().len(), 2);

    let (status, _) = send(
        &ctx.app,
        Method::PUT,
        &family_uri,
        Some(&reader.access_token),
        Some(json!({ "name": "Renamed" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The only admin cannot step down
    let (status, _) = send(
        &ctx.app,
        Method::PUT,
        &format!("{}/members/{}", family_uri, admin.id),
        Some(&admin.access_token),
        Some(json!({ "role": "reader" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &ctx.app,
        Method::POST,
        &format!("{}/leave", family_uri),
        Some(&admin.access_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    ctx.cleanup_family(family_id).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_publication_workflow() {
    let ctx = TestContext::new().await.unwrap();
    let admin = ctx.register("admin").await;
    let editor = ctx.register("editor").await;
    let reader = ctx.register("reader").await;

    let family_id = ctx.create_family(&admin, "The Nguyens").await;
    ctx.join(&admin, family_id, &editor, "editor").await;
    ctx.join(&admin, family_id, &reader, "reader").await;

    let contents_uri = format!("/v1/families/{}/contents", family_id);
    let (status, content) = send(
        &ctx.app,
        Method::POST,
        &contents_uri,
        Some(&editor.access_token),
        Some(json!({
            "content_type": "proverb",
            "title": "Still water",
            "body": "Still water runs deep.",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", content);
    assert_eq!(content["status"], "draft");
    let content_uri = format!("{}/{}", contents_uri, content["id"].as_str().unwrap());

    // Drafts are invisible to readers
    let (status, _) = send(&ctx.app, Method::GET, &content_uri, Some(&reader.access_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Editors cannot publish directly
    let (status, _) = send(
        &ctx.app,
        Method::PUT,
        &format!("{}/status", content_uri),
        Some(&editor.access_token),
        Some(json!({ "status": "published" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let requests_uri = format!("/v1/families/{}/publication-requests", family_id);
    let (status, request) = send(
        &ctx.app,
        Method::POST,
        &requests_uri,
        Some(&editor.access_token),
        Some(json!({ "content_id": content["id"], "message": "Ready" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", request);

    let (status, _) = send(
        &ctx.app,
        Method::POST,
        &requests_uri,
        Some(&editor.access_token),
        Some(json!({ "content_id": content["id"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let review_uri = format!("{}/{}/review", requests_uri, request["id"].as_str().unwrap());
    let (status, review) = send(
        &ctx.app,
        Method::POST,
        &review_uri,
        Some(&admin.access_token),
        Some(json!({ "decision": "approve" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", review);
    assert_eq!(review["request"]["status"], "approved");
    assert_eq!(review["content"]["status"], "published");

    let (status, visible) = send(&ctx.app, Method::GET, &content_uri, Some(&reader.access_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(visible["status"], "published");

    // Reviewing twice is refused
    let (status, _) = send(
        &ctx.app,
        Method::POST,
        &review_uri,
        Some(&admin.access_token),
        Some(json!({ "decision": "reject" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, unread) = send(
        &ctx.app,
        Method::GET,
        "/v1/notifications/unread-count",
        Some(&reader.access_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(unread["unread"].as_i64().unwrap() >= 1);

    ctx.cleanup_family(family_id).await;
}

async fn admin_count(ctx: &TestContext, family_id: Uuid) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM family_memberships WHERE family_id = $1 AND role = 'admin'",
    )
    .bind(family_id)
    .fetch_one(&ctx.db)
    .await
    .unwrap()
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_last_admin_cannot_be_demoted_or_removed() {
    let ctx = TestContext::new().await.unwrap();
    let admin = ctx.register("admin").await;
    let second = ctx.register("second").await;

    let family_id = ctx.create_family(&admin, "The Haddads").await;
    ctx.join(&admin, family_id, &second, "admin").await;
    let members_uri = format!("/v1/families/{}/members", family_id);

    let (status, _) = send(
        &ctx.app,
        Method::DELETE,
        &format!("{}/{}", members_uri, second.id),
        Some(&admin.access_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(
        &ctx.app,
        Method::PUT,
        &format!("{}/{}", members_uri, admin.id),
        Some(&admin.access_token),
        Some(json!({ "role": "editor" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);

    let (status, _) = send(
        &ctx.app,
        Method::DELETE,
        &format!("{}/{}", members_uri, admin.id),
        Some(&admin.access_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    assert_eq!(admin_count(&ctx, family_id).await, 1);

    ctx.cleanup_family(family_id).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_concurrent_admin_departures_keep_one_admin() {
    let ctx = TestContext::new().await.unwrap();

    for round in 0..10 {
        let first = ctx.register("first").await;
        let second = ctx.register("second").await;
        let family_id = ctx.create_family(&first, &format!("Departures {}", round)).await;
        ctx.join(&first, family_id, &second, "admin").await;

        let leave_uri = format!("/v1/families/{}/leave", family_id);
        let ((a, _), (b, _)) = tokio::join!(
            send(&ctx.app, Method::POST, &leave_uri, Some(&first.access_token), None),
            send(&ctx.app, Method::POST, &leave_uri, Some(&second.access_token), None),
        );

        let mut statuses = [a, b];
        statuses.sort();
        assert_eq!(statuses, [StatusCode::NO_CONTENT, StatusCode::CONFLICT]);
        assert_eq!(admin_count(&ctx, family_id).await, 1);

        ctx.cleanup_family(family_id).await;
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_admins_demoting_each_other_keep_one_admin() {
    let ctx = TestContext::new().await.unwrap();

    for round in 0..10 {
        let first = ctx.register("first").await;
        let second = ctx.register("second").await;
        let family_id = ctx.create_family(&first, &format!("Demotions {}", round)).await;
        ctx.join(&first, family_id, &second, "admin").await;

        let members_uri = format!("/v1/families/{}/members", family_id);
        let first_uri = format!("{}/{}", members_uri, first.id);
        let second_uri = format!("{}/{}", members_uri, second.id);
        let demote = json!({ "role": "reader" });

        let ((a, _), (b, _)) = tokio::join!(
            send(&ctx.app, Method::PUT, &second_uri, Some(&first.access_token), Some(demote.clone())),
            send(&ctx.app, Method::PUT, &first_uri, Some(&second.access_token), Some(demote.clone())),
        );

        // The loser is either no longer an admin or would be the last one
        assert!(a.is_success() != b.is_success(), "{} / {}", a, b);
        assert_eq!(admin_count(&ctx, family_id).await, 1);

        ctx.cleanup_family(family_id).await;
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_concurrent_redemptions_of_one_code() {
    let ctx = TestContext::new().await.unwrap();
    let admin = ctx.register("admin").await;
    let family_id = ctx.create_family(&admin, "The Petrovs").await;

    for _ in 0..5 {
        let first = ctx.register("first").await;
        let second = ctx.register("second").await;

        let (status, invitation) = send(
            &ctx.app,
            Method::POST,
            &format!("/v1/families/{}/invitations", family_id),
            Some(&admin.access_token),
            Some(json!({ "role": "reader" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", invitation);

        let redeem = json!({ "code": invitation["code"] });
        let ((a, _), (b, _)) = tokio::join!(
            send(&ctx.app, Method::POST, "/v1/invitations/redeem", Some(&first.access_token), Some(redeem.clone())),
            send(&ctx.app, Method::POST, "/v1/invitations/redeem", Some(&second.access_token), Some(redeem.clone())),
        );

        let mut statuses = [a, b];
        statuses.sort();
        assert_eq!(statuses, [StatusCode::OK, StatusCode::CONFLICT]);
    }

    let members: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM family_memberships WHERE family_id = $1")
            .bind(family_id)
            .fetch_one(&ctx.db)
            .await
            .unwrap();
    assert_eq!(members, 1 + 5);

    ctx.cleanup_family(family_id).await;
}

/// Creates a tree member; returns its id
async fn add_tree_member(
    ctx: &TestContext,
    token: &str,
    tree_uri: &str,
    body: serde_json::Value,
) -> String {
    let (status, member) = send(
        &ctx.app,
        Method::POST,
        &format!("{}/members", tree_uri),
        Some(token),
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", member);
    member["id"].as_str().unwrap().to_string()
}

async fn create_tree(ctx: &TestContext, token: &str, family_id: Uuid, name: &str) -> String {
    let (status, tree) = send(
        &ctx.app,
        Method::POST,
        &format!("/v1/families/{}/trees", family_id),
        Some(token),
        Some(json!({ "name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", tree);
    format!("/v1/families/{}/trees/{}", family_id, tree["id"].as_str().unwrap())
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_genealogy_rejects_bad_links_and_dates() {
    let ctx = TestContext::new().await.unwrap();
    let admin = ctx.register("admin").await;
    let token = admin.access_token.as_str();
    let family_id = ctx.create_family(&admin, "The Lindqvists").await;

    let tree_uri = create_tree(&ctx, token, family_id, "Paternal").await;
    let other_uri = create_tree(&ctx, token, family_id, "Maternal").await;

    let grandma = add_tree_member(&ctx, token, &tree_uri, json!({ "first_name": "Astrid", "birth_date": "1921-03-04" })).await;
    let mom = add_tree_member(&ctx, token, &tree_uri, json!({ "first_name": "Karin", "parent_id": grandma })).await;
    let cousin = add_tree_member(&ctx, token, &other_uri, json!({ "first_name": "Elsa" })).await;

    // Parent from another tree, on create and on update
    let (status, _) = send(
        &ctx.app,
        Method::POST,
        &format!("{}/members", tree_uri),
        Some(token),
        Some(json!({ "first_name": "Nils", "parent_id": cousin })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &ctx.app,
        Method::PUT,
        &format!("{}/members/{}", tree_uri, mom),
        Some(token),
        Some(json!({ "parent_id": cousin })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Grandma under her own daughter
    let (status, body) = send(
        &ctx.app,
        Method::PUT,
        &format!("{}/members/{}", tree_uri, grandma),
        Some(token),
        Some(json!({ "parent_id": mom })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Parent change would create a cycle");

    let (status, _) = send(
        &ctx.app,
        Method::PUT,
        &format!("{}/members/{}", tree_uri, grandma),
        Some(token),
        Some(json!({ "death_date": "1919-01-01" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &ctx.app,
        Method::POST,
        &format!("{}/members", tree_uri),
        Some(token),
        Some(json!({ "first_name": "Olof", "birth_date": "1950-01-01", "death_date": "1949-12-31" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    ctx.cleanup_family(family_id).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_crossing_parent_changes_never_store_a_cycle() {
    let ctx = TestContext::new().await.unwrap();
    let admin = ctx.register("admin").await;
    let token = admin.access_token.as_str();
    let family_id = ctx.create_family(&admin, "The Moreaus").await;

    for round in 0..10 {
        let tree_uri = create_tree(&ctx, token, family_id, &format!("Branch {}", round)).await;
        let x = add_tree_member(&ctx, token, &tree_uri, json!({ "first_name": "Xavier" })).await;
        let y = add_tree_member(&ctx, token, &tree_uri, json!({ "first_name": "Yvonne" })).await;

        let x_uri = format!("{}/members/{}", tree_uri, x);
        let y_uri = format!("{}/members/{}", tree_uri, y);
        let ((a, _), (b, _)) = tokio::join!(
            send(&ctx.app, Method::PUT, &x_uri, Some(token), Some(json!({ "parent_id": y }))),
            send(&ctx.app, Method::PUT, &y_uri, Some(token), Some(json!({ "parent_id": x }))),
        );

        let mut statuses = [a, b];
        statuses.sort();
        assert_eq!(statuses, [StatusCode::OK, StatusCode::BAD_REQUEST]);

        let (status, tree) = send(&ctx.app, Method::GET, &tree_uri, Some(token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tree["roots"].as_array().unwrap().len(), 1);
        assert_eq!(tree["roots"][0]["children"].as_array().unwrap().len(), 1);
    }

    ctx.cleanup_family(family_id).await;
}
