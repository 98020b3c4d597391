use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use chrono::{Duration, TimeZone, Utc};
use pointgate::identity::BCRYPT_MIN_COST;
use pointgate::web::{AppState, build_router};
use pointgate::{AccrualZone, AdminConsole, AdminCredentials, ManualClock, MemoryKvStore, PointGate};
use serde_json::{Value, json};
use tower::ServiceExt;

const ADMIN: (&str, &str) = ("root", "admin-password");

struct TestApp {
    router: Router,
    clock: Arc<ManualClock>,
}

fn app() -> TestApp {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap()));
    let gate = Arc::new(
        PointGate::builder(Arc::new(MemoryKvStore::new()))
            .clock(clock.clone())
            .zone(AccrualZone::utc())
            .bcrypt_cost(BCRYPT_MIN_COST)
            .build(),
    );
    let admin = Arc::new(AdminConsole::new(gate.clone(), AdminCredentials::new(ADMIN.0, ADMIN.1)));
    TestApp {
        router: build_router(AppState::new(gate, admin)),
        clock,
    }
}

enum Caller<'a> {
    Anonymous,
    Member(&'a str),
    Admin,
}

async fn send(app: &Router, method: Method, uri: &str, caller: Caller<'_>, payload: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    match caller {
        Caller::Anonymous => {}
        Caller::Member(handle) => builder = builder.header("x-auth-handle", handle),
        Caller::Admin => {
            builder = builder
                .header("x-admin-username", ADMIN.0)
                .header("x-admin-password", ADMIN.1)
        }
    }
    let body = match payload {
        Some(payload) => {
            builder = builder.header("content-type", "application/json");
            Body::from(payload.to_string())
        }
        None => Body::empty(),
    };
    let request = builder.body(body).expect("request should build");

    let response = app.clone().oneshot(request).await.expect("response expected");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should be readable");

    if body.is_empty() {
        return (status, Value::Null);
    }
    let json = serde_json::from_slice::<Value>(&body).expect("body should be valid JSON");
    (status, json)
}

#[tokio::test]
async fn health() {
    let app = app();
    let (status, body) = send(&app.router, Method::GET, "/health", Caller::Anonymous, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn member_status_and_check_in() {
    let app = app();
    let router = &app.router;

    let (status, body) = send(router, Method::GET, "/api/me/status", Caller::Anonymous, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "not_logged_in");

    let (status, body) = send(router, Method::GET, "/api/me/status", Caller::Member("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["points"], 20.0);
    assert_eq!(body["access_on"], true);
    assert_eq!(body["can_check_in_today"], true);

    let (status, body) = send(router, Method::POST, "/api/me/check-in", Caller::Member("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["points"], 25.0);

    let (status, body) = send(router, Method::POST, "/api/me/check-in", Caller::Member("alice"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "check_in_cooldown");
    assert_eq!(body["next_check_in_at"], "2024-07-02T12:00:00Z");
}

#[tokio::test]
async fn status_reports_client_calendar_day() {
    let app = app();
    app.clock.advance(Duration::hours(11)); // 23:00 UTC
    let request = Request::builder()
        .uri("/api/me/status")
        .header("x-auth-handle", "alice")
        .header("x-timezone-offset", "-120")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["today"], "2024-07-02");
}

#[tokio::test]
async fn toggle_and_access_gate() {
    let app = app();
    let router = &app.router;

    let (_, body) = send(router, Method::GET, "/api/me/access-gate", Caller::Anonymous, None).await;
    assert_eq!(body, json!({"allowed": false, "reason": "NOT_LOGGED_IN"}));

    let (_, body) = send(router, Method::GET, "/api/me/access-gate", Caller::Member("alice"), None).await;
    assert_eq!(body, json!({"allowed": true}));

    let (status, body) = send(
        router,
        Method::POST,
        "/api/me/access",
        Caller::Member("alice"),
        Some(json!({"enabled": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["access_on"], false);

    let (_, body) = send(router, Method::GET, "/api/me/access-gate", Caller::Member("alice"), None).await;
    assert_eq!(body["reason"], "OFF");
}

#[tokio::test]
async fn register_and_change_password() {
    let app = app();
    let router = &app.router;

    let (status, body) = send(
        router,
        Method::POST,
        "/api/register",
        Caller::Anonymous,
        Some(json!({"handle": "Alice", "password": "password123"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["handle"], "alice");
    assert!(body.get("password_hash").is_none());

    let (status, body) = send(
        router,
        Method::POST,
        "/api/register",
        Caller::Anonymous,
        Some(json!({"handle": "alice", "password": "password123"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "handle_taken");

    let (status, _) = send(
        router,
        Method::POST,
        "/api/me/password",
        Caller::Member("alice"),
        Some(json!({"current_password": "password123", "new_password": "password456"})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(
        router,
        Method::POST,
        "/api/me/password",
        Caller::Member("alice"),
        Some(json!({"current_password": "password123", "new_password": "password789"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_credentials");
}

#[tokio::test]
async fn admin_routes_require_credentials() {
    let app = app();
    let (status, body) = send(&app.router, Method::GET, "/api/admin/users", Caller::Anonymous, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_credentials");

    let (status, _) = send(
        &app.router,
        Method::POST,
        "/api/admin/login",
        Caller::Anonymous,
        Some(json!({"username": ADMIN.0, "password": ADMIN.1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn admin_redeem_code_flow() {
    let app = app();
    let router = &app.router;

    let (status, body) = send(
        router,
        Method::POST,
        "/api/admin/redeem-codes",
        Caller::Admin,
        Some(json!({"count": 2, "points": 15})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let codes = body.as_array().unwrap();
    assert_eq!(codes.len(), 2);
    let code = codes[0]["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 12);

    let (status, body) = send(
        router,
        Method::POST,
        "/api/me/redeem",
        Caller::Member("alice"),
        Some(json!({"code": code.to_lowercase()})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["points"], 35.0);
    assert_eq!(body["added_points"], 15.0);

    let (status, body) = send(
        router,
        Method::POST,
        "/api/me/redeem",
        Caller::Member("alice"),
        Some(json!({"code": code})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "code_already_used");

    let (status, _) = send(router, Method::DELETE, &format!("/api/admin/redeem-codes/{code}"), Caller::Admin, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(router, Method::DELETE, "/api/admin/redeem-codes/UNKNOWN", Caller::Admin, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        router,
        Method::POST,
        "/api/admin/redeem-codes",
        Caller::Admin,
        Some(json!({"count": 101, "points": 15})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "invalid_batch");
}

#[tokio::test]
async fn admin_manages_users_and_registration() {
    let app = app();
    let router = &app.router;

    send(
        router,
        Method::POST,
        "/api/register",
        Caller::Anonymous,
        Some(json!({"handle": "alice", "password": "password123"})),
    )
    .await;

    let (status, body) = send(
        router,
        Method::POST,
        "/api/admin/users/alice/points",
        Caller::Admin,
        Some(json!({"action": "subtract", "amount": 2.5})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["points"], 17.5);

    let (_, body) = send(router, Method::GET, "/api/admin/users", Caller::Admin, None).await;
    assert_eq!(body[0]["handle"], "alice");
    assert_eq!(body[0]["points"], 17.5);

    let (status, body) = send(
        router,
        Method::POST,
        "/api/admin/users/alice/ban",
        Caller::Admin,
        Some(json!({"banned": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["banned"], true);

    let (status, body) = send(router, Method::GET, "/api/me/status", Caller::Member("alice"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "banned");
    let (_, body) = send(router, Method::GET, "/api/me/access-gate", Caller::Member("alice"), None).await;
    assert_eq!(body["reason"], "BANNED");

    let (status, body) = send(
        router,
        Method::PUT,
        "/api/admin/settings/registration",
        Caller::Admin,
        Some(json!({"registration_enabled": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["registration_enabled"], false);

    let (status, body) = send(
        router,
        Method::POST,
        "/api/register",
        Caller::Anonymous,
        Some(json!({"handle": "bob", "password": "password123"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "registration_closed");

    let (status, body) = send(router, Method::DELETE, "/api/admin/users/alice", Caller::Admin, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["identity_removed"], true);

    let (_, body) = send(router, Method::GET, "/api/admin/users", Caller::Admin, None).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn leaderboard_over_http() {
    let app = app();
    let router = &app.router;
    for handle in ["alice", "bobby"] {
        send(
            router,
            Method::POST,
            "/api/register",
            Caller::Anonymous,
            Some(json!({"handle": handle, "password": "password123"})),
        )
        .await;
    }
    send(router, Method::POST, "/api/me/check-in", Caller::Member("bobby"), None).await;

    let (status, body) = send(router, Method::GET, "/api/me/leaderboard", Caller::Member("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries"][0]["handle"], "bobby");
    assert_eq!(body["entries"][0]["rank"], 1);
    assert_eq!(body["my_rank"], 2);
    assert_eq!(body["total"], 2);
}
