//! Decision and management API, driven in-process through the router.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use gatekeeper::{AppState, GatekeeperServer};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;

fn api(state: AppState) -> axum::Router {
    GatekeeperServer::new(state).api_router()
}

fn items_api() -> axum::Router {
    api(AppState::with_rules(common::config(), vec![common::items_rule("http://backend.test")]))
}

async fn send(router: axum::Router, request: Request<Body>) -> Response {
    router.oneshot(request).await.unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::HOST, "auth.test")
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_decision_granted_with_mutated_headers() {
    let response = send(items_api(), get("/decisions/items/42")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-user"], "anonymous");
    assert_eq!(response.headers()["x-item"], "42");
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_decision_does_not_echo_request_content_length() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/decisions/items/1")
        .header(header::HOST, "auth.test")
        .header(header::CONTENT_LENGTH, "5")
        .body(Body::from("hello"))
        .unwrap();
    let response = send(items_api(), request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_ne!(
        response.headers().get(header::CONTENT_LENGTH).map(|v| v.to_str().unwrap()),
        Some("5")
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_decision_ignores_mutated_content_length() {
    let router = api(AppState::with_rules(
        common::config(),
        vec![common::content_length_rule("http://backend.test")],
    ));
    let response = send(router, get("/decisions/anything")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-seen"], "yes");
    assert!(response
        .headers()
        .get_all(header::CONTENT_LENGTH)
        .iter()
        .all(|v| v == "0"));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_decision_without_matching_rule() {
    let response = send(items_api(), get("/decisions/items/abc")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], 404);
    assert_eq!(body["error"]["status"], "Not Found");
}

#[tokio::test]
async fn test_decision_with_ambiguous_rules() {
    let mut other = common::items_rule("http://backend.test");
    other.id = "items-copy".into();
    let router = api(AppState::with_rules(
        common::config(),
        vec![common::items_rule("http://backend.test"), other],
    ));
    let response = send(router, get("/decisions/items/1")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_forwarded_headers_select_the_request() {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/decisions")
        .header(header::HOST, "auth.test")
        .header("x-forwarded-method", "GET")
        .header("x-forwarded-host", "shop.test")
        .header("x-forwarded-uri", "/items/9?expand=1")
        .body(Body::empty())
        .unwrap();
    let response = send(items_api(), request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-item"], "9");
}

#[tokio::test]
async fn test_traefik_decision() {
    let request = Request::builder()
        .uri("/decisions/traefik")
        .header("x-forwarded-method", "GET")
        .header("x-forwarded-proto", "https")
        .header("x-forwarded-host", "shop.test")
        .header("x-forwarded-uri", "/items/3")
        .body(Body::empty())
        .unwrap();
    let response = send(items_api(), request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-item"], "3");

    let response = send(items_api(), get("/decisions/traefik")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_denials_render_through_error_handlers() {
    let rules = vec![
        common::rule(json!({
            "id": "private",
            "match": {"methods": ["GET"], "url": "/private/<.*>"},
            "authenticators": [{"handler": "unauthorized"}],
            "authorizer": {"handler": "allow"},
            "mutators": [{"handler": "noop"}],
            "errors": [{"handler": "www_authenticate", "config": {"realm": "shop"}}]
        })),
        common::rule(json!({
            "id": "admin",
            "match": {"methods": ["GET"], "url": "/admin/<.*>"},
            "authenticators": [{"handler": "anonymous"}],
            "authorizer": {"handler": "deny"},
            "mutators": [{"handler": "noop"}]
        })),
    ];
    let router = api(AppState::with_rules(common::config(), rules));

    let response = send(router.clone(), get("/decisions/private/report")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Basic realm=shop");

    let response = send(router, get("/decisions/admin/users")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], 403);
}

#[tokio::test]
async fn test_error_handler_selected_by_accept_header() {
    let rules = vec![common::rule(json!({
        "id": "app",
        "match": {"methods": ["GET"], "url": "/app/<.*>"},
        "authenticators": [{"handler": "unauthorized"}],
        "authorizer": {"handler": "allow"},
        "mutators": [{"handler": "noop"}],
        "errors": [
            {"handler": "redirect", "config": {
                "return_to_query_param": "return_to",
                "when": [{"error": ["unauthorized"], "request": {"header": {"accept": ["text/html"]}}}]
            }},
            {"handler": "json", "config": {
                "when": [{"error": ["unauthorized"], "request": {"header": {"accept": ["application/json"]}}}]
            }}
        ]
    }))];
    let router = api(AppState::with_rules(common::config(), rules));

    let browser = Request::builder()
        .uri("/decisions/app/home")
        .header(header::HOST, "auth.test")
        .header(header::ACCEPT, "text/html")
        .header("x-forwarded-host", "shop.test")
        .body(Body::empty())
        .unwrap();
    let response = send(router.clone(), browser).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("http://login.test/signin?return_to="));

    let script = Request::builder()
        .uri("/decisions/app/home")
        .header(header::HOST, "auth.test")
        .header(header::ACCEPT, "application/json")
        .body(Body::empty())
        .unwrap();
    let response = send(router, script).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["code"], 401);
}

#[tokio::test]
async fn test_rules_api() {
    let mut rules = Vec::new();
    for i in 0..3 {
        let mut rule = common::items_rule("http://backend.test");
        rule.id = format!("rule-{}", i);
        rules.push(rule);
    }
    let router = api(AppState::with_rules(common::config(), rules));

    let body = body_json(send(router.clone(), get("/rules?limit=2&offset=1")).await).await;
    let ids: Vec<&str> = body.as_array().unwrap().iter().map(|r| r["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["rule-1", "rule-2"]);

    let response = send(router.clone(), get("/rules/rule-0")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["match"]["url"], "/items/<[0-9]+>");
    assert_eq!(body["upstream"]["url"], "http://backend.test");

    let response = send(router, get("/rules/missing")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], 404);
}

#[tokio::test]
async fn test_health_and_version() {
    let mut unreachable = common::config();
    unreachable.access_rules.repositories = vec!["file:///nonexistent/gatekeeper/rules.json".into()];
    let not_loaded = api(AppState::new(unreachable));
    let response = send(not_loaded.clone(), get("/health/alive")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = send(not_loaded, get("/health/ready")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(body_json(response).await["errors"]["rules"].is_string());

    let response = send(items_api(), get("/health/ready")).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Nothing to load counts as loaded.
    let response = send(api(AppState::new(common::config())), get("/health/ready")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(send(items_api(), get("/version")).await).await;
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_jwks_without_key_file() {
    let response = send(items_api(), get("/.well-known/jwks.json")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"keys": []}));
}
