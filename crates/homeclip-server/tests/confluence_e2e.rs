//! End-to-end tests: the real `ConfluenceClient` against a fake Confluence.
//!
//! The fake site is a small Axum app on an ephemeral port. It verifies every
//! incoming Connect JWT (signature, expiry, and `qsh`) and enforces the
//! version + 1 rule on updates, so these tests cover the signing and wire
//! format the unit tests fake out.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower::ServiceExt;

use homeclip_core::confluence::ConfluenceClient;
use homeclip_core::installation::MemoryInstallationStore;
use homeclip_core::jwt::{self, ConnectClaims};
use homeclip_server::routes::build_router;
use homeclip_server::state::AppState;

const SECRET: &str = "e2e-shared-secret";
const APP_KEY: &str = "com.example.homeclip";

// ── Fake Confluence site ─────────────────────────────────────────────

#[derive(Clone)]
struct StoredPage {
    id: String,
    space_key: String,
    title: String,
    version: u64,
    body: String,
}

#[derive(Default)]
struct Site {
    pages: Mutex<Vec<StoredPage>>,
    auth_failures: Mutex<Vec<String>>,
    fail_content_search: bool,
}

type Shared = Arc<Site>;

fn check_auth(
    site: &Site,
    headers: &HeaderMap,
    method: &str,
    path: &str,
    query: &[(String, String)],
) -> Result<(), StatusCode> {
    let fail = |reason: String| {
        site.auth_failures.lock().unwrap().push(reason);
        StatusCode::UNAUTHORIZED
    };
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("JWT "))
        .ok_or_else(|| fail(format!("{method} {path}: no JWT header")))?;
    let claims = jwt::verify(token, SECRET, chrono::Utc::now().timestamp())
        .map_err(|e| fail(format!("{method} {path}: {e}")))?;

    let pairs: Vec<(&str, &str)> = query
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let expected = jwt::query_string_hash(method, path, &pairs);
    if claims.qsh.as_deref() != Some(expected.as_str()) {
        return Err(fail(format!("{method} {path}: qsh mismatch")));
    }
    if claims.iss != APP_KEY || claims.aud != Some(json!("T1")) {
        return Err(fail(format!("{method} {path}: wrong iss/aud")));
    }
    Ok(())
}

fn page_json(page: &StoredPage) -> Value {
    json!({
        "id": page.id,
        "type": "page",
        "title": page.title,
        "space": { "key": page.space_key },
        "version": { "number": page.version },
        "body": { "storage": { "value": page.body, "representation": "storage" } }
    })
}

async fn list_spaces(
    State(site): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Json<Value>, StatusCode> {
    check_auth(&site, &headers, "GET", "/wiki/rest/api/space", &query)?;
    Ok(Json(json!({ "results": [{ "key": "~alice", "name": "Alice" }], "size": 1 })))
}

async fn search_content(
    State(site): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Json<Value>, StatusCode> {
    check_auth(&site, &headers, "GET", "/wiki/rest/api/content", &query)?;
    if site.fail_content_search {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    let param = |name: &str| {
        query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    };
    let (space_key, title) = (param("spaceKey"), param("title"));
    let pages = site.pages.lock().unwrap();
    let results: Vec<Value> = pages
        .iter()
        .filter(|p| p.space_key == space_key && p.title == title)
        .map(page_json)
        .collect();
    Ok(Json(json!({ "results": results })))
}

async fn create_content(
    State(site): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    check_auth(&site, &headers, "POST", "/wiki/rest/api/content", &[])?;
    let mut pages = site.pages.lock().unwrap();
    let page = StoredPage {
        id: (pages.len() + 1).to_string(),
        space_key: body["space"]["key"].as_str().unwrap_or_default().to_owned(),
        title: body["title"].as_str().unwrap_or_default().to_owned(),
        version: 1,
        body: body["body"]["storage"]["value"]
            .as_str()
            .unwrap_or_default()
            .to_owned(),
    };
    let response = page_json(&page);
    pages.push(page);
    Ok(Json(response))
}

async fn update_content(
    State(site): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let path = format!("/wiki/rest/api/content/{id}");
    check_auth(&site, &headers, "PUT", &path, &[])?;
    let mut pages = site.pages.lock().unwrap();
    let page = pages
        .iter_mut()
        .find(|p| p.id == id)
        .ok_or(StatusCode::NOT_FOUND)?;
    if body["version"]["number"].as_u64() != Some(page.version + 1) {
        return Err(StatusCode::CONFLICT);
    }
    page.version += 1;
    page.body = body["body"]["storage"]["value"]
        .as_str()
        .unwrap_or_default()
        .to_owned();
    Ok(Json(page_json(page)))
}

async fn start_site(site: Shared) -> String {
    let router = Router::new()
        .route("/wiki/rest/api/space", get(list_spaces))
        .route(
            "/wiki/rest/api/content",
            get(search_content).post(create_content),
        )
        .route("/wiki/rest/api/content/{id}", put(update_content))
        .with_state(site);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

// ── App under test ───────────────────────────────────────────────────

fn app() -> Router {
    let client = ConfluenceClient::new(Duration::from_secs(5)).unwrap();
    let state = AppState::new(
        Arc::new(MemoryInstallationStore::new()),
        Arc::new(client),
        None,
    );
    build_router(Arc::new(state))
}

async fn call(app: &Router, method: Method, uri: &str, body: &Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn install(app: &Router, base_url: &str) {
    let (status, _) = call(
        app,
        Method::POST,
        "/installed",
        &json!({
            "key": APP_KEY,
            "clientKey": "T1",
            "sharedSecret": SECRET,
            "baseUrl": base_url,
            "eventType": "installed"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

fn user_token() -> String {
    let now = chrono::Utc::now().timestamp();
    jwt::encode(
        &ConnectClaims {
            iss: "T1".to_owned(),
            sub: Some("557058:alice".to_owned()),
            aud: None,
            iat: now,
            exp: now + 180,
            qsh: None,
            context: None,
            extra: serde_json::Map::new(),
        },
        SECRET,
    )
    .unwrap()
}

async fn save(app: &Router, title: &str, content: &str) -> Value {
    let (status, body) = call(
        app,
        Method::POST,
        &format!("/add-to-homepage?jwt={}", user_token()),
        &json!({ "title": title, "content": content, "sourcePageId": "123", "spaceKey": "DOCS" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

// ── Tests ────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_then_append_against_signed_api() {
    let site = Arc::new(Site::default());
    let base_url = start_site(Arc::clone(&site)).await;
    let app = app();
    install(&app, &base_url).await;

    let first = save(&app, "Quote", "Hello world").await;
    assert_eq!(first["success"], true, "{first}");
    assert_eq!(first["pageId"], "1");
    assert_eq!(
        first["pageUrl"],
        format!("{base_url}/wiki/spaces/~alice/pages/1")
    );

    let second = save(&app, "Second", "More text").await;
    assert_eq!(second["success"], true, "{second}");
    assert_eq!(second["pageId"], "1");

    assert!(
        site.auth_failures.lock().unwrap().is_empty(),
        "{:?}",
        site.auth_failures.lock().unwrap()
    );

    let pages = site.pages.lock().unwrap();
    assert_eq!(pages.len(), 1);
    let page = &pages[0];
    assert_eq!(page.title, "My Saved Content");
    assert_eq!(page.version, 2);
    let quote = page.body.find("## Quote").unwrap();
    let second = page.body.find("## Second").unwrap();
    assert!(quote < second);
    assert!(page.body.contains("Hello world"));
    assert!(page.body.contains("More text"));
}

#[tokio::test]
async fn remote_failure_is_reported_in_body() {
    let site = Arc::new(Site {
        fail_content_search: true,
        ..Site::default()
    });
    let base_url = start_site(Arc::clone(&site)).await;
    let app = app();
    install(&app, &base_url).await;

    let body = save(&app, "Quote", "Hello world").await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("500"), "{body}");
    assert!(site.pages.lock().unwrap().is_empty());
}
