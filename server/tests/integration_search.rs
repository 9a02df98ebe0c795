use arrowreg_core::{RetrievalConfig, RetrievalService, SourceSpec};
use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use server::{router, AppState};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;
use tower::ServiceExt;

const TOKEN: &str = "s3cret";

fn write_corpus(dir: &Path) -> Vec<SourceSpec> {
    fs::write(
        dir.join("cfr46.md"),
        "## § 109.213 Fire Detection Systems\nEach machinery space must be fitted with an automatic fire detection system.\n",
    )
    .unwrap();
    fs::write(
        dir.join("cfr33.txt"),
        "§ 151.10 Oil Discharge Prohibition\nThe discharge of oil or oily waste into navigable waters is prohibited.\n",
    )
    .unwrap();
    vec![SourceSpec::new(dir.join("cfr46.md"), "cfr46"), SourceSpec::new(dir.join("cfr33.txt"), "cfr33")]
}

fn app(dir: &Path) -> Router {
    let service = Arc::new(RetrievalService::new(RetrievalConfig::default()));
    service.initialize(&write_corpus(dir));
    router(AppState { service, admin_token: Some(TOKEN.to_string()) })
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Bytes) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Bytes) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

#[tokio::test]
async fn health_is_ok() {
    let dir = tempdir().unwrap();
    let (status, body) = get(app(dir.path()), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn search_returns_cited_results() {
    let dir = tempdir().unwrap();
    let (status, body) = get(app(dir.path()), "/search?q=fire%20detection%20requirements").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["id"], "cfr46_0");
    assert_eq!(arr[0]["citation"], "46 CFR § 109.213");
    assert_eq!(arr[0]["url"], "https://www.ecfr.gov/current/title-46/section-109.213");
    assert!(arr[0]["confidence"].as_u64().unwrap() <= 95);
    assert_eq!(json["total_hits"], 1);
}

#[tokio::test]
async fn search_honours_source_filter() {
    let dir = tempdir().unwrap();
    let router = app(dir.path());
    let (_, body) = get(router.clone(), "/search?q=fire%20oil&sources=cfr33").await;
    let json: Value = serde_json::from_slice(&body).unwrap();
    let arr = json["results"].as_array().unwrap();
    assert!(!arr.is_empty());
    assert!(arr.iter().all(|r| r["document_id"] == "cfr33"));

    let (_, body) = get(router, "/search?q=fire%20oil&k=1").await;
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["results"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn admin_routes_require_token() {
    let dir = tempdir().unwrap();
    let req = Request::delete("/documents/cfr46").body(Body::empty()).unwrap();
    let (status, _) = send(app(dir.path()), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn documents_can_be_added_and_removed() {
    let dir = tempdir().unwrap();
    let router = app(dir.path());
    let extra = dir.path().join("galley.md");
    fs::write(&extra, "# Galley Ventilation\nGalley exhaust ducts must have grease filters.\n").unwrap();

    let body = serde_json::json!({ "path": extra, "document_id": "galley" }).to_string();
    let req = Request::post("/documents")
        .header("content-type", "application/json")
        .header("X-ADMIN-TOKEN", TOKEN)
        .body(Body::from(body))
        .unwrap();
    let (status, body) = send(router.clone(), req).await;
    assert_eq!(status, StatusCode::CREATED);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["sections"], 1);

    let (_, body) = get(router.clone(), "/search?q=grease%20filters").await;
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["results"][0]["document_id"], "galley");
    assert!(json["results"][0]["url"].is_null());

    let req = Request::delete("/documents/galley").header("X-ADMIN-TOKEN", TOKEN).body(Body::empty()).unwrap();
    let (status, _) = send(router.clone(), req).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let req = Request::delete("/documents/galley").header("X-ADMIN-TOKEN", TOKEN).body(Body::empty()).unwrap();
    let (status, _) = send(router.clone(), req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = get(router, "/stats").await;
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["documents"], 2);
}
