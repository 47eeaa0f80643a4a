use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use http_body_util::BodyExt;
use medrag_core::{Config, RagService};
use medrag_llm::mock::{MockFailure, MockProvider};
use medrag_memory::{InMemoryVectorStore, RolePolicy};
use serde_json::{Value, json};
use tower::ServiceExt;

use super::build_router;
use crate::server::AppState;

const DIMS: usize = 256;

fn state_with(mock: MockProvider) -> AppState<MockProvider> {
    let mut config = Config::default();
    config.llm.embedding_dimensions = DIMS;
    let service = RagService::from_config(
        &config,
        Arc::new(mock.with_dimensions(DIMS)),
        Arc::new(InMemoryVectorStore::new(DIMS)),
        Arc::new(RolePolicy),
    )
    .unwrap();
    AppState {
        service: Arc::new(service),
        started_at: Instant::now(),
    }
}

fn make_router(auth: Option<String>, rate_limit: u32) -> Router {
    build_router(
        state_with(MockProvider::default()),
        auth,
        rate_limit,
        1_048_576,
    )
}

fn request(method: &str, uri: &str, role: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", "1")
        .header("x-user-role", role)
        .header("x-user-department", "cardiology");
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(resp: axum::response::Response) -> Value {
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn hygiene() -> Value {
    json!({
        "title": "Hand hygiene",
        "content": "Wash hands with soap for twenty seconds before patient contact.",
        "document_type": "protocol"
    })
}

#[tokio::test]
async fn health_returns_ok() {
    let app = make_router(None, 0);
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), 200);
    let json = json_body(resp).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn health_skips_auth() {
    let app = make_router(Some("secret".into()), 0);
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn auth_rejects_missing_token() {
    let app = make_router(Some("secret".into()), 0);
    let resp = app
        .oneshot(request("GET", "/api/v1/documents", "doctor", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn auth_rejects_wrong_token() {
    let app = make_router(Some("secret".into()), 0);
    let mut req = request("GET", "/api/v1/documents", "doctor", None);
    req.headers_mut()
        .insert("authorization", "Bearer wrong".parse().unwrap());
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), 401);
    assert_eq!(json_body(resp).await["detail"], "invalid service token");
}

#[tokio::test]
async fn auth_accepts_valid_token() {
    let app = make_router(Some("secret".into()), 0);
    let mut req = request("GET", "/api/v1/documents", "doctor", None);
    req.headers_mut()
        .insert("authorization", "Bearer secret".parse().unwrap());
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
    let app = make_router(None, 0);
    let req = Request::builder()
        .uri("/api/v1/documents")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), 401);
    let json = json_body(resp).await;
    assert_eq!(json["detail"], "missing caller identity");
}

#[tokio::test]
async fn create_search_and_ask() {
    let app = make_router(None, 0);

    let resp = app
        .clone()
        .oneshot(request("POST", "/api/v1/documents", "doctor", Some(hygiene())))
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let created = json_body(resp).await;
    assert_eq!(created["chunk_count"], 1);
    let id = created["document_id"].clone();

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/v1/chat/search",
            "nurse",
            Some(json!({"query": "wash hands soap"})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let found = json_body(resp).await;
    assert_eq!(found["total_results"], 1);
    assert_eq!(found["results"][0]["document_id"], id);
    assert_eq!(found["results"][0]["document_title"], "Hand hygiene");
    assert_eq!(found["results"][0]["chunk_index"], 0);
    let similarity = found["results"][0]["similarity"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&similarity));

    let resp = app
        .oneshot(request(
            "POST",
            "/api/v1/chat/ask",
            "nurse",
            Some(json!({"message": "how long to wash hands with soap"})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let answer = json_body(resp).await;
    assert_eq!(answer["context_used"], true);
    assert_eq!(answer["sources"][0]["document_id"], id);
    assert!(answer["token_count"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn nurse_cannot_create() {
    let app = make_router(None, 0);
    let resp = app
        .oneshot(request("POST", "/api/v1/documents", "nurse", Some(hygiene())))
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn unknown_document_is_not_found() {
    let app = make_router(None, 0);
    let resp = app
        .oneshot(request("GET", "/api/v1/documents/404", "admin", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn document_lifecycle() {
    let app = make_router(None, 0);
    let resp = app
        .clone()
        .oneshot(request("POST", "/api/v1/documents", "doctor", Some(hygiene())))
        .await
        .unwrap();
    let id = json_body(resp).await["document_id"].as_i64().unwrap();
    let uri = format!("/api/v1/documents/{id}");

    let resp = app
        .clone()
        .oneshot(request(
            "PATCH",
            &uri,
            "doctor",
            Some(json!({"title": "Hygiene", "department": "icu", "patient_id": 5})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let patched = json_body(resp).await;
    assert_eq!(patched["title"], "Hygiene");
    assert_eq!(patched["department"], "icu");
    assert_eq!(patched["patient_id"], 5);

    let resp = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("{uri}/content"),
            "doctor",
            Some(json!({"content": "a".repeat(2500)})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(json_body(resp).await["chunk_count"], 3);

    let resp = app
        .clone()
        .oneshot(request("GET", &uri, "doctor", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let stored = json_body(resp).await;
    assert_eq!(stored["title"], "Hygiene");
    assert_eq!(stored["content"].as_str().unwrap().len(), 2500);

    let resp = app
        .clone()
        .oneshot(request("DELETE", &uri, "doctor", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = app
        .oneshot(request("GET", &uri, "doctor", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn blank_query_is_bad_request() {
    let app = make_router(None, 0);
    let resp = app
        .oneshot(request(
            "POST",
            "/api/v1/chat/search",
            "doctor",
            Some(json!({"query": "  "})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn completion_failure_is_bad_gateway() {
    let app = build_router(
        state_with(MockProvider::default().failing_chat(MockFailure::Transient)),
        None,
        0,
        1_048_576,
    );
    let resp = app
        .oneshot(request(
            "POST",
            "/api/v1/chat/ask",
            "doctor",
            Some(json!({"message": "triage levels"})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
}

#[tokio::test]
async fn patient_only_patch_is_applied() {
    let app = make_router(None, 0);
    let resp = app
        .clone()
        .oneshot(request("POST", "/api/v1/documents", "doctor", Some(hygiene())))
        .await
        .unwrap();
    let id = json_body(resp).await["document_id"].as_i64().unwrap();

    let resp = app
        .oneshot(request(
            "PATCH",
            &format!("/api/v1/documents/{id}"),
            "doctor",
            Some(json!({"patient_id": 5})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(json_body(resp).await["patient_id"], 5);
}

#[tokio::test]
async fn malformed_id_has_detail_body() {
    let app = make_router(None, 0);
    let resp = app
        .oneshot(request("GET", "/api/v1/documents/abc", "doctor", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let json = json_body(resp).await;
    assert!(json["detail"].as_str().unwrap().contains("abc"));
}

#[tokio::test]
async fn malformed_json_has_detail_body() {
    let app = make_router(None, 0);
    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/chat/search")
        .header("content-type", "application/json")
        .header("x-user-id", "1")
        .header("x-user-role", "doctor")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), 400);
    let json = json_body(resp).await;
    assert!(json["detail"].is_string());
}

#[tokio::test]
async fn malformed_query_has_detail_body() {
    let app = make_router(None, 0);
    let resp = app
        .oneshot(request("GET", "/api/v1/documents?limit=many", "doctor", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert!(json_body(resp).await["detail"].is_string());
}

const BOUNDARY: &str = "medrag-boundary";

fn multipart_body(fields: &[(&str, &str)], file: Option<&[u8]>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(file) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
                 filename=\"note.txt\"\r\nContent-Type: text/plain\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(file);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload(role: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/documents/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header("x-user-id", "1")
        .header("x-user-role", role)
        .header("x-user-department", "cardiology")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn upload_ingests_text_file() {
    let app = make_router(None, 0);
    let body = multipart_body(
        &[
            ("title", "Insulin storage"),
            ("document_type", "protocol"),
            ("department", "cardiology"),
            ("patient_id", "42"),
            ("is_sensitive", "true"),
        ],
        Some("Store unopened insulin pens in the refrigerator.".as_bytes()),
    );
    let resp = app.clone().oneshot(upload("doctor", body)).await.unwrap();
    assert_eq!(resp.status(), 201);
    let created = json_body(resp).await;
    assert_eq!(created["chunk_count"], 1);
    let id = created["document_id"].as_i64().unwrap();

    let resp = app
        .oneshot(request(
            "GET",
            &format!("/api/v1/documents/{id}"),
            "doctor",
            None,
        ))
        .await
        .unwrap();
    let stored = json_body(resp).await;
    assert_eq!(stored["title"], "Insulin storage");
    assert_eq!(stored["patient_id"], 42);
    assert_eq!(stored["is_sensitive"], true);
    assert_eq!(
        stored["content"],
        "Store unopened insulin pens in the refrigerator."
    );
}

#[tokio::test]
async fn upload_rejects_invalid_utf8() {
    let app = make_router(None, 0);
    let body = multipart_body(
        &[("title", "Scan"), ("document_type", "note")],
        Some(&[0x66, 0x6f, 0xff, 0xfe]),
    );
    let resp = app.oneshot(upload("doctor", body)).await.unwrap();
    assert_eq!(resp.status(), 400);
    let json = json_body(resp).await;
    assert!(json["detail"].as_str().unwrap().starts_with("Error reading file"));
}

#[tokio::test]
async fn upload_requires_file_and_create_rights() {
    let app = make_router(None, 0);
    let body = multipart_body(&[("title", "Empty"), ("document_type", "note")], None);
    let resp = app.clone().oneshot(upload("doctor", body)).await.unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(json_body(resp).await["detail"], "file is required");

    let body = multipart_body(
        &[("title", "Note"), ("document_type", "note")],
        Some(b"Shift handover notes."),
    );
    let resp = app.oneshot(upload("nurse", body)).await.unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn rate_limit_is_per_caller() {
    use tower::Service;

    let mut app = make_router(None, 1);
    let resp = app
        .call(request("GET", "/api/v1/documents", "doctor", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let resp = app
        .call(request("GET", "/api/v1/documents", "doctor", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    assert_eq!(json_body(resp).await["detail"], "rate limit exceeded");

    let mut other = request("GET", "/api/v1/documents", "doctor", None);
    other
        .headers_mut()
        .insert("x-user-id", "2".parse().unwrap());
    let resp = app.call(other).await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn rate_limit_enforced() {
    use tower::Service;

    let mut app = make_router(None, 2);
    let resp = app
        .call(request("GET", "/api/v1/documents", "doctor", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let resp = app
        .call(request("GET", "/api/v1/documents", "doctor", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let resp = app
        .call(request("GET", "/api/v1/documents", "doctor", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
}

#[tokio::test]
async fn body_size_limit() {
    let app = build_router(state_with(MockProvider::default()), None, 0, 64);
    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/documents")
        .header("content-type", "application/json")
        .header("x-user-id", "1")
        .header("x-user-role", "doctor")
        .body(Body::from(vec![b'a'; 128]))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), 413);
}
