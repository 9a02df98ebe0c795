use arrowreg_core::embedder::{Embedder, EmbedderSet, RemoteEmbedder};
use arrowreg_core::{EmbedError, EmbedderKind, EmbeddingConfig};
use serde_json::json;
use std::net::TcpListener;
use std::time::{Duration, Instant};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn parses_openai_style_response_in_input_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                { "object": "embedding", "index": 1, "embedding": [0.0, 1.0] },
                { "object": "embedding", "index": 0, "embedding": [1.0, 0.0] }
            ],
            "model": "text-embedding-3-small"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let base = server.uri();
    let vectors = tokio::task::spawn_blocking(move || {
        let e = RemoteEmbedder::new(&base, "text-embedding-3-small", Some("test-key".into()), Duration::from_secs(5))?;
        e.embed_batch(&texts(&["fire pumps", "oily waste"]))
    })
    .await
    .expect("join")
    .expect("embeddings");

    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
}

#[tokio::test]
async fn non_success_status_is_a_bad_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model overloaded"))
        .mount(&server)
        .await;

    let base = server.uri();
    let result = tokio::task::spawn_blocking(move || {
        let e = RemoteEmbedder::new(&base, "m", None, Duration::from_secs(5))?;
        e.embed("fire detection")
    })
    .await
    .expect("join");

    match result {
        Err(EmbedError::BadResponse(msg)) => assert!(msg.contains("500"), "{msg}"),
        other => panic!("expected BadResponse, got {other:?}"),
    }
}

#[tokio::test]
async fn short_response_is_a_bad_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [{ "embedding": [1.0] }] })))
        .mount(&server)
        .await;

    let base = server.uri();
    let result = tokio::task::spawn_blocking(move || {
        let e = RemoteEmbedder::new(&base, "m", None, Duration::from_secs(5))?;
        e.embed_batch(&texts(&["a", "b"]))
    })
    .await
    .expect("join");
    assert!(matches!(result, Err(EmbedError::BadResponse(_))));
}

#[test]
fn unresponsive_service_times_out_to_fallback() {
    // accepts connections and never answers
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    std::thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming() {
            held.push(stream);
        }
    });

    let remote = EmbedderKind::Remote { base_url: format!("http://{addr}"), model: "m".into(), api_key_env: None };
    let cfg = EmbeddingConfig { space_a: remote.clone(), space_b: remote, fallback_buckets: 64, timeout_secs: 1 };
    let set = EmbedderSet::from_config(&cfg);

    let started = Instant::now();
    let q = set.embed_query("fire detection");
    let elapsed = started.elapsed();

    assert!(q.a.fallback && q.b.fallback);
    assert_eq!(q.a.vector.len(), 64);
    assert_eq!(q.a.vector, set.fallback().embed_text("fire detection"));
    // both spaces wait out the same one-second bound side by side
    assert!(elapsed >= Duration::from_millis(900), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(1900), "{elapsed:?}");
}
