//! End-to-end middleware behavior over an in-process axum router with the
//! mock payment scheme.

use axum::body::Body;
use axum::extract::Query;
use axum::routing::get;
use axum::{Json, Router};
use http::{Request, Response, StatusCode, header};
use http_body_util::BodyExt;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tower::ServiceExt;

use tollgate::mock::{MockPayer, MockVerifier};
use tollgate::pay::{PaymentContext, Payer};
use tollgate::types::{Challenge, PaymentRequired, PricingConfig};
use tollgate_axum::Tollgate;

#[derive(Deserialize)]
struct WeatherQuery {
    city: String,
}

fn weather_app() -> (Router, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let handler_calls = calls.clone();
    let tollgate = Tollgate::new(MockVerifier::default());
    let pricing = PricingConfig::new("0.001", "USDC", "recipient-wallet").unwrap();

    let app = Router::new()
        .route(
            "/weather",
            get(move |Query(query): Query<WeatherQuery>| {
                let calls = handler_calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Json(json!({
                        "city": query.city,
                        "temp": 15,
                        "condition": "Cloudy",
                        "humidity": 72,
                        "unit": "celsius",
                    }))
                }
            })
            .layer(tollgate.with_pricing(pricing)),
        )
        .route("/free", get(|| async { "free" }));
    (app, calls)
}

async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn weather_request() -> Request<Body> {
    Request::builder()
        .uri("/weather?city=London")
        .body(Body::empty())
        .unwrap()
}

async fn challenge_for(app: &Router) -> Challenge {
    let response = send(app, weather_request()).await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice::<PaymentRequired>(&bytes)
        .unwrap()
        .challenge
}

async fn proof_header_for(app: &Router) -> String {
    let challenge = challenge_for(app).await;
    let ctx = PaymentContext {
        url: "http://localhost/weather?city=London".to_string(),
        method: "GET".to_string(),
    };
    MockPayer::default()
        .pay(&challenge, &ctx)
        .await
        .unwrap()
        .to_header()
        .unwrap()
}

fn paid_request(proof_header: &str, idempotency_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .uri("/weather?city=London")
        .header("X-Payment-Proof", proof_header);
    if let Some(key) = idempotency_key {
        builder = builder.header("Idempotency-Key", key);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn unpriced_routes_are_never_charged() {
    let (app, _) = weather_app();
    let response = send(&app, Request::builder().uri("/free").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn first_denial_carries_a_bound_challenge() {
    let (app, calls) = weather_app();
    let response = send(&app, weather_request()).await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    let body = body_json(response).await;
    let challenge = &body["challenge"];
    assert_eq!(challenge["version"], 1);
    assert_eq!(challenge["price"], "0.001");
    assert_eq!(challenge["requestHash"].as_str().unwrap().len(), 64);
    let expires_at =
        chrono::DateTime::parse_from_rfc3339(challenge["expiresAt"].as_str().unwrap()).unwrap();
    assert!(expires_at > chrono::Utc::now());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn challenge_hash_matches_canonical_request() {
    let (app, _) = weather_app();
    let challenge = challenge_for(&app).await;
    let expected = tollgate::request_hash::request_hash("GET", "/weather", "city=London", b"");
    assert_eq!(challenge.request_hash, expected);
}

#[tokio::test]
async fn consecutive_challenges_use_fresh_nonces() {
    let (app, _) = weather_app();
    let a = challenge_for(&app).await;
    let b = challenge_for(&app).await;
    assert_ne!(a.nonce, b.nonce);
}

#[tokio::test]
async fn valid_proof_unlocks_the_handler() {
    let (app, calls) = weather_app();
    let header = proof_header_for(&app).await;
    let response = send(&app, paid_request(&header, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(
        body,
        json!({
            "city": "London",
            "temp": 15,
            "condition": "Cloudy",
            "humidity": 72,
            "unit": "celsius",
        })
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn replayed_proof_is_refused() {
    let (app, calls) = weather_app();
    let header = proof_header_for(&app).await;
    let first = send(&app, paid_request(&header, None)).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = send(&app, paid_request(&header, None)).await;
    assert_eq!(second.status(), StatusCode::PAYMENT_REQUIRED);
    let body = body_json(second).await;
    assert!(body["error"].as_str().unwrap().to_lowercase().contains("replay"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn proof_is_bound_to_the_request() {
    let (app, calls) = weather_app();
    let header = proof_header_for(&app).await;
    // Same proof, different query: the recomputed hash no longer matches.
    let request = Request::builder()
        .uri("/weather?city=Paris")
        .header("X-Payment-Proof", &header)
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn expired_proof_is_refused() {
    let (app, _) = weather_app();
    let mut challenge = challenge_for(&app).await;
    challenge.expires_at = chrono::Utc::now() - chrono::TimeDelta::seconds(5);
    let ctx = PaymentContext {
        url: "http://localhost/weather?city=London".to_string(),
        method: "GET".to_string(),
    };
    let header = MockPayer::default()
        .pay(&challenge, &ctx)
        .await
        .unwrap()
        .to_header()
        .unwrap();
    let response = send(&app, paid_request(&header, None)).await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
}

#[tokio::test]
async fn malformed_proof_header_is_an_invalid_proof() {
    let (app, _) = weather_app();
    let response = send(&app, paid_request("!!!not-base64url!!!", None)).await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = body_json(response).await;
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn idempotent_retry_replays_without_a_second_execution() {
    let (app, calls) = weather_app();
    let header = proof_header_for(&app).await;
    let first = send(&app, paid_request(&header, Some("k1"))).await;
    assert_eq!(first.status(), StatusCode::OK);
    let first_body = body_json(first).await;

    // Retry with the same key and the same (replayed) proof header: the
    // stored response comes back before any proof check runs.
    let second = send(&app, paid_request(&header, Some("k1"))).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(
        second.headers().get("X-Idempotent-Replay").unwrap(),
        "true"
    );
    let second_body = body_json(second).await;
    assert_eq!(first_body, second_body);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn idempotency_key_conflict_is_a_409() {
    let (app, calls) = weather_app();
    let header = proof_header_for(&app).await;
    let first = send(&app, paid_request(&header, Some("k2"))).await;
    assert_eq!(first.status(), StatusCode::OK);

    let conflicting = Request::builder()
        .uri("/weather?city=Paris")
        .header("Idempotency-Key", "k2")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, conflicting).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["idempotencyKey"], "k2");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn replay_reproduces_handler_headers() {
    let (app, _) = weather_app();
    let header = proof_header_for(&app).await;
    let first = send(&app, paid_request(&header, Some("k3"))).await;
    let first_content_type = first.headers().get(header::CONTENT_TYPE).cloned().unwrap();

    let second = send(&app, paid_request(&header, Some("k3"))).await;
    assert_eq!(
        second.headers().get(header::CONTENT_TYPE).unwrap(),
        &first_content_type
    );
}

#[tokio::test]
async fn oversized_body_is_refused_before_hashing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let handler_calls = calls.clone();
    let tollgate = Tollgate::new(MockVerifier::default()).with_max_body_bytes(16);
    let pricing = PricingConfig::new("0.001", "USDC", "recipient-wallet").unwrap();
    let app = Router::new().route(
        "/ingest",
        axum::routing::post(move || {
            let calls = handler_calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                "ok"
            }
        })
        .layer(tollgate.with_pricing(pricing)),
    );

    let request = Request::builder()
        .method("POST")
        .uri("/ingest")
        .body(Body::from(vec![0u8; 64]))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn body_bytes_bind_the_challenge() {
    let tollgate = Tollgate::new(MockVerifier::default());
    let pricing = PricingConfig::new("0.001", "USDC", "recipient-wallet").unwrap();
    let app = Router::new().route(
        "/ingest",
        axum::routing::post(|body: String| async move { body })
            .layer(tollgate.with_pricing(pricing)),
    );

    let challenge_of = |payload: &'static str| {
        let app = app.clone();
        async move {
            let request = Request::builder()
                .method("POST")
                .uri("/ingest")
                .body(Body::from(payload))
                .unwrap();
            let response = app.oneshot(request).await.unwrap();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            serde_json::from_slice::<PaymentRequired>(&bytes)
                .unwrap()
                .challenge
                .request_hash
        }
    };

    let a = challenge_of("payload-a").await;
    let b = challenge_of("payload-b").await;
    assert_ne!(a, b);
}

#[tokio::test]
async fn handler_still_sees_the_buffered_body() {
    let tollgate = Tollgate::new(MockVerifier::default());
    let pricing = PricingConfig::new("0.001", "USDC", "recipient-wallet").unwrap();
    let app = Router::new().route(
        "/echo",
        axum::routing::post(|body: String| async move { body })
            .layer(tollgate.clone().with_pricing(pricing)),
    );

    // Obtain a challenge for the exact body, pay it, then check the echo.
    let request = Request::builder()
        .method("POST")
        .uri("/echo")
        .body(Body::from("hello gate"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let challenge = serde_json::from_slice::<PaymentRequired>(&bytes)
        .unwrap()
        .challenge;
    let ctx = PaymentContext {
        url: "http://localhost/echo".to_string(),
        method: "POST".to_string(),
    };
    let header = MockPayer::default()
        .pay(&challenge, &ctx)
        .await
        .unwrap()
        .to_header()
        .unwrap();

    let paid = Request::builder()
        .method("POST")
        .uri("/echo")
        .header("X-Payment-Proof", header)
        .body(Body::from("hello gate"))
        .unwrap();
    let response = app.clone().oneshot(paid).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"hello gate");
}
