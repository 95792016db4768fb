//! The per-request payment gate.
//!
//! The gate runs once per priced request, ahead of the handler:
//!
//! 1. buffer the raw body and compute the canonical request hash
//! 2. consult the idempotency store (replay or conflict are terminal)
//! 3. without a proof header, issue a fresh 402 challenge
//! 4. with one, verify it, then reserve its nonce
//! 5. run the handler over the re-offered body bytes
//! 6. with an idempotency key present, capture the response into the store
//!
//! Idempotency is checked before proof verification so retries never need a
//! fresh proof (nonces are one-shot). The nonce is reserved only after the
//! proof verifies, so forged proofs cannot exhaust the nonce space.

use axum_core::body::Body;
use axum_core::extract::Request;
use axum_core::response::Response;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode, header};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;
use tower::util::BoxCloneSyncService;

use tollgate::request_hash::request_hash;
use tollgate::types::{
    Challenge, IDEMPOTENCY_KEY_HEADER, IDEMPOTENT_REPLAY_HEADER, PAYMENT_PROOF_HEADER,
    PaymentProof, PaymentRequired, PricingConfig, StoredResponse,
};

use crate::layer::GateShared;

/// Grace period a reserved nonce outlives its proof, covering clock skew
/// between issuance and verification.
const NONCE_GRACE_SECONDS: i64 = 60;

/// Response headers never persisted into the idempotency store.
const UNCACHEABLE_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

/// Terminal gate refusals, mapped to their wire responses.
#[derive(Debug, thiserror::Error)]
pub enum GateRejection {
    #[error("Invalid payment proof")]
    InvalidProof,
    #[error("Payment proof replay detected")]
    NonceReplay,
    #[error("Idempotency key reused with a different request")]
    IdempotencyConflict { key: String },
    #[error("Request body exceeds the configured limit")]
    BodyTooLarge,
    #[error("Unable to read request body")]
    BodyRead,
}

impl GateRejection {
    fn status(&self) -> StatusCode {
        match self {
            GateRejection::InvalidProof | GateRejection::NonceReplay => {
                StatusCode::PAYMENT_REQUIRED
            }
            GateRejection::IdempotencyConflict { .. } => StatusCode::CONFLICT,
            GateRejection::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GateRejection::BodyRead => StatusCode::BAD_REQUEST,
        }
    }

    fn into_response(self) -> Response {
        let body = match &self {
            GateRejection::IdempotencyConflict { key } => json!({
                "error": self.to_string(),
                "idempotencyKey": key,
            }),
            _ => json!({ "error": self.to_string() }),
        };
        json_response(self.status(), &body)
    }
}

pub(crate) struct PaymentGate {
    pub shared: Arc<GateShared>,
    pub pricing: Arc<PricingConfig>,
}

impl PaymentGate {
    pub async fn handle(
        self,
        inner: BoxCloneSyncService<Request, Response, Infallible>,
        req: Request,
    ) -> Result<Response, Infallible> {
        match self.handle_request(inner, req).await {
            Ok(response) => Ok(response),
            Err(rejection) => Ok(rejection.into_response()),
        }
    }

    async fn handle_request(
        self,
        mut inner: BoxCloneSyncService<Request, Response, Infallible>,
        req: Request,
    ) -> Result<Response, GateRejection> {
        let (parts, body) = req.into_parts();

        // Buffer the raw bytes before any parser sees them; the exact bytes
        // are what gets hashed and what the handler receives.
        let body_bytes = match Limited::new(body, self.shared.max_body_bytes).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
                return Err(GateRejection::BodyTooLarge);
            }
            Err(_) => return Err(GateRejection::BodyRead),
        };

        let hash = request_hash(
            parts.method.as_str(),
            parts.uri.path(),
            parts.uri.query().unwrap_or(""),
            &body_bytes,
        );

        let idempotency_key = parts
            .headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        // Idempotency first: a retry of an already-served request replays
        // without a fresh proof.
        if let Some(key) = &idempotency_key {
            if let Some(stored) = self.shared.idempotency.get(key).await {
                if stored.request_hash == hash {
                    tracing::debug!(key, "serving idempotent replay");
                    return Ok(replay_response(&stored));
                }
                tracing::debug!(key, "idempotency key reused with a different request");
                return Err(GateRejection::IdempotencyConflict { key: key.clone() });
            }
        }

        let proof_header = parts
            .headers
            .get(PAYMENT_PROOF_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let Some(proof_header) = proof_header else {
            let challenge = Challenge::issue(&self.pricing, &hash, self.shared.default_ttl_seconds);
            tracing::debug!(nonce = %challenge.nonce, price = %challenge.price, "issuing challenge");
            return Ok(challenge_response(challenge));
        };

        if !self
            .shared
            .verifier
            .verify(&proof_header, &hash, &self.pricing)
            .await
        {
            return Err(GateRejection::InvalidProof);
        }

        // The verifier vouched for the proof; decode it again for nonce
        // bookkeeping. A header that fails to decode here never verified.
        let proof =
            PaymentProof::from_header(&proof_header).map_err(|_| GateRejection::InvalidProof)?;
        let reserve_until_ms = proof.expires_at.timestamp_millis() + NONCE_GRACE_SECONDS * 1000;
        if !self.shared.nonces.try_reserve(&proof.nonce, reserve_until_ms) {
            tracing::debug!(nonce = %proof.nonce, "refusing replayed payment proof");
            return Err(GateRejection::NonceReplay);
        }

        let req = Request::from_parts(parts, Body::from(body_bytes));
        let response = inner.call(req).await.unwrap_or_else(|never| match never {});

        match idempotency_key {
            None => Ok(response),
            Some(key) => Ok(self.capture_response(&key, hash, response).await),
        }
    }

    /// Buffers the handler's response, stores it under the idempotency key,
    /// and re-emits it unchanged.
    async fn capture_response(&self, key: &str, hash: String, response: Response) -> Response {
        let (parts, body) = response.into_parts();
        let body_bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                tracing::warn!(error = %err, "response body read failed; skipping idempotency capture");
                return Response::from_parts(parts, Body::empty());
            }
        };
        let stored = StoredResponse {
            request_hash: hash,
            status_code: parts.status.as_u16(),
            body: body_bytes.to_vec(),
            headers: cacheable_headers(&parts.headers),
        };
        self.shared.idempotency.set(key, stored).await;
        Response::from_parts(parts, Body::from(body_bytes))
    }
}

fn challenge_response(challenge: Challenge) -> Response {
    json_response(StatusCode::PAYMENT_REQUIRED, &PaymentRequired::new(challenge))
}

fn replay_response(stored: &StoredResponse) -> Response {
    let mut response = Response::builder()
        .status(stored.status_code)
        .body(Body::from(Bytes::from(stored.body.clone())))
        .expect("Fail to construct response");
    let headers = response.headers_mut();
    for (name, value) in &stored.headers {
        if let (Ok(name), Ok(value)) = (
            name.parse::<http::header::HeaderName>(),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    headers.insert(IDEMPOTENT_REPLAY_HEADER, HeaderValue::from_static("true"));
    response
}

fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> Response {
    let bytes = serde_json::to_vec(body).expect("serialization failed");
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("Fail to construct response")
}

fn cacheable_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| {
            let name = name.as_str();
            !UNCACHEABLE_HEADERS.contains(&name)
        })
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}
