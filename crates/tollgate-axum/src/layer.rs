//! The [`Tollgate`] middleware: construction, per-route pricing, and the
//! tower plumbing around the payment gate.

use axum_core::extract::Request;
use axum_core::response::Response;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};

use tollgate::idempotency::{IdempotencyStore, InMemoryIdempotencyStore};
use tollgate::nonce::NonceRegistry;
use tollgate::types::{DEFAULT_CHALLENGE_TTL_SECONDS, PricingConfig};
use tollgate::verify::ProofVerifier;

use crate::gate::PaymentGate;

/// Largest request body the gate will buffer for hashing. Bigger requests
/// are refused with `413 Payload Too Large`.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// State shared by every route layered with the same middleware instance:
/// the verifier, the nonce registry, the idempotency store, and defaults.
pub(crate) struct GateShared {
    pub verifier: Arc<dyn ProofVerifier>,
    pub nonces: Arc<NonceRegistry>,
    pub idempotency: Arc<dyn IdempotencyStore>,
    pub default_ttl_seconds: u64,
    pub max_body_bytes: usize,
}

/// Middleware enforcing per-request micropayments.
///
/// One instance owns one nonce registry and one idempotency store; clones
/// share them, so every priced route behind the same instance sees the same
/// replay and retry state. Background sweeps stop when the last clone is
/// dropped.
///
/// Construction must happen within a Tokio runtime (the stores spawn sweep
/// tasks).
#[derive(Clone)]
pub struct Tollgate {
    shared: Arc<GateShared>,
    pricing: Option<Arc<PricingConfig>>,
}

impl Tollgate {
    pub fn new(verifier: impl ProofVerifier + 'static) -> Self {
        Self {
            shared: Arc::new(GateShared {
                verifier: Arc::new(verifier),
                nonces: Arc::new(NonceRegistry::new()),
                idempotency: Arc::new(InMemoryIdempotencyStore::default()),
                default_ttl_seconds: DEFAULT_CHALLENGE_TTL_SECONDS,
                max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            }),
            pricing: None,
        }
    }

    /// Replaces the idempotency store, e.g. with a shared network-backed
    /// implementation.
    pub fn with_idempotency_store(&self, store: impl IdempotencyStore + 'static) -> Self {
        self.map_shared(|shared| GateShared {
            idempotency: Arc::new(store),
            ..shared
        })
    }

    /// Challenge TTL for routes whose pricing does not set one.
    pub fn with_default_ttl_seconds(&self, seconds: u64) -> Self {
        self.map_shared(|shared| GateShared {
            default_ttl_seconds: seconds,
            ..shared
        })
    }

    pub fn with_max_body_bytes(&self, bytes: usize) -> Self {
        self.map_shared(|shared| GateShared {
            max_body_bytes: bytes,
            ..shared
        })
    }

    /// Attaches a price to the route this layer wraps. A route is priced
    /// iff its layer carries a [`PricingConfig`].
    pub fn with_pricing(&self, pricing: PricingConfig) -> Self {
        let mut this = self.clone();
        this.pricing = Some(Arc::new(pricing));
        this
    }

    fn map_shared(&self, f: impl FnOnce(GateShared) -> GateShared) -> Self {
        let shared = GateShared {
            verifier: self.shared.verifier.clone(),
            nonces: self.shared.nonces.clone(),
            idempotency: self.shared.idempotency.clone(),
            default_ttl_seconds: self.shared.default_ttl_seconds,
            max_body_bytes: self.shared.max_body_bytes,
        };
        Self {
            shared: Arc::new(f(shared)),
            pricing: self.pricing.clone(),
        }
    }
}

impl<S> Layer<S> for Tollgate
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Service = TollgateService;

    fn layer(&self, inner: S) -> Self::Service {
        if self.pricing.is_none() {
            tracing::warn!(
                "tollgate layer applied without pricing; requests pass through unpriced"
            );
        }
        TollgateService {
            shared: self.shared.clone(),
            pricing: self.pricing.clone(),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Wraps the inner axum service with payment enforcement.
#[derive(Clone)]
pub struct TollgateService {
    shared: Arc<GateShared>,
    pricing: Option<Arc<PricingConfig>>,
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl Service<Request> for TollgateService {
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let mut inner = self.inner.clone();
        match &self.pricing {
            None => Box::pin(async move { inner.call(req).await }),
            Some(pricing) => {
                let gate = PaymentGate {
                    shared: self.shared.clone(),
                    pricing: pricing.clone(),
                };
                Box::pin(gate.handle(inner, req))
            }
        }
    }
}
