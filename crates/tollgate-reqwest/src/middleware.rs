//! reqwest middleware implementing the 402 → pay → retry loop.

use http::{Extensions, HeaderMap, HeaderValue, StatusCode};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
use std::sync::Arc;

use tollgate::pay::{PayError, Payer, PaymentContext};
use tollgate::types::{PAYMENT_PROOF_HEADER, PaymentRequired};

/// Errors constructing or attaching a payment proof.
///
/// Payer failures (missing token accounts, RPC trouble) surface through here
/// to the caller; the retry loop does not swallow them.
#[derive(Debug, thiserror::Error)]
pub enum PaymentRetryError {
    /// The original request could not be cloned for the retry. Typically a
    /// streaming body.
    #[error("Request object is not cloneable. Are you passing a streaming body?")]
    RequestNotCloneable,
    #[error("Failed to encode payment proof to json")]
    JsonEncode(#[source] serde_json::Error),
    #[error("Failed to encode payment proof to HTTP header")]
    HeaderValueEncode(#[source] http::header::InvalidHeaderValue),
    #[error(transparent)]
    Pay(#[from] PayError),
}

impl From<PaymentRetryError> for rqm::Error {
    fn from(error: PaymentRetryError) -> Self {
        rqm::Error::Middleware(error.into())
    }
}

/// Middleware that answers 402 challenges with a payment proof and retries.
///
/// Exactly one payment is made per retry budget (default 1); there is no
/// backoff. Caller-supplied headers, including `Idempotency-Key`, pass
/// through to the retry unchanged. A 402 whose body is not a challenge
/// envelope is returned to the caller untouched.
#[derive(Clone)]
pub struct TollgatePayments {
    payer: Arc<dyn Payer>,
    max_retries: u32,
}

impl TollgatePayments {
    pub fn new(payer: impl Payer + 'static) -> Self {
        Self {
            payer: Arc::new(payer),
            max_retries: 1,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

#[async_trait::async_trait]
impl rqm::Middleware for TollgatePayments {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let ctx = PaymentContext {
            url: req.url().to_string(),
            method: req.method().to_string(),
        };
        // Clone before the send consumes the request, for the paid retry.
        let mut retry_req = req.try_clone();

        let mut res = next.clone().run(req, extensions).await?;
        let mut attempts_left = self.max_retries;
        while res.status() == StatusCode::PAYMENT_REQUIRED && attempts_left > 0 {
            attempts_left -= 1;

            // Buffer the 402 body: a non-challenge 402 goes back to the
            // caller exactly as received.
            let status = res.status();
            let headers = res.headers().clone();
            let body = res.bytes().await?;
            let challenge = match serde_json::from_slice::<PaymentRequired>(&body) {
                Ok(envelope) => envelope.challenge,
                Err(_) => {
                    tracing::debug!("402 without a challenge envelope; passing through");
                    return Ok(rebuild_response(status, headers, body));
                }
            };

            tracing::debug!(
                nonce = %challenge.nonce,
                price = %challenge.price,
                asset = %challenge.asset,
                "paying 402 challenge"
            );
            let proof = self
                .payer
                .pay(&challenge, &ctx)
                .await
                .map_err(PaymentRetryError::from)?;
            let header = proof.to_header().map_err(PaymentRetryError::JsonEncode)?;
            let header =
                HeaderValue::from_str(&header).map_err(PaymentRetryError::HeaderValueEncode)?;

            let mut paid = retry_req
                .take()
                .ok_or(PaymentRetryError::RequestNotCloneable)?;
            retry_req = paid.try_clone();
            paid.headers_mut().insert(PAYMENT_PROOF_HEADER, header);

            res = next.clone().run(paid, extensions).await?;
        }
        Ok(res)
    }
}

/// Re-materializes a buffered response so the caller still gets a readable
/// body after the middleware inspected it.
fn rebuild_response<B: Into<reqwest::Body>>(
    status: StatusCode,
    headers: HeaderMap,
    body: B,
) -> Response {
    let mut response = http::Response::new(body.into());
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Response::from(response)
}
