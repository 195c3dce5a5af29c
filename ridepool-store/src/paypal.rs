//! PayPal Orders v2 client.
//!
//! Every mutating call carries the caller's idempotency key in the
//! `PayPal-Request-Id` header, so a replay returns the original result.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use ridepool_core::payment::{
    CaptureResult, CaptureState, CreateOrderRequest, PaymentProvider, ProviderError, ProviderOrder, RefundResult,
};
use ridepool_shared::money::{format_cents, parse_amount};
use ridepool_shared::Masked;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct PayPalProvider {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: Masked<String>,
    token: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Deserialize)]
struct Amount {
    value: String,
}

#[derive(Deserialize)]
struct Capture {
    id: String,
    status: String,
    amount: Amount,
}

#[derive(Deserialize)]
struct Payments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Deserialize)]
struct PurchaseUnit {
    payments: Payments,
}

#[derive(Deserialize)]
struct CaptureResponse {
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Deserialize)]
struct RefundResponse {
    id: String,
    amount: Option<Amount>,
}

/// Refresh the token this long before PayPal says it expires.
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

impl PayPalProvider {
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Masked<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(self.client_secret.expose()))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await
            .map_err(transport_error)?;
        let body: TokenResponse = read_json(response).await?;

        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_MARGIN);
        *cached = Some(CachedToken {
            value: body.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        debug!("Refreshed PayPal access token");
        Ok(body.access_token)
    }

    async fn post(&self, path: &str, idempotency_key: &str, body: serde_json::Value) -> Result<Response, ProviderError> {
        let token = self.access_token().await?;
        self.client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .header("PayPal-Request-Id", idempotency_key)
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)
    }
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else if err.is_connect() {
        ProviderError::ProviderDown(err.to_string())
    } else {
        ProviderError::Transient(err.to_string())
    }
}

fn status_error(status: StatusCode, body: String) -> ProviderError {
    let message = format!("{}: {}", status.as_u16(), body);
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY | StatusCode::PAYMENT_REQUIRED => {
            ProviderError::Declined(message)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
            ProviderError::ProviderDown(message)
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_MANY_REQUESTS => {
            ProviderError::Transient(message)
        }
        s if s.is_server_error() => ProviderError::Transient(message),
        _ => ProviderError::Declined(message),
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    let status = response.status();
    if status.is_success() {
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Transient(format!("unreadable response: {}", e)))
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, body))
    }
}

fn cents(amount: &Amount) -> Result<i64, ProviderError> {
    parse_amount(&amount.value)
        .ok_or_else(|| ProviderError::Transient(format!("unparseable amount '{}'", amount.value)))
}

#[async_trait]
impl PaymentProvider for PayPalProvider {
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<ProviderOrder, ProviderError> {
        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": request.booking_id.to_string(),
                "custom_id": request.booking_id.to_string(),
                "description": request.description,
                "amount": {
                    "currency_code": request.currency,
                    "value": format_cents(request.amount_cents),
                },
            }],
        });
        let response = self.post("/v2/checkout/orders", &request.idempotency_key, body).await?;
        let order: OrderResponse = read_json(response).await?;

        let approval_url = order
            .links
            .iter()
            .find(|l| l.rel == "approve" || l.rel == "payer-action")
            .map(|l| l.href.clone())
            .ok_or_else(|| ProviderError::Transient(format!("order {} has no approval link", order.id)))?;

        info!("Created PayPal order {} for booking {}", order.id, request.booking_id);
        Ok(ProviderOrder {
            order_id: order.id,
            approval_url,
        })
    }

    async fn capture(&self, order_id: &str, idempotency_key: &str) -> Result<CaptureResult, ProviderError> {
        let path = format!("/v2/checkout/orders/{}/capture", order_id);
        let response = self.post(&path, idempotency_key, json!({})).await?;
        let body: CaptureResponse = read_json(response).await?;

        let capture = body
            .purchase_units
            .into_iter()
            .flat_map(|u| u.payments.captures)
            .next()
            .ok_or_else(|| ProviderError::Transient(format!("order {} returned no capture", order_id)))?;

        let state = match capture.status.as_str() {
            "COMPLETED" => CaptureState::Completed,
            "PENDING" => CaptureState::Pending,
            other => return Err(ProviderError::Declined(format!("capture status {}", other))),
        };
        Ok(CaptureResult {
            amount_cents: cents(&capture.amount)?,
            capture_id: capture.id,
            state,
        })
    }

    async fn refund(
        &self,
        capture_id: &str,
        amount_cents: i64,
        currency: &str,
        idempotency_key: &str,
    ) -> Result<RefundResult, ProviderError> {
        let path = format!("/v2/payments/captures/{}/refund", capture_id);
        let body = json!({
            "amount": {
                "currency_code": currency,
                "value": format_cents(amount_cents),
            },
        });
        let response = self.post(&path, idempotency_key, body).await?;
        let refund: RefundResponse = read_json(response).await?;

        let refunded = match refund.amount.as_ref() {
            Some(amount) => cents(amount)?,
            None => amount_cents,
        };
        info!("Refunded {} cents on capture {}", refunded, capture_id);
        Ok(RefundResult {
            refund_id: refund.id,
            amount_cents: refunded,
        })
    }
}
