//! In-process payment provider for tests and local development builds.

use async_trait::async_trait;
use parking_lot::Mutex;
use ridepool_core::payment::{
    CaptureResult, CaptureState, CreateOrderRequest, PaymentProvider, ProviderError, ProviderOrder, RefundResult,
};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// What the mock provider should do on its next call of a kind.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Fail(ProviderError),
    /// Sleep before answering, to trip timeouts.
    Delay(Duration),
}

#[derive(Debug, Default)]
struct MockState {
    create: VecDeque<MockOutcome>,
    capture: VecDeque<MockOutcome>,
    refund: VecDeque<MockOutcome>,
    capture_state: Option<CaptureState>,
    orders: HashMap<String, (ProviderOrder, i64)>,
    refunds: HashMap<String, RefundResult>,
    calls: Vec<String>,
}

/// In-process provider. Replays results for repeated idempotency keys and
/// can be scripted to fail or stall.
#[derive(Debug, Default)]
pub struct MockPaymentProvider {
    state: Mutex<MockState>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_create(&self, outcome: MockOutcome) {
        self.state.lock().create.push_back(outcome);
    }

    pub fn script_capture(&self, outcome: MockOutcome) {
        self.state.lock().capture.push_back(outcome);
    }

    pub fn script_refund(&self, outcome: MockOutcome) {
        self.state.lock().refund.push_back(outcome);
    }

    /// Makes captures report `state` instead of `Completed`.
    pub fn set_capture_state(&self, state: CaptureState) {
        self.state.lock().capture_state = Some(state);
    }

    /// `"<op>:<idempotency key>"` for every call received.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        let prefix = format!("{}:", op);
        self.state.lock().calls.iter().filter(|c| c.starts_with(&prefix)).count()
    }

    async fn scripted(&self, pick: fn(&mut MockState) -> &mut VecDeque<MockOutcome>) -> Result<(), ProviderError> {
        let next = pick(&mut self.state.lock()).pop_front();
        match next {
            Some(MockOutcome::Fail(e)) => Err(e),
            Some(MockOutcome::Delay(d)) => {
                tokio::time::sleep(d).await;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<ProviderOrder, ProviderError> {
        self.state
            .lock()
            .calls
            .push(format!("create:{}", request.idempotency_key));
        self.scripted(|s| &mut s.create).await?;

        let mut state = self.state.lock();
        let order_id = format!("mock_order_{}", request.idempotency_key);
        if let Some((order, _)) = state.orders.get(&order_id) {
            return Ok(order.clone());
        }
        let order = ProviderOrder {
            order_id: order_id.clone(),
            approval_url: format!("https://pay.example.test/approve/{}", order_id),
        };
        state.orders.insert(order_id, (order.clone(), request.amount_cents));
        Ok(order)
    }

    async fn capture(&self, order_id: &str, idempotency_key: &str) -> Result<CaptureResult, ProviderError> {
        self.state.lock().calls.push(format!("capture:{}", idempotency_key));
        self.scripted(|s| &mut s.capture).await?;

        let state = self.state.lock();
        let amount = state
            .orders
            .get(order_id)
            .map(|(_, amount)| *amount)
            .ok_or_else(|| ProviderError::Declined(format!("unknown order {}", order_id)))?;
        Ok(CaptureResult {
            capture_id: format!("mock_capture_{}", order_id),
            state: state.capture_state.unwrap_or(CaptureState::Completed),
            amount_cents: amount,
        })
    }

    async fn refund(
        &self,
        capture_id: &str,
        amount_cents: i64,
        _currency: &str,
        idempotency_key: &str,
    ) -> Result<RefundResult, ProviderError> {
        self.state.lock().calls.push(format!("refund:{}", idempotency_key));
        self.scripted(|s| &mut s.refund).await?;

        let mut state = self.state.lock();
        if let Some(existing) = state.refunds.get(idempotency_key) {
            return Ok(existing.clone());
        }
        let refund = RefundResult {
            refund_id: format!("mock_refund_{}_{}", capture_id, state.refunds.len() + 1),
            amount_cents,
        };
        state.refunds.insert(idempotency_key.to_string(), refund.clone());
        Ok(refund)
    }
}
