//! Payment gateway trait and simulated implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use store::Order;

use crate::error::{PipelineError, Result};

/// Result of a confirmed payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfirmation {
    /// The payment ID assigned by the gateway.
    pub payment_id: String,
}

/// Trait for settling an order's payment with an external provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Confirms payment of an order.
    async fn confirm(&self, order: &Order) -> Result<PaymentConfirmation>;
}

/// Gateway that waits a fixed delay and always approves, unless told to fail.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPaymentGateway {
    delay: Duration,
    fail: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl SimulatedPaymentGateway {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Configures the gateway to decline every call.
    pub fn set_fail_on_confirm(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of confirm calls made.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedPaymentGateway {
    async fn confirm(&self, order: &Order) -> Result<PaymentConfirmation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        if self.fail.load(Ordering::SeqCst) {
            return Err(PipelineError::PaymentGateway("Payment declined".to_string()));
        }

        Ok(PaymentConfirmation {
            payment_id: format!("mock-payment-id-{}", order.order_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{AddressId, Money, OrderId, UserId};
    use store::{OrderStatus, PaymentStatus};

    fn order() -> Order {
        Order {
            order_id: OrderId::new(42),
            user_id: UserId::new(7),
            total_price: Money::from_cents(500),
            status: OrderStatus::AwaitingPayment,
            payment_status: PaymentStatus::Unpaid,
            address_id: AddressId::new(1),
            created_at: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_confirm() {
        let gateway = SimulatedPaymentGateway::new(Duration::ZERO);
        let confirmation = gateway.confirm(&order()).await.unwrap();
        assert_eq!(confirmation.payment_id, "mock-payment-id-42");
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_on_confirm() {
        let gateway = SimulatedPaymentGateway::new(Duration::ZERO);
        gateway.set_fail_on_confirm(true);
        assert!(matches!(
            gateway.confirm(&order()).await,
            Err(PipelineError::PaymentGateway(_))
        ));
    }
}
