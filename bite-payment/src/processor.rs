use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bite_core::{FanOut, Outbox, RandomSource};
use bite_shared::CreatePaymentRequest;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::models::{Payment, PaymentMethod, PaymentStatus};

/// One in this many settlements fails
const FAILURE_ODDS: u32 = 10;

/// Owns the payments of this service and simulates their settlement.
pub struct PaymentProcessor {
    ledger: Mutex<PaymentLedger>,
    outbox: Outbox,
    random: Arc<dyn RandomSource>,
}

struct PaymentLedger {
    payments: BTreeMap<u64, Payment>,
    /// Idempotency key -> payment it created
    keys: HashMap<String, u64>,
    next_id: u64,
}

impl PaymentLedger {
    fn get_mut(&mut self, payment_id: u64) -> Result<&mut Payment, PaymentError> {
        self.payments
            .get_mut(&payment_id)
            .ok_or(PaymentError::NotFound(payment_id))
    }
}

impl PaymentProcessor {
    pub fn new(outbox: Outbox, random: Arc<dyn RandomSource>) -> Self {
        Self {
            ledger: Mutex::new(PaymentLedger {
                payments: BTreeMap::new(),
                keys: HashMap::new(),
                next_id: 1,
            }),
            outbox,
            random,
        }
    }

    /// Open a pending payment. Method defaults to card.
    pub async fn create_payment(&self, req: CreatePaymentRequest) -> Result<Payment, PaymentError> {
        self.create_payment_with_key(req, None).await
    }

    /// As [`Self::create_payment`], but a key seen before returns the payment
    /// it opened instead of a new one
    pub async fn create_payment_with_key(
        &self,
        req: CreatePaymentRequest,
        idempotency_key: Option<&str>,
    ) -> Result<Payment, PaymentError> {
        let method = match req.method.as_deref() {
            None | Some("") => PaymentMethod::default(),
            Some(method) => method.parse()?,
        };

        let now = Utc::now();
        let mut ledger = self.ledger.lock().await;
        if let Some(existing) = idempotency_key
            .and_then(|key| ledger.keys.get(key))
            .and_then(|id| ledger.payments.get(id))
        {
            tracing::debug!(payment_id = existing.id, "Replaying payment for repeated idempotency key");
            return Ok(existing.clone());
        }

        let id = ledger.next_id;
        ledger.next_id += 1;

        let payment = Payment {
            id,
            order_id: req.order_id,
            user_id: req.user_id,
            amount: req.amount,
            status: PaymentStatus::Pending,
            method,
            description: req.description,
            created_at: now,
            updated_at: now,
        };
        ledger.payments.insert(id, payment.clone());
        if let Some(key) = idempotency_key {
            ledger.keys.insert(key.to_string(), id);
        }

        tracing::info!(payment_id = id, order_id = payment.order_id, amount = payment.amount, "Payment opened");
        Ok(payment)
    }

    pub async fn get_payment(&self, payment_id: u64) -> Result<Payment, PaymentError> {
        let ledger = self.ledger.lock().await;
        ledger
            .payments
            .get(&payment_id)
            .cloned()
            .ok_or(PaymentError::NotFound(payment_id))
    }

    pub async fn list_payments(&self) -> Vec<Payment> {
        self.ledger.lock().await.payments.values().cloned().collect()
    }

    pub async fn list_by_order(&self, order_id: u64) -> Vec<Payment> {
        let ledger = self.ledger.lock().await;
        ledger
            .payments
            .values()
            .filter(|payment| payment.order_id == order_id)
            .cloned()
            .collect()
    }

    /// Settle a pending payment. On success the order is marked paid.
    pub async fn process_payment(
        &self,
        payment_id: u64,
        method: PaymentMethod,
    ) -> Result<Payment, PaymentError> {
        let mut ledger = self.ledger.lock().await;
        let payment = ledger.get_mut(payment_id)?;

        if payment.status != PaymentStatus::Pending {
            return Err(PaymentError::NotPending(payment.status));
        }

        let settled = self.random.below(FAILURE_ODDS) != 0;
        payment.method = method;
        payment.update_status(if settled {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Failed
        });
        let payment = payment.clone();

        if settled {
            self.outbox
                .enqueue(FanOut::update_order_status(payment.order_id, "paid"));
            tracing::info!("Payment {} completed for order {}", payment.id, payment.order_id);
        } else {
            tracing::warn!("Payment {} failed for order {}", payment.id, payment.order_id);
        }

        Ok(payment)
    }

    /// Refund a completed payment and cancel its order
    pub async fn refund_payment(&self, payment_id: u64) -> Result<Payment, PaymentError> {
        let mut ledger = self.ledger.lock().await;
        let payment = ledger.get_mut(payment_id)?;

        if !payment.status.can_transition_to(PaymentStatus::Refunded) {
            return Err(PaymentError::NotRefundable(payment.status));
        }

        payment.update_status(PaymentStatus::Refunded);
        let payment = payment.clone();

        self.outbox
            .enqueue(FanOut::update_order_status(payment.order_id, "cancelled"));

        tracing::info!("Payment {} refunded, cancelling order {}", payment.id, payment.order_id);
        Ok(payment)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment not found")]
    NotFound(u64),

    #[error("Invalid payment method")]
    InvalidMethod(String),

    #[error("Only pending payments can be processed (current status: {0})")]
    NotPending(PaymentStatus),

    #[error("Only completed payments can be refunded")]
    NotRefundable(PaymentStatus),
}

#[cfg(test)]
mod tests {
    use super::*;
    use bite_core::{OutboxReceiver, ScriptedRandom};

    fn processor(random: ScriptedRandom) -> (PaymentProcessor, OutboxReceiver) {
        let (outbox, receiver) = Outbox::channel();
        (PaymentProcessor::new(outbox, Arc::new(random)), receiver)
    }

    fn request(order_id: u64) -> CreatePaymentRequest {
        CreatePaymentRequest {
            order_id,
            user_id: 1,
            amount: 20.0,
            method: None,
            description: format!("Payment for order #{}", order_id),
        }
    }

    #[tokio::test]
    async fn test_create_defaults() {
        let (processor, mut outbox) = processor(ScriptedRandom::constant(1));

        let payment = processor.create_payment(request(4)).await.unwrap();
        assert_eq!(payment.id, 1);
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.method, PaymentMethod::Card);
        assert!(outbox.drain().is_empty());

        let mut cash = request(5);
        cash.method = Some("cash".to_string());
        assert_eq!(processor.create_payment(cash).await.unwrap().method, PaymentMethod::Cash);

        let mut bogus = request(6);
        bogus.method = Some("barter".to_string());
        assert!(matches!(processor.create_payment(bogus).await, Err(PaymentError::InvalidMethod(_))));
    }

    #[tokio::test]
    async fn test_repeated_key_replays_payment() {
        let (processor, _outbox) = processor(ScriptedRandom::constant(1));

        let first = processor.create_payment_with_key(request(4), Some("k-1")).await.unwrap();
        let replay = processor.create_payment_with_key(request(4), Some("k-1")).await.unwrap();
        let other = processor.create_payment_with_key(request(4), Some("k-2")).await.unwrap();

        assert_eq!(replay.id, first.id);
        assert_eq!(other.id, 2);
        assert_eq!(processor.list_by_order(4).await.len(), 2);
    }

    #[tokio::test]
    async fn test_successful_settlement_marks_order_paid() {
        let (processor, mut outbox) = processor(ScriptedRandom::constant(3));
        let payment = processor.create_payment(request(4)).await.unwrap();

        let processed = processor.process_payment(payment.id, PaymentMethod::Cash).await.unwrap();
        assert_eq!(processed.status, PaymentStatus::Completed);
        assert_eq!(processed.method, PaymentMethod::Cash);
        assert_eq!(outbox.drain(), vec![FanOut::update_order_status(4, "paid")]);
    }

    #[tokio::test]
    async fn test_failed_settlement_is_silent() {
        let (processor, mut outbox) = processor(ScriptedRandom::new([0]));
        let payment = processor.create_payment(request(4)).await.unwrap();

        let processed = processor.process_payment(payment.id, PaymentMethod::Card).await.unwrap();
        assert_eq!(processed.status, PaymentStatus::Failed);
        assert!(outbox.drain().is_empty());

        // failed is terminal
        let retry = processor.process_payment(payment.id, PaymentMethod::Card).await;
        assert!(matches!(retry, Err(PaymentError::NotPending(PaymentStatus::Failed))));
    }

    #[tokio::test]
    async fn test_refund_rules() {
        let (processor, mut outbox) = processor(ScriptedRandom::constant(5));
        let payment = processor.create_payment(request(9)).await.unwrap();

        // pending cannot be refunded and stays untouched
        let early = processor.refund_payment(payment.id).await;
        assert!(matches!(early, Err(PaymentError::NotRefundable(PaymentStatus::Pending))));
        assert_eq!(processor.get_payment(payment.id).await.unwrap().status, PaymentStatus::Pending);

        processor.process_payment(payment.id, PaymentMethod::Card).await.unwrap();
        outbox.drain();

        let refunded = processor.refund_payment(payment.id).await.unwrap();
        assert_eq!(refunded.status, PaymentStatus::Refunded);
        assert_eq!(outbox.drain(), vec![FanOut::update_order_status(9, "cancelled")]);

        let twice = processor.refund_payment(payment.id).await;
        assert!(matches!(twice, Err(PaymentError::NotRefundable(PaymentStatus::Refunded))));
        assert!(outbox.drain().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_payment() {
        let (processor, _outbox) = processor(ScriptedRandom::constant(1));

        assert!(matches!(processor.get_payment(3).await, Err(PaymentError::NotFound(3))));
        assert!(matches!(
            processor.process_payment(3, PaymentMethod::Card).await,
            Err(PaymentError::NotFound(3))
        ));
        assert!(matches!(processor.refund_payment(3).await, Err(PaymentError::NotFound(3))));
    }

    #[tokio::test]
    async fn test_list_by_order() {
        let (processor, _outbox) = processor(ScriptedRandom::constant(1));
        processor.create_payment(request(1)).await.unwrap();
        processor.create_payment(request(2)).await.unwrap();
        processor.create_payment(request(1)).await.unwrap();

        assert_eq!(processor.list_by_order(1).await.len(), 2);
        assert!(processor.list_by_order(7).await.is_empty());
        assert_eq!(processor.list_payments().await.len(), 3);
    }
}
