//! Typed cross-service events and the in-process outbox that carries them.
//!
//! Repositories enqueue a [`FanOut`] while still holding the lock that made
//! the state change, so the event and the change are decided together. A
//! separate worker (see `bite-store`) drains the [`OutboxReceiver`] and
//! performs the HTTP calls. Nothing here is durable.

use bite_shared::{
    CreateDeliveryRequest, CreateNotificationRequest, CreatePaymentRequest, StatusUpdateRequest,
};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ServiceKind;

/// A state change in one service that another service must hear about
#[derive(Debug, Clone, PartialEq)]
pub enum FanOut {
    /// Order created: open a pending payment for it
    RequestPayment(CreatePaymentRequest),
    /// Order paid: open a delivery for it
    RequestDelivery(CreateDeliveryRequest),
    /// User-visible milestone reached
    Notify(CreateNotificationRequest),
    /// Payment or delivery progress feeding back into the order state machine
    UpdateOrderStatus { order_id: u64, status: String },
}

/// Header carrying [`Envelope::idempotency_key`] on every fan-out call.
/// Receivers that create records replay the first result for a repeated key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOutMethod {
    Post,
    Put,
}

impl FanOut {
    pub fn update_order_status(order_id: u64, status: impl Into<String>) -> Self {
        FanOut::UpdateOrderStatus {
            order_id,
            status: status.into(),
        }
    }

    pub fn target(&self) -> ServiceKind {
        match self {
            FanOut::RequestPayment(_) => ServiceKind::Payment,
            FanOut::RequestDelivery(_) => ServiceKind::Delivery,
            FanOut::Notify(_) => ServiceKind::Notification,
            FanOut::UpdateOrderStatus { .. } => ServiceKind::Order,
        }
    }

    /// The order this event belongs to, if any
    pub fn order_id(&self) -> Option<u64> {
        match self {
            FanOut::RequestPayment(req) => Some(req.order_id),
            FanOut::RequestDelivery(req) => Some(req.order_id),
            FanOut::Notify(req) => req.order_id,
            FanOut::UpdateOrderStatus { order_id, .. } => Some(*order_id),
        }
    }

    /// Events sharing a key must reach the target in enqueue order
    pub fn ordering_key(&self) -> (ServiceKind, Option<u64>) {
        (self.target(), self.order_id())
    }

    pub fn method(&self) -> FanOutMethod {
        match self {
            FanOut::UpdateOrderStatus { .. } => FanOutMethod::Put,
            _ => FanOutMethod::Post,
        }
    }

    /// Path on the target service's public API
    pub fn path(&self) -> String {
        match self {
            FanOut::RequestPayment(_) => "/api/payments".to_string(),
            FanOut::RequestDelivery(_) => "/api/deliveries".to_string(),
            FanOut::Notify(_) => "/api/notifications".to_string(),
            FanOut::UpdateOrderStatus { order_id, .. } => {
                format!("/api/orders/{}/status", order_id)
            }
        }
    }

    pub fn body(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            FanOut::RequestPayment(req) => serde_json::to_value(req),
            FanOut::RequestDelivery(req) => serde_json::to_value(req),
            FanOut::Notify(req) => serde_json::to_value(req),
            FanOut::UpdateOrderStatus { status, .. } => {
                serde_json::to_value(StatusUpdateRequest::new(status.clone()))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FanOut::RequestPayment(_) => "request_payment",
            FanOut::RequestDelivery(_) => "request_delivery",
            FanOut::Notify(_) => "notify",
            FanOut::UpdateOrderStatus { .. } => "update_order_status",
        }
    }
}

/// An enqueued event plus the bookkeeping the worker logs with it
#[derive(Debug, Clone)]
pub struct Envelope {
    pub id: Uuid,
    pub event: FanOut,
}

impl Envelope {
    /// Stable across retries of this envelope
    pub fn idempotency_key(&self) -> String {
        self.id.to_string()
    }
}

/// Producer half, cloned into every repository with outbound effects
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Envelope>,
}

/// Consumer half, owned by the delivery worker
#[derive(Debug)]
pub struct OutboxReceiver {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl Outbox {
    pub fn channel() -> (Outbox, OutboxReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Outbox { tx }, OutboxReceiver { rx })
    }

    /// Never blocks. A closed outbox only costs a log line; the state change
    /// that produced the event stands.
    pub fn enqueue(&self, event: FanOut) {
        let envelope = Envelope {
            id: Uuid::new_v4(),
            event,
        };
        let (id, name) = (envelope.id, envelope.event.name());

        match self.tx.send(envelope) {
            Ok(()) => tracing::debug!(envelope_id = %id, event = name, "Fan-out event enqueued"),
            Err(_) => tracing::warn!(envelope_id = %id, event = name, "Outbox closed, fan-out event dropped"),
        }
    }
}

impl OutboxReceiver {
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }

    /// Everything currently queued, oldest first
    pub fn drain(&mut self) -> Vec<FanOut> {
        let mut events = Vec::new();
        while let Some(envelope) = self.try_recv() {
            events.push(envelope.event);
        }
        events
    }
}
