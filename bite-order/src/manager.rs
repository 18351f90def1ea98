use std::collections::BTreeMap;

use bite_core::{FanOut, Outbox};
use bite_shared::{CreateDeliveryRequest, CreateNotificationRequest, CreatePaymentRequest};
use tokio::sync::Mutex;

use crate::models::{NewOrder, Order, OrderItem, OrderStatus};

/// Owns every order of this service and the order status state machine.
///
/// All reads and writes go through one lock. Fan-out events are enqueued
/// while the lock is held so they reflect exactly the committed change.
pub struct OrderManager {
    book: Mutex<OrderBook>,
    outbox: Outbox,
}

struct OrderBook {
    orders: BTreeMap<u64, Order>,
    next_id: u64,
}

impl OrderBook {
    fn get_mut(&mut self, order_id: u64) -> Result<&mut Order, OrderError> {
        self.orders
            .get_mut(&order_id)
            .ok_or(OrderError::NotFound(order_id))
    }
}

impl OrderManager {
    pub fn new(outbox: Outbox) -> Self {
        Self {
            book: Mutex::new(OrderBook {
                orders: BTreeMap::new(),
                next_id: 1,
            }),
            outbox,
        }
    }

    /// Create an order and ask the payment service to open a payment for it
    pub async fn create_order(&self, new_order: NewOrder) -> Order {
        let mut book = self.book.lock().await;
        let id = book.next_id;
        book.next_id += 1;

        let order = Order::new(id, new_order);
        book.orders.insert(id, order.clone());

        self.outbox.enqueue(FanOut::RequestPayment(CreatePaymentRequest {
            order_id: order.id,
            user_id: order.user_id,
            amount: order.total_amount,
            method: None,
            description: format!("Payment for order #{}", order.id),
        }));

        tracing::info!(order_id = order.id, total = order.total_amount, "Order created");
        order
    }

    pub async fn get_order(&self, order_id: u64) -> Result<Order, OrderError> {
        let book = self.book.lock().await;
        book.orders
            .get(&order_id)
            .cloned()
            .ok_or(OrderError::NotFound(order_id))
    }

    pub async fn list_orders(&self) -> Vec<Order> {
        self.book.lock().await.orders.values().cloned().collect()
    }

    pub async fn list_by_user(&self, user_id: u64) -> Vec<Order> {
        self.filtered(|order| order.user_id == user_id).await
    }

    pub async fn list_by_restaurant(&self, restaurant_id: u64) -> Vec<Order> {
        self.filtered(|order| order.restaurant_id == restaurant_id).await
    }

    async fn filtered(&self, predicate: impl Fn(&Order) -> bool) -> Vec<Order> {
        let book = self.book.lock().await;
        book.orders
            .values()
            .filter(|order| predicate(order))
            .cloned()
            .collect()
    }

    /// Move an order along the transition table.
    ///
    /// `paid` opens a delivery; `preparing`, `out_for_delivery` and
    /// `delivered` notify the customer. Re-applying the current status is a
    /// no-op without side effects.
    pub async fn set_status(&self, order_id: u64, status: OrderStatus) -> Result<Order, OrderError> {
        let mut book = self.book.lock().await;
        let order = book.get_mut(order_id)?;

        if order.status == status {
            tracing::debug!(order_id, status = %status, "Order already in requested status");
            return Ok(order.clone());
        }

        if !order.status.can_transition_to(status) {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to: status,
            });
        }

        let previous = order.status;
        order.update_status(status);
        let order = order.clone();

        if status == OrderStatus::Paid {
            self.outbox.enqueue(FanOut::RequestDelivery(delivery_request(&order)));
        } else if status.is_milestone() {
            self.outbox.enqueue(FanOut::Notify(status_notification(&order)));
        }

        tracing::info!("Order {} moved from {} to {}", order.id, previous, status);
        Ok(order)
    }

    /// Cancel an order that has not left the restaurant yet
    pub async fn cancel_order(&self, order_id: u64) -> Result<Order, OrderError> {
        let mut book = self.book.lock().await;
        let order = book.get_mut(order_id)?;

        if order.status == OrderStatus::Cancelled {
            return Ok(order.clone());
        }

        if !order.status.is_cancellable() {
            return Err(OrderError::NotCancellable(order.status));
        }

        order.update_status(OrderStatus::Cancelled);
        let order = order.clone();

        self.outbox.enqueue(FanOut::Notify(status_notification(&order)));

        tracing::info!(order_id, "Order cancelled");
        Ok(order)
    }

    /// Demo order present on a fresh deployment
    pub async fn seed_sample_data(&self) {
        let mut book = self.book.lock().await;
        let id = book.next_id;
        book.next_id += 1;

        let order = Order::new(
            id,
            NewOrder {
                user_id: 1,
                restaurant_id: 1,
                items: vec![OrderItem {
                    menu_item_id: 1,
                    name: "Margherita Pizza".to_string(),
                    price: 12.99,
                    quantity: 2,
                }],
                address: "123 Main St, City".to_string(),
            },
        );
        book.orders.insert(id, order);
    }
}

fn delivery_request(order: &Order) -> CreateDeliveryRequest {
    CreateDeliveryRequest {
        order_id: order.id,
        user_id: order.user_id,
        restaurant_id: order.restaurant_id,
        address: order.address.clone(),
        estimated_time: None,
    }
}

fn status_notification(order: &Order) -> CreateNotificationRequest {
    CreateNotificationRequest {
        user_id: order.user_id,
        kind: "order_update".to_string(),
        message: format!(
            "Your order #{} status has been updated to: {}",
            order.id, order.status
        ),
        order_id: Some(order.id),
        status: Some(order.status.to_string()),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order not found")]
    NotFound(u64),

    #[error("Invalid status value")]
    InvalidStatus(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Cannot cancel order that is out for delivery or already delivered")]
    NotCancellable(OrderStatus),
}

#[cfg(test)]
mod tests {
    use super::*;
    use bite_core::OutboxReceiver;

    fn manager() -> (OrderManager, OutboxReceiver) {
        let (outbox, receiver) = Outbox::channel();
        (OrderManager::new(outbox), receiver)
    }

    fn pizza_order(user_id: u64, restaurant_id: u64) -> NewOrder {
        NewOrder {
            user_id,
            restaurant_id,
            items: vec![OrderItem {
                menu_item_id: 1,
                name: "Pizza".to_string(),
                price: 10.0,
                quantity: 2,
            }],
            address: "1 Main St".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_order_requests_payment() {
        let (manager, mut outbox) = manager();

        let order = manager.create_order(pizza_order(7, 3)).await;
        assert_eq!(order.id, 1);
        assert_eq!(order.total_amount, 20.0);
        assert_eq!(order.status, OrderStatus::Created);

        let events = outbox.drain();
        assert_eq!(
            events,
            vec![FanOut::RequestPayment(CreatePaymentRequest {
                order_id: 1,
                user_id: 7,
                amount: 20.0,
                method: None,
                description: "Payment for order #1".to_string(),
            })]
        );

        let second = manager.create_order(pizza_order(7, 3)).await;
        assert_eq!(second.id, 2);
    }

    #[tokio::test]
    async fn test_order_lifecycle_fan_out() {
        let (manager, mut outbox) = manager();
        let order = manager.create_order(pizza_order(7, 3)).await;
        outbox.drain();

        // created -> paid opens a delivery
        let paid = manager.set_status(order.id, OrderStatus::Paid).await.unwrap();
        assert_eq!(paid.status, OrderStatus::Paid);
        let events = outbox.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], FanOut::RequestDelivery(req) if req.order_id == order.id && req.restaurant_id == 3));

        // each later milestone notifies the customer
        for status in [OrderStatus::Preparing, OrderStatus::OutForDelivery, OrderStatus::Delivered] {
            manager.set_status(order.id, status).await.unwrap();
            let events = outbox.drain();
            assert_eq!(events.len(), 1);
            match &events[0] {
                FanOut::Notify(req) => {
                    assert_eq!(req.user_id, 7);
                    assert_eq!(req.status.as_deref(), Some(status.as_str()));
                    assert!(req.message.ends_with(status.as_str()));
                }
                other => panic!("unexpected event {:?}", other),
            }
        }

        let delivered = manager.get_order(order.id).await.unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);
        // never recomputed
        assert_eq!(delivered.total_amount, 20.0);
    }

    #[tokio::test]
    async fn test_invalid_transition() {
        let (manager, mut outbox) = manager();
        let order = manager.create_order(pizza_order(1, 1)).await;
        outbox.drain();

        // Cannot go directly from created to delivered
        let result = manager.set_status(order.id, OrderStatus::Delivered).await;
        assert!(matches!(
            result,
            Err(OrderError::InvalidTransition { from: OrderStatus::Created, to: OrderStatus::Delivered })
        ));
        assert_eq!(manager.get_order(order.id).await.unwrap().status, OrderStatus::Created);
        assert!(outbox.drain().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_status_is_noop() {
        let (manager, mut outbox) = manager();
        let order = manager.create_order(pizza_order(1, 1)).await;
        manager.set_status(order.id, OrderStatus::Paid).await.unwrap();
        outbox.drain();

        let again = manager.set_status(order.id, OrderStatus::Paid).await.unwrap();
        assert_eq!(again.status, OrderStatus::Paid);
        assert!(outbox.drain().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let (manager, mut outbox) = manager();
        let order = manager.create_order(pizza_order(1, 1)).await;
        outbox.drain();

        let cancelled = manager.cancel_order(order.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(matches!(&outbox.drain()[..], [FanOut::Notify(req)] if req.status.as_deref() == Some("cancelled")));

        let late = manager.create_order(pizza_order(1, 1)).await;
        for status in [OrderStatus::Paid, OrderStatus::Preparing, OrderStatus::OutForDelivery] {
            manager.set_status(late.id, status).await.unwrap();
        }
        outbox.drain();

        let result = manager.cancel_order(late.id).await;
        assert!(matches!(result, Err(OrderError::NotCancellable(OrderStatus::OutForDelivery))));
        assert_eq!(manager.get_order(late.id).await.unwrap().status, OrderStatus::OutForDelivery);
        assert!(outbox.drain().is_empty());

        manager.set_status(late.id, OrderStatus::Delivered).await.unwrap();
        assert!(manager.cancel_order(late.id).await.is_err());
        assert_eq!(manager.get_order(late.id).await.unwrap().status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let (manager, _outbox) = manager();

        assert!(matches!(manager.get_order(99).await, Err(OrderError::NotFound(99))));
        assert!(matches!(manager.set_status(99, OrderStatus::Paid).await, Err(OrderError::NotFound(99))));
        assert!(matches!(manager.cancel_order(99).await, Err(OrderError::NotFound(99))));
    }

    #[tokio::test]
    async fn test_filters() {
        let (manager, _outbox) = manager();
        manager.create_order(pizza_order(1, 10)).await;
        manager.create_order(pizza_order(2, 10)).await;
        manager.create_order(pizza_order(1, 20)).await;

        let by_user: Vec<u64> = manager.list_by_user(1).await.iter().map(|o| o.id).collect();
        assert_eq!(by_user, vec![1, 3]);
        assert_eq!(manager.list_by_restaurant(10).await.len(), 2);
        assert!(manager.list_by_user(42).await.is_empty());
        assert_eq!(manager.list_orders().await.len(), 3);
    }

    #[tokio::test]
    async fn test_seed_sample_data() {
        let (manager, mut outbox) = manager();
        manager.seed_sample_data().await;

        let order = manager.get_order(1).await.unwrap();
        assert_eq!(order.total_amount, 25.98);
        assert!(outbox.drain().is_empty());
        assert_eq!(manager.create_order(pizza_order(1, 1)).await.id, 2);
    }
}
