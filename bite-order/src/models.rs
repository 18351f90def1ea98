use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::manager::OrderError;

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Paid,
    Preparing,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Created,
        OrderStatus::Paid,
        OrderStatus::Preparing,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Paid => "paid",
            OrderStatus::Preparing => "preparing",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Transition table. Anything not listed is rejected.
    pub fn next_states(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Created => &[OrderStatus::Paid, OrderStatus::Cancelled],
            OrderStatus::Paid => &[OrderStatus::Preparing, OrderStatus::Cancelled],
            OrderStatus::Preparing => &[OrderStatus::OutForDelivery, OrderStatus::Cancelled],
            OrderStatus::OutForDelivery => &[OrderStatus::Delivered],
            OrderStatus::Delivered | OrderStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.next_states().contains(&next)
    }

    pub fn is_cancellable(&self) -> bool {
        self.can_transition_to(OrderStatus::Cancelled)
    }

    /// Milestones the customer is told about when reached through a status update
    pub fn is_milestone(&self) -> bool {
        matches!(
            self,
            OrderStatus::Preparing | OrderStatus::OutForDelivery | OrderStatus::Delivered
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| OrderError::InvalidStatus(s.to_string()))
    }
}

/// A food order. `total_amount` is fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: u64,
    pub user_id: u64,
    pub restaurant_id: u64,
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
    pub status: OrderStatus,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(id: u64, new_order: NewOrder) -> Self {
        let now = Utc::now();
        let total_amount = new_order.items.iter().map(OrderItem::line_total).sum();
        Self {
            id,
            user_id: new_order.user_id,
            restaurant_id: new_order.restaurant_id,
            items: new_order.items,
            total_amount,
            status: OrderStatus::Created,
            address: new_order.address,
            created_at: now,
            updated_at: now,
        }
    }

    /// Update order status
    pub fn update_status(&mut self, new_status: OrderStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }
}

/// A menu item line within an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(default)]
    pub menu_item_id: u64,
    #[serde(default)]
    pub name: String,
    pub price: f64,
    pub quantity: u32,
}

impl OrderItem {
    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

/// Body of `POST /api/orders`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub user_id: u64,
    pub restaurant_id: u64,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub address: String,
}
