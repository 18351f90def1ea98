use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dispatcher::DeliveryError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Assigned,
    PickedUp,
    Delivered,
    Cancelled,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 5] = [
        DeliveryStatus::Pending,
        DeliveryStatus::Assigned,
        DeliveryStatus::PickedUp,
        DeliveryStatus::Delivered,
        DeliveryStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Assigned => "assigned",
            DeliveryStatus::PickedUp => "picked_up",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Cancelled => "cancelled",
        }
    }

    /// Transition table; cancellation is open to every non-terminal state
    pub fn next_states(&self) -> &'static [DeliveryStatus] {
        match self {
            DeliveryStatus::Pending => &[DeliveryStatus::Assigned, DeliveryStatus::Cancelled],
            DeliveryStatus::Assigned => &[DeliveryStatus::PickedUp, DeliveryStatus::Cancelled],
            DeliveryStatus::PickedUp => &[DeliveryStatus::Delivered, DeliveryStatus::Cancelled],
            DeliveryStatus::Delivered | DeliveryStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: DeliveryStatus) -> bool {
        self.next_states().contains(&next)
    }

    /// Whether reaching this status hands the courier back to the pool
    pub fn releases_courier(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Cancelled)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = DeliveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeliveryStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DeliveryError::InvalidStatus(s.to_string()))
    }
}

/// Times are in minutes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub id: u64,
    pub order_id: u64,
    pub user_id: u64,
    pub restaurant_id: u64,
    /// Unset until a courier is assigned
    pub courier_id: Option<u64>,
    pub status: DeliveryStatus,
    pub address: String,
    pub estimated_time: u32,
    /// Set on delivery
    pub actual_time: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    pub fn update_status(&mut self, status: DeliveryStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Courier {
    pub id: u64,
    pub name: String,
    pub phone: String,
    pub available: bool,
    pub location: String,
}

/// Body of `POST /api/couriers`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewCourier {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub location: String,
    /// Defaults to available
    #[serde(default)]
    pub available: Option<bool>,
}
