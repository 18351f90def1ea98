//! Request bodies exchanged between services.
//!
//! Services talk to each other through the same public endpoints clients use,
//! so these types double as the inbound body of those endpoints.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/payments`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub order_id: u64,
    pub user_id: u64,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default)]
    pub description: String,
}

/// Body of `POST /api/deliveries`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeliveryRequest {
    pub order_id: u64,
    pub user_id: u64,
    pub restaurant_id: u64,
    #[serde(default)]
    pub address: String,
    /// Minutes. Missing or zero lets the dispatcher pick one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<u32>,
}

/// Body of `POST /api/notifications`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationRequest {
    pub user_id: u64,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Body of every `PUT .../status` endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusUpdateRequest {
    pub status: String,
}

impl StatusUpdateRequest {
    pub fn new(status: impl Into<String>) -> Self {
        Self { status: status.into() }
    }
}
