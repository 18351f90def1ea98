use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message for a user. Only `read` changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: u64,
    pub user_id: u64,
    /// e.g. `order_update`, `delivery_update`, `payment_update`
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
