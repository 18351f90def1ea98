use std::fmt;

/// The independently deployed services taking part in an order's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Order,
    Payment,
    Delivery,
    Notification,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 4] = [
        ServiceKind::Order,
        ServiceKind::Payment,
        ServiceKind::Delivery,
        ServiceKind::Notification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Order => "order",
            ServiceKind::Payment => "payment",
            ServiceKind::Delivery => "delivery",
            ServiceKind::Notification => "notification",
        }
    }

    /// Capitalized name used in health and log messages
    pub fn display_name(&self) -> &'static str {
        match self {
            ServiceKind::Order => "Order",
            ServiceKind::Payment => "Payment",
            ServiceKind::Delivery => "Delivery",
            ServiceKind::Notification => "Notification",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
