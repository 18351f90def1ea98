use std::sync::Arc;

use bite_delivery::DeliveryDispatcher;
use bite_notification::NotificationSink;
use bite_order::OrderManager;
use bite_payment::PaymentProcessor;

#[derive(Clone)]
pub struct OrderState {
    pub orders: Arc<OrderManager>,
}

#[derive(Clone)]
pub struct PaymentState {
    pub payments: Arc<PaymentProcessor>,
}

#[derive(Clone)]
pub struct DeliveryState {
    pub deliveries: Arc<DeliveryDispatcher>,
}

#[derive(Clone)]
pub struct NotificationState {
    pub notifications: Arc<NotificationSink>,
}
