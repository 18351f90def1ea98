pub mod models;

pub use models::requests::{
    CreateDeliveryRequest, CreateNotificationRequest, CreatePaymentRequest, StatusUpdateRequest,
};
