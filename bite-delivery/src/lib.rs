pub mod models;
pub mod dispatcher;

pub use models::{Courier, Delivery, DeliveryStatus, NewCourier};
pub use dispatcher::{DeliveryDispatcher, DeliveryError};
