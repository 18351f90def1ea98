pub mod models;
pub mod processor;

pub use models::{Payment, PaymentMethod, PaymentStatus};
pub use processor::{PaymentError, PaymentProcessor};
