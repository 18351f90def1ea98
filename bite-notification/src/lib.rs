pub mod models;
pub mod sink;

pub use models::Notification;
pub use sink::{NotificationError, NotificationSink};
