pub mod models;
pub mod manager;

pub use models::{NewOrder, Order, OrderItem, OrderStatus};
pub use manager::{OrderError, OrderManager};
