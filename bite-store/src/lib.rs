pub mod app_config;
pub mod dispatch;

pub use app_config::Config;
pub use dispatch::{DispatchError, FanOutDispatcher, HttpTransport, RetryPolicy, Transport};
