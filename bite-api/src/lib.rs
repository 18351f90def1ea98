use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    Router,
};
use bite_core::ServiceKind;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod deliveries;
pub mod error;
pub mod health;
pub mod idempotency;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod server;
pub mod state;

pub use error::AppError;
pub use state::{DeliveryState, NotificationState, OrderState, PaymentState};

pub fn order_app(state: OrderState, allowed_origins: &str) -> Router {
    finish(
        orders::routes().merge(health::routes(ServiceKind::Order)),
        allowed_origins,
    )
    .with_state(state)
}

pub fn payment_app(state: PaymentState, allowed_origins: &str) -> Router {
    finish(
        payments::routes().merge(health::routes(ServiceKind::Payment)),
        allowed_origins,
    )
    .with_state(state)
}

pub fn delivery_app(state: DeliveryState, allowed_origins: &str) -> Router {
    finish(
        deliveries::routes().merge(health::routes(ServiceKind::Delivery)),
        allowed_origins,
    )
    .with_state(state)
}

pub fn notification_app(state: NotificationState, allowed_origins: &str) -> Router {
    finish(
        notifications::routes().merge(health::routes(ServiceKind::Notification)),
        allowed_origins,
    )
    .with_state(state)
}

fn finish<S>(router: Router<S>, allowed_origins: &str) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(cors(allowed_origins))
        .layer(TraceLayer::new_for_http())
}

/// Comma separated origins; unparseable entries are skipped
fn cors(allowed_origins: &str) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("idempotency-key"),
        ])
}
