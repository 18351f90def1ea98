use axum::{routing::get, Router};
use bite_core::ServiceKind;

/// GET /health
pub fn routes<S>(service: ServiceKind) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let message = format!("{} service is up and running", service.display_name());
    Router::new().route("/health", get(move || async move { message }))
}
