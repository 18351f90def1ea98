//! Process bootstrap shared by the four service binaries.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use bite_core::{Outbox, RandomSource, ServiceKind, ThreadRandom};
use bite_delivery::DeliveryDispatcher;
use bite_notification::NotificationSink;
use bite_order::OrderManager;
use bite_payment::PaymentProcessor;
use bite_store::{Config, FanOutDispatcher, HttpTransport, RetryPolicy};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::state::{DeliveryState, NotificationState, OrderState, PaymentState};

pub async fn run(service: ServiceKind) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "bite_api=debug,bite_store=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    let endpoint = config.services.endpoint(service);
    tracing::info!("Starting {} service on port {}", service.display_name(), endpoint.port);
    tracing::info!("Allowed origins: {}", config.server.allowed_origins);
    for peer in ServiceKind::ALL.into_iter().filter(|peer| *peer != service) {
        tracing::info!("{} service URL: {}", peer.display_name(), config.services.endpoint(peer).url);
    }

    let app = build(service, &config).await?;

    let addr = format!("{}:{}", config.server.host, endpoint.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

/// Wire the repository, its outbox worker and sample data for one service
pub async fn build(service: ServiceKind, config: &Config) -> anyhow::Result<Router> {
    let origins = config.server.allowed_origins.as_str();
    let random: Arc<dyn RandomSource> = Arc::new(ThreadRandom);

    let app = match service {
        ServiceKind::Order => {
            let orders = Arc::new(OrderManager::new(start_outbox(config)?));
            if config.seed.sample_data {
                orders.seed_sample_data().await;
            }
            crate::order_app(OrderState { orders }, origins)
        }
        ServiceKind::Payment => {
            let payments = Arc::new(PaymentProcessor::new(start_outbox(config)?, random));
            crate::payment_app(PaymentState { payments }, origins)
        }
        ServiceKind::Delivery => {
            let deliveries = Arc::new(DeliveryDispatcher::new(start_outbox(config)?, random));
            if config.seed.sample_data {
                deliveries.seed_sample_data().await;
            }
            crate::delivery_app(DeliveryState { deliveries }, origins)
        }
        ServiceKind::Notification => {
            let notifications = Arc::new(NotificationSink::new());
            crate::notification_app(NotificationState { notifications }, origins)
        }
    };

    Ok(app)
}

fn start_outbox(config: &Config) -> anyhow::Result<Outbox> {
    let timeout = Duration::from_secs(config.outbox.request_timeout_secs);
    let transport = HttpTransport::new(&config.services, timeout)
        .context("Failed to build HTTP client")?;

    let (outbox, receiver) = Outbox::channel();
    FanOutDispatcher::new(Arc::new(transport), RetryPolicy::from_config(&config.outbox))
        .spawn(receiver);

    Ok(outbox)
}
