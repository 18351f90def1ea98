use bite_core::ServiceKind;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub services: ServicesConfig,
    pub outbox: OutboxConfig,
    pub seed: SeedConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub allowed_origins: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServicesConfig {
    pub order: ServiceEndpoint,
    pub payment: ServiceEndpoint,
    pub delivery: ServiceEndpoint,
    pub notification: ServiceEndpoint,
}

impl ServicesConfig {
    pub fn endpoint(&self, kind: ServiceKind) -> &ServiceEndpoint {
        match kind {
            ServiceKind::Order => &self.order,
            ServiceKind::Payment => &self.payment,
            ServiceKind::Delivery => &self.delivery,
            ServiceKind::Notification => &self.notification,
        }
    }
}

/// Where a service listens, and how its peers reach it
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceEndpoint {
    pub port: u16,
    /// Base URL without the `/api/...` path
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutboxConfig {
    /// 1 disables retries
    pub max_attempts: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeedConfig {
    pub sample_data: bool,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Built-in defaults match the docker-compose deployment
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.allowed_origins", "http://localhost:3205")?
            .set_default("services.order.port", 8082)?
            .set_default("services.order.url", "http://order-service:8082")?
            .set_default("services.payment.port", 8083)?
            .set_default("services.payment.url", "http://payment-service:8083")?
            .set_default("services.delivery.port", 8084)?
            .set_default("services.delivery.url", "http://delivery-service:8084")?
            .set_default("services.notification.port", 8085)?
            .set_default("services.notification.url", "http://notification-service:8085")?
            .set_default("outbox.max_attempts", 5)?
            .set_default("outbox.min_delay_ms", 100)?
            .set_default("outbox.max_delay_ms", 5000)?
            .set_default("outbox.request_timeout_secs", 10)?
            .set_default("seed.sample_data", true)?
            .add_source(config::File::with_name("config/default").required(false))
            // Note that this file is _optional_
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // This file shouldn't be checked in to git
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `BITE__SERVICES__PAYMENT__URL=http://localhost:8083`
            .add_source(config::Environment::with_prefix("BITE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
