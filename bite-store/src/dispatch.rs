//! Outbox delivery: turns enqueued fan-out events into HTTP calls on peer
//! services.
//!
//! Envelopes are grouped into lanes by target service and order. A lane
//! delivers one envelope at a time, so an order's status callbacks arrive in
//! the order they were decided even when an earlier one needs retries.
//! Different orders never wait on each other. Transient failures are retried
//! with exponential backoff; anything else is logged and dropped. The
//! originating request never sees the outcome.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use bite_core::{Envelope, FanOut, FanOutMethod, OutboxReceiver, ServiceKind, IDEMPOTENCY_KEY_HEADER};
use reqwest::{Client, StatusCode};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app_config::{OutboxConfig, ServicesConfig};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("{service} service unavailable: HTTP {status} - {body}")]
    Unavailable {
        service: ServiceKind,
        status: u16,
        body: String,
    },

    #[error("{service} service rejected the call: HTTP {status} - {body}")]
    Rejected {
        service: ServiceKind,
        status: u16,
        body: String,
    },

    #[error("No endpoint configured for the {0} service")]
    NoEndpoint(ServiceKind),
}

impl DispatchError {
    /// Connection problems, timeouts, 429 and 5xx are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Http(err) => !err.is_builder() && !err.is_decode(),
            DispatchError::Unavailable { .. } => true,
            DispatchError::Encode(_) | DispatchError::Rejected { .. } | DispatchError::NoEndpoint(_) => false,
        }
    }

    /// Classify a non-success response from `service`
    pub fn from_status(service: ServiceKind, status: u16, body: String) -> Self {
        let body: String = body.chars().take(200).collect();
        let retryable = StatusCode::from_u16(status)
            .map(|code| code == StatusCode::TOO_MANY_REQUESTS || code.is_server_error())
            .unwrap_or(false);

        if retryable {
            DispatchError::Unavailable { service, status, body }
        } else {
            DispatchError::Rejected { service, status, body }
        }
    }
}

/// Carries one fan-out envelope to its target service.
///
/// Implementations must pass [`Envelope::idempotency_key`] along so a retry
/// after a lost reply does not create a second record.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, envelope: &Envelope) -> Result<(), DispatchError>;
}

/// Calls peers over their public JSON API
pub struct HttpTransport {
    client: Client,
    base_urls: HashMap<ServiceKind, String>,
}

impl HttpTransport {
    pub fn new(services: &ServicesConfig, timeout: Duration) -> Result<Self, DispatchError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_urls = ServiceKind::ALL
            .into_iter()
            .map(|kind| {
                let url = services.endpoint(kind).url.trim_end_matches('/').to_string();
                (kind, url)
            })
            .collect();

        Ok(Self { client, base_urls })
    }

    fn url_for(&self, event: &FanOut) -> Result<String, DispatchError> {
        let service = event.target();
        let base = self
            .base_urls
            .get(&service)
            .ok_or(DispatchError::NoEndpoint(service))?;
        Ok(format!("{}{}", base, event.path()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, envelope: &Envelope) -> Result<(), DispatchError> {
        let event = &envelope.event;
        let url = self.url_for(event)?;
        let body = event.body()?;

        let request = match event.method() {
            FanOutMethod::Post => self.client.post(&url),
            FanOutMethod::Put => self.client.put(&url),
        };
        let response = request
            .header(IDEMPOTENCY_KEY_HEADER, envelope.idempotency_key())
            .json(&body)
            .send()
            .await?;
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DispatchError::from_status(event.target(), status.as_u16(), body))
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &OutboxConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            min_delay: Duration::from_millis(config.min_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// One attempt, no retry
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1))
            .with_jitter()
    }
}

/// A lane with nothing to do for this long shuts down
const LANE_IDLE: Duration = Duration::from_secs(30);

type LaneKey = (ServiceKind, Option<u64>);

struct Lane {
    tx: mpsc::UnboundedSender<Envelope>,
    handle: JoinHandle<()>,
}

/// Drains the outbox and delivers every envelope through a [`Transport`]
pub struct FanOutDispatcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    lane_idle: Duration,
}

impl FanOutDispatcher {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            lane_idle: LANE_IDLE,
        }
    }

    pub fn with_lane_idle(mut self, lane_idle: Duration) -> Self {
        self.lane_idle = lane_idle;
        self
    }

    pub fn spawn(self, receiver: OutboxReceiver) -> JoinHandle<()> {
        tokio::spawn(self.run(receiver))
    }

    /// Runs until every `Outbox` handle has been dropped, then waits for the
    /// lanes to finish what they hold
    pub async fn run(self, mut receiver: OutboxReceiver) {
        info!(max_attempts = self.policy.max_attempts, "Fan-out dispatcher started");
        let mut lanes: HashMap<LaneKey, Lane> = HashMap::new();

        while let Some(envelope) = receiver.recv().await {
            lanes.retain(|_, lane| !lane.handle.is_finished());
            let key = envelope.event.ordering_key();

            // A lane that went idle refuses new work; hand the envelope to
            // a successor that starts once the old lane has fully drained.
            let envelope = match lanes.get(&key) {
                Some(lane) => match lane.tx.send(envelope) {
                    Ok(()) => continue,
                    Err(mpsc::error::SendError(envelope)) => envelope,
                },
                None => envelope,
            };
            let previous = lanes.remove(&key).map(|lane| lane.handle);
            lanes.insert(key, self.open_lane(previous, envelope));
        }

        info!(lanes = lanes.len(), "Outbox closed, fan-out dispatcher stopping");
        for (_, lane) in lanes {
            drop(lane.tx);
            let _ = lane.handle.await;
        }
    }

    fn open_lane(&self, previous: Option<JoinHandle<()>>, first: Envelope) -> Lane {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = self.transport.clone();
        let policy = self.policy.clone();
        let lane_idle = self.lane_idle;

        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            let _ = deliver(transport.clone(), policy.clone(), first).await;

            loop {
                match tokio::time::timeout(lane_idle, rx.recv()).await {
                    Ok(Some(envelope)) => {
                        let _ = deliver(transport.clone(), policy.clone(), envelope).await;
                    }
                    Ok(None) => return,
                    Err(_) => {
                        rx.close();
                        while let Ok(envelope) = rx.try_recv() {
                            let _ = deliver(transport.clone(), policy.clone(), envelope).await;
                        }
                        return;
                    }
                }
            }
        });

        Lane { tx, handle }
    }
}

async fn deliver(
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    envelope: Envelope,
) -> Result<(), DispatchError> {
    let transport = transport.as_ref();
    let event = &envelope.event;
    let target = event.target();
    let path = event.path();
    let sent = &envelope;

    let result = (|| async move { transport.send(sent).await })
        .retry(policy.backoff())
        .when(DispatchError::is_retryable)
        .notify(|err: &DispatchError, delay: Duration| {
            warn!(
                envelope_id = %envelope.id,
                service = %target,
                path = %path,
                "Fan-out attempt failed, retrying in {:?}: {}",
                delay,
                err
            );
        })
        .await;

    match &result {
        Ok(()) => info!(
            envelope_id = %envelope.id,
            service = %target,
            path = %path,
            event = event.name(),
            "Fan-out delivered"
        ),
        Err(err) => error!(
            envelope_id = %envelope.id,
            service = %target,
            path = %path,
            event = event.name(),
            "Fan-out dropped: {}",
            err
        ),
    }
    result
}
