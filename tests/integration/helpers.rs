//! Helper functions for integration tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use metrics_courier::{
    MetricResult,
    actors::delivery::{DeliveryQueue, RetryPolicy},
    envelope::{EnvelopeBuilder, GroupMap, MetricsEnvelope},
    monitors::Monitor,
    orchestrator::Orchestrator,
    shutdown::ShutdownCoordinator,
    transport::HttpTransport,
};
use wiremock::MockServer;

/// Retry delay short enough to keep tests fast
pub const FAST_RETRY: RetryPolicy = RetryPolicy {
    delay: Duration::from_millis(200),
    max_attempts: None,
};

pub fn test_groups() -> GroupMap {
    GroupMap::new()
        .with_group("System", ["cpu_usage", "memory_usage"])
        .with_group("Crypto", ["BTC"])
}

pub fn test_builder() -> EnvelopeBuilder {
    EnvelopeBuilder::new("Metrics Monitor", "test-host", test_groups())
}

/// Envelope whose `metadata.source` identifies it in received requests
pub fn create_test_envelope(source: &str) -> MetricsEnvelope {
    EnvelopeBuilder::new(source, "test-host", test_groups())
        .build(vec![(
            String::from("cpu_usage"),
            MetricResult::ok(45.5, "percent"),
        )])
}

pub fn source_of(body: &[u8]) -> String {
    let envelope: MetricsEnvelope = serde_json::from_slice(body).unwrap();
    envelope.metadata.source
}

/// Delivery queue posting to `{server}/v1.0/metrics`
pub fn spawn_queue(
    server: &MockServer,
    coordinator: Option<Arc<ShutdownCoordinator>>,
    retry: RetryPolicy,
) -> DeliveryQueue {
    let transport = HttpTransport::new(
        format!("{}/v1.0/metrics", server.uri()),
        Duration::from_secs(5),
    )
    .unwrap();

    DeliveryQueue::spawn(Arc::new(transport), coordinator, retry)
}

pub fn create_orchestrator(queue: DeliveryQueue, interval: Duration) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(test_builder(), queue, interval))
}

/// Monitor returning a fixed result
pub struct StubMonitor {
    name: &'static str,
    result: MetricResult,
    calls: AtomicUsize,
}

impl StubMonitor {
    pub fn new(name: &'static str, result: MetricResult) -> Arc<Self> {
        Arc::new(Self {
            name,
            result,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Monitor for StubMonitor {
    fn name(&self) -> &str {
        self.name
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn measure(&self) -> MetricResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }

    fn stop(&self) {}

    fn is_running(&self) -> bool {
        true
    }
}

/// Poll `condition` every few milliseconds for up to five seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
