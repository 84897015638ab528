//! Server-initiated shutdown, end to end
//!
//! The ingestion server piggybacks `should_shutdown` on a delivery response, the
//! coordinator pauses the orchestrator, asks the operator and either exits or
//! cancels the request on the server.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use metrics_courier::{
    MetricResult,
    orchestrator::{Orchestrator, OrchestratorState},
    queue::Priority,
    shutdown::{ShutdownCoordinator, confirm::Confirmation, control::ControlClient},
};
use reqwest::Url;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

/// Declines, remembering whether monitoring was paused while it was asked
#[derive(Default)]
struct PauseProbe {
    orchestrator: OnceLock<Weak<Orchestrator>>,
    saw_paused: AtomicBool,
    asked: AtomicUsize,
}

impl Confirmation for PauseProbe {
    fn confirm(&self, _message: &str) -> anyhow::Result<bool> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        if let Some(orchestrator) = self.orchestrator.get().and_then(Weak::upgrade) {
            self.saw_paused
                .store(orchestrator.is_paused(), Ordering::SeqCst);
        }
        std::thread::sleep(Duration::from_millis(300));
        Ok(false)
    }
}

async fn negotiating_server(client_id: &str) -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1.0/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "should_shutdown": true
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/cancel-shutdown"))
        .and(query_param("client_id", client_id))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;
    mock_server
}

fn control(server: &MockServer) -> ControlClient {
    ControlClient::new(Url::parse(&server.uri()).unwrap()).unwrap()
}

#[tokio::test]
async fn test_declined_shutdown_pauses_then_resumes() {
    let mock_server = negotiating_server("test-host").await;
    let probe = Arc::new(PauseProbe::default());
    let coordinator = Arc::new(ShutdownCoordinator::new(
        "test-host",
        probe.clone(),
        Some(control(&mock_server)),
    ));

    let queue = spawn_queue(&mock_server, Some(coordinator.clone()), FAST_RETRY);
    let orchestrator = create_orchestrator(queue, Duration::from_secs(60));
    orchestrator.register(StubMonitor::new("cpu_usage", MetricResult::ok(45.5, "percent")));
    coordinator.set_monitor_handler(&orchestrator);
    probe
        .orchestrator
        .set(Arc::downgrade(&orchestrator))
        .unwrap();

    orchestrator.collect_metrics().await.unwrap();
    orchestrator.queue().drain_and_stop().await.unwrap();

    assert_eq!(probe.asked.load(Ordering::SeqCst), 1);
    assert!(probe.saw_paused.load(Ordering::SeqCst));
    assert!(!orchestrator.is_paused());
    assert!(!coordinator.state().in_progress);
    assert_eq!(orchestrator.state(), OrchestratorState::Idle);
}

#[tokio::test]
async fn test_concurrent_directives_handled_once() {
    let mock_server = negotiating_server("test-host").await;
    let probe = Arc::new(PauseProbe::default());
    let coordinator = Arc::new(ShutdownCoordinator::new(
        "test-host",
        probe.clone(),
        Some(control(&mock_server)),
    ));

    // two workers delivering at the same time, sharing one coordinator
    let first = spawn_queue(&mock_server, Some(coordinator.clone()), FAST_RETRY);
    let second = spawn_queue(&mock_server, Some(coordinator.clone()), FAST_RETRY);
    first.enqueue(&create_test_envelope("first"), Priority::Normal);
    second.enqueue(&create_test_envelope("second"), Priority::Normal);

    let (first_drained, second_drained) =
        tokio::join!(first.drain_and_stop(), second.drain_and_stop());
    first_drained.unwrap();
    second_drained.unwrap();

    assert_eq!(first.stats().delivered + second.stats().delivered, 2);
    assert_eq!(probe.asked.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_confirmed_shutdown_runs_exit_hook() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1.0/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"should_shutdown": true})))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/cancel-shutdown"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let exits = Arc::new(AtomicUsize::new(0));
    let coordinator = {
        let exits = exits.clone();
        Arc::new(
            ShutdownCoordinator::new(
                "test-host",
                Arc::new(metrics_courier::shutdown::confirm::FixedAnswer(true)),
                Some(control(&mock_server)),
            )
            .with_exit_hook(move || {
                exits.fetch_add(1, Ordering::SeqCst);
            }),
        )
    };

    let queue = spawn_queue(&mock_server, Some(coordinator.clone()), FAST_RETRY);
    let orchestrator = create_orchestrator(queue, Duration::from_secs(60));
    orchestrator.register(StubMonitor::new("cpu_usage", MetricResult::ok(45.5, "percent")));
    coordinator.set_monitor_handler(&orchestrator);

    orchestrator.collect_metrics().await.unwrap();
    orchestrator.queue().drain_and_stop().await.unwrap();

    assert_eq!(exits.load(Ordering::SeqCst), 1);
    assert!(orchestrator.is_paused());
    assert!(coordinator.state().in_progress);
}
