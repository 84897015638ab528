//! End-to-end tests: monitors → orchestrator → delivery queue → HTTP

use std::sync::Arc;
use std::time::Duration;

use metrics_courier::{
    MetricResult,
    actors::delivery::RetryPolicy,
    config::{CryptoConfig, MonitoringConfig},
    envelope::EnvelopeBuilder,
    monitors::{self, crypto::CryptoPriceMonitor},
    orchestrator::{Orchestrator, OrchestratorState},
    shutdown::PauseControl,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

async fn ingestion_server() -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1.0/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
        .mount(&mock_server)
        .await;
    mock_server
}

async fn received_bodies(server: &MockServer) -> Vec<serde_json::Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == "/v1.0/metrics")
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_stubbed_cpu_reaches_server() {
    let mock_server = ingestion_server().await;
    let queue = spawn_queue(&mock_server, None, FAST_RETRY);
    let orchestrator = create_orchestrator(queue, Duration::from_secs(5));
    orchestrator.register(StubMonitor::new("cpu_usage", MetricResult::ok(45.5, "percent")));

    orchestrator.collect_metrics().await.unwrap();
    orchestrator.queue().drain_and_stop().await.unwrap();

    let bodies = received_bodies(&mock_server).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(
        bodies[0]["data"]["System"]["cpu_usage"],
        json!({"value": 45.5, "unit": "percent"})
    );
    assert_eq!(bodies[0]["metadata"]["version"], "1.0");
}

#[tokio::test]
async fn test_configured_remote_monitors() {
    let mock_server = ingestion_server().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/ticker/price"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "symbol": "BTCEUR",
            "price": "61234.50000000"
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/astros.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "people": [{"name": "a"}, {"name": "b"}, {"name": "c"}]
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/current.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "current": {"humidity": 40}
        })))
        .mount(&mock_server)
        .await;

    let config: MonitoringConfig = serde_json::from_value(json!({
        "update_interval": 5,
        "request_timeout": 2,
        "Crypto": {
            "BTC": {
                "enabled": true,
                "api_url": format!("{}/api/v3/ticker/price?symbol=BTCEUR", mock_server.uri())
            }
        },
        "Weather": {
            "temperature": {
                "enabled": true,
                "api_url": format!("{}/v1/current.json", mock_server.uri())
            },
            "humidity": { "enabled": false }
        },
        "Space": {
            "people_in_space": {
                "enabled": true,
                "api_url": format!("{}/astros.json", mock_server.uri())
            }
        }
    }))
    .unwrap();

    let builder = EnvelopeBuilder::new("Metrics Monitor", "test-host", config.group_map());
    let queue = spawn_queue(&mock_server, None, FAST_RETRY);
    let orchestrator = Orchestrator::new(builder, queue, config.update_interval());
    for monitor in monitors::from_config(&config).unwrap() {
        orchestrator.register(monitor);
    }
    assert_eq!(orchestrator.monitor_count(), 3);

    orchestrator.collect_metrics().await.unwrap();
    orchestrator.queue().drain_and_stop().await.unwrap();

    let bodies = received_bodies(&mock_server).await;
    assert_eq!(
        bodies[0]["data"],
        json!({
            "System": {},
            "Crypto": { "BTC": { "value": 61234.5, "unit": "EUR" } },
            "Weather": {
                "temperature": {
                    "value": null,
                    "unit": "Celsius",
                    "error": "Temperature data not found"
                }
            },
            "Space": { "people_in_space": { "value": 3, "unit": "people" } }
        })
    );
}

#[tokio::test]
async fn test_nan_price_does_not_drop_other_metrics() {
    let mock_server = ingestion_server().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/ticker/price"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"price": "NaN"})))
        .mount(&mock_server)
        .await;

    let crypto = CryptoConfig {
        enabled: true,
        api_url: Some(format!("{}/api/v3/ticker/price", mock_server.uri())),
        currency: String::from("EUR"),
    };
    let queue = spawn_queue(&mock_server, None, FAST_RETRY);
    let orchestrator = create_orchestrator(queue, Duration::from_secs(5));
    orchestrator.register(StubMonitor::new("cpu_usage", MetricResult::ok(45.5, "percent")));
    orchestrator.register(Arc::new(
        CryptoPriceMonitor::new("BTC", &crypto, Duration::from_secs(2)).unwrap(),
    ));

    let envelope = orchestrator.collect_metrics().await.unwrap();
    orchestrator.queue().drain_and_stop().await.unwrap();

    let btc = envelope.metric("Crypto", "BTC").unwrap();
    assert!(btc.value().is_none());
    assert!(btc.error().unwrap().contains("price is not a number"));

    let bodies = received_bodies(&mock_server).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(
        bodies[0]["data"]["System"]["cpu_usage"],
        json!({"value": 45.5, "unit": "percent"})
    );
    assert!(bodies[0]["data"]["Crypto"]["BTC"]["value"].is_null());
}

#[tokio::test]
async fn test_run_until_stopped() {
    let mock_server = ingestion_server().await;
    let queue = spawn_queue(&mock_server, None, RetryPolicy::default());
    let orchestrator = create_orchestrator(queue, Duration::from_millis(100));
    let cpu = StubMonitor::new("cpu_usage", MetricResult::ok(12.0, "percent"));
    orchestrator.register(cpu.clone());

    let runner = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run().await })
    };

    wait_until(|| orchestrator.queue().stats().delivered >= 3).await;
    assert_eq!(orchestrator.state(), OrchestratorState::Running);

    orchestrator.stop().await;
    tokio::time::timeout(Duration::from_secs(1), runner)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let calls = cpu.calls();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(cpu.calls(), calls);
    assert_eq!(orchestrator.state(), OrchestratorState::Stopped);
}

#[tokio::test]
async fn test_paused_loop_sends_nothing() {
    let mock_server = ingestion_server().await;
    let queue = spawn_queue(&mock_server, None, FAST_RETRY);
    let orchestrator: Arc<Orchestrator> = create_orchestrator(queue, Duration::from_millis(50));
    let cpu = StubMonitor::new("cpu_usage", MetricResult::ok(12.0, "percent"));
    orchestrator.register(cpu.clone());
    orchestrator.pause_monitoring();

    let runner = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run().await })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(cpu.calls(), 0);
    assert_eq!(orchestrator.queue().stats().delivered, 0);

    orchestrator.resume_monitoring();
    wait_until(|| orchestrator.queue().stats().delivered >= 1).await;

    orchestrator.stop().await;
    runner.await.unwrap().unwrap();
}
