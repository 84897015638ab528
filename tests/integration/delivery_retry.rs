//! Delivery queue against a real HTTP endpoint
//!
//! - Transient failures are retried with the byte-identical body
//! - Retried items keep their queue position
//! - Priorities are honoured

use std::time::{Duration, Instant};

use metrics_courier::{actors::delivery::RetryPolicy, queue::Priority};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_fails_twice_then_succeeds() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1.0/metrics"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1.0/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "success"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let queue = spawn_queue(&mock_server, None, FAST_RETRY);
    let started = Instant::now();

    assert!(queue.enqueue(&create_test_envelope("a"), Priority::Normal));
    queue.drain_and_stop().await.unwrap();

    // two back-off pauses
    assert!(started.elapsed() >= 2 * FAST_RETRY.delay);

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|request| request.body == requests[0].body));
    assert_eq!(
        requests[0].headers.get("content-type").unwrap(),
        "application/json"
    );

    let stats = queue.stats();
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.failed_attempts, 2);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn test_retried_item_not_overtaken() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let queue = spawn_queue(&mock_server, None, FAST_RETRY);

    queue.enqueue(&create_test_envelope("first"), Priority::Normal);
    wait_until(|| queue.stats().failed_attempts == 1).await;
    queue.enqueue(&create_test_envelope("second"), Priority::Normal);

    queue.drain_and_stop().await.unwrap();

    let order: Vec<_> = mock_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|request| source_of(&request.body))
        .collect();
    assert_eq!(order, vec!["first", "first", "second"]);
}

#[tokio::test]
async fn test_high_priority_sent_first() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&mock_server)
        .await;

    let queue = spawn_queue(&mock_server, None, FAST_RETRY);

    // nothing is sent before the first await
    queue.enqueue(&create_test_envelope("normal"), Priority::Normal);
    queue.enqueue(&create_test_envelope("low"), Priority::Low);
    queue.enqueue(&create_test_envelope("high"), Priority::High);
    queue.drain_and_stop().await.unwrap();

    let order: Vec<_> = mock_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|request| source_of(&request.body))
        .collect();
    assert_eq!(order, vec!["high", "normal", "low"]);
}

#[tokio::test]
async fn test_enqueue_does_not_wait_for_network() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&mock_server)
        .await;

    let queue = spawn_queue(&mock_server, None, FAST_RETRY);
    queue.enqueue(&create_test_envelope("slow"), Priority::Normal);
    wait_until(|| queue.is_empty()).await;

    // the worker is now blocked on the slow POST
    let started = Instant::now();
    for i in 0..10 {
        assert!(queue.enqueue(&create_test_envelope(&format!("{i}")), Priority::Normal));
    }
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(queue.len(), 10);

    queue.stop().await;
}

#[tokio::test]
async fn test_unreachable_endpoint_gives_up_after_limit() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&mock_server)
        .await;

    let retry = RetryPolicy {
        delay: Duration::from_millis(20),
        max_attempts: Some(3),
    };
    let queue = spawn_queue(&mock_server, None, retry);

    queue.enqueue(&create_test_envelope("a"), Priority::Normal);
    queue.enqueue(&create_test_envelope("b"), Priority::Normal);
    queue.drain_and_stop().await.unwrap();

    let stats = queue.stats();
    assert_eq!(stats.dropped, 2);
    assert_eq!(stats.failed_attempts, 6);
    assert_eq!(stats.delivered, 0);
}
