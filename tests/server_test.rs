//! Integration tests for the tensor smoother HTTP server

#[cfg(feature = "server")]
mod server_tests {
    use std::time::Duration;
    use tensor_smoother::core::TrackerConfig;
    use tensor_smoother::publish::ChannelPublisher;
    use tensor_smoother::server::{run, ObserveResponse, ServerConfig};
    use tensor_smoother::stats::create_shared_stats;

    fn server_config(tracker: TrackerConfig) -> ServerConfig {
        ServerConfig::new(0, tracker, "cam1", "testml/", "test-client")
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (publisher, _receiver) = ChannelPublisher::channel();
        let config = server_config(TrackerConfig::new(["A"], 3));

        let (addr, shutdown_tx) = run(config, Box::new(publisher), None)
            .await
            .expect("Failed to start server");

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_observe_publishes_changes() {
        let (publisher, receiver) = ChannelPublisher::channel();
        let stats = create_shared_stats();
        let config = server_config(TrackerConfig::new(["person", "dog"], 1));

        let (addr, shutdown_tx) = run(config, Box::new(publisher), Some(stats.clone()))
            .await
            .expect("Failed to start server");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{}/observe", addr))
            .json(&serde_json::json!({"person": 2, "cat": 9}))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());

        let body: ObserveResponse = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body.deltas.len(), 1);
        assert_eq!(body.deltas[0].key, "person");
        assert_eq!(body.deltas[0].value, 2);
        assert!(body.snapshot.is_none());
        assert_eq!(body.published, 1);

        let message = receiver.try_recv().expect("message should be published");
        assert_eq!(message.payload, "cam1_person=2");
        assert_eq!(message.topic, "testml/");

        // Same batch again: nothing changes, nothing is published
        let body: ObserveResponse = client
            .post(format!("http://{}/observe", addr))
            .json(&serde_json::json!({"person": 2}))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert!(body.deltas.is_empty());
        assert_eq!(body.published, 0);
        assert!(receiver.try_recv().is_err());

        let snapshot: serde_json::Value = client
            .get(format!("http://{}/snapshot", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(
            snapshot,
            serde_json::json!([
                {"key": "person", "value": 2},
                {"key": "dog", "value": 0}
            ])
        );

        assert_eq!(stats.snapshot().batches_observed, 2);
        assert_eq!(stats.snapshot().messages_published, 1);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_combined_mode_returns_snapshot() {
        let (publisher, receiver) = ChannelPublisher::channel();
        let config = server_config(TrackerConfig::new(["A", "B"], 1).combined(true));

        let (addr, shutdown_tx) = run(config, Box::new(publisher), None)
            .await
            .expect("Failed to start server");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let body: ObserveResponse = reqwest::Client::new()
            .post(format!("http://{}/observe", addr))
            .json(&serde_json::json!({"A": 5}))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");

        let snapshot = body.snapshot.expect("combined mode returns the snapshot");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].key, "B");
        assert_eq!(snapshot[1].value, 0);

        let message = receiver.try_recv().expect("message should be published");
        assert_eq!(message.payload, r#"{"A":5,"B":0}"#);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_invalid_observation_rejected() {
        let (publisher, _receiver) = ChannelPublisher::channel();
        let config = server_config(TrackerConfig::new(["A"], 1));

        let (addr, shutdown_tx) = run(config, Box::new(publisher), None)
            .await
            .expect("Failed to start server");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let response = reqwest::Client::new()
            .post(format!("http://{}/observe", addr))
            .json(&serde_json::json!({"A": "lots"}))
            .send()
            .await
            .expect("Failed to send request");

        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["code"], "INVALID_OBSERVATION");

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_invalid_tracker_config_fails_startup() {
        let (publisher, _receiver) = ChannelPublisher::channel();
        let config = server_config(TrackerConfig::new(["A"], 0));

        assert!(run(config, Box::new(publisher), None).await.is_err());
    }
}
