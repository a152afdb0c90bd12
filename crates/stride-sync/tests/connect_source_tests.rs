//! Integration tests for the device-sync adapter
//!
//! These tests use wiremock to mock API responses with recorded fixtures.

use std::time::Duration;

use chrono::NaiveDate;
use stride_sync::client::ApiClient;
use stride_sync::models::Source;
use stride_sync::sources::{ActivitySource, ConnectSource, FetchWindow, StreamSource};
use stride_sync::StrideError;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LIST_PATH: &str = "/activitylist-service/activities/search/activities";

/// Create an adapter that points to the mock server, without request pacing
fn test_source(mock_server: &MockServer) -> ConnectSource {
    let client = ApiClient::new(&mock_server.uri(), Some("test-access-token".to_string())).unwrap();
    ConnectSource::new(client, vec!["running".to_string()]).with_min_delay(Duration::ZERO)
}

fn window() -> FetchWindow {
    let day = |d| NaiveDate::from_ymd_opt(2026, 1, d).unwrap();
    FetchWindow::new(
        day(1).and_hms_opt(0, 0, 0).unwrap(),
        day(8).and_hms_opt(0, 0, 0).unwrap(),
    )
}

mod fetch_tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_filters_types_and_attaches_splits() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(LIST_PATH))
            .and(query_param("startDate", "2026-01-01"))
            .and(query_param("endDate", "2026-01-08"))
            .and(query_param("start", "0"))
            .and(header("Authorization", "Bearer test-access-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(include_str!("fixtures/activities_page.json")),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/activity-service/activity/101/splits"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(include_str!("fixtures/activity_splits.json")),
            )
            .mount(&mock_server)
            .await;

        let fetched = test_source(&mock_server)
            .fetch(&window())
            .await
            .expect("Failed to fetch activities");

        let ids: Vec<&str> = fetched.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["101", "103"]);

        let long_run = &fetched[0];
        assert_eq!(long_run.source, Source::Primary);
        assert_eq!(long_run.distance_km, Some(21.1));
        assert_eq!(long_run.detail.avg_heart_rate, Some(151));
        assert_eq!(long_run.detail.splits.len(), 1);
        assert_eq!(long_run.detail.splits[0].avg_heart_rate, Some(151));

        // splits endpoint not mocked for 103: summary is kept without splits
        assert!(fetched[1].detail.splits.is_empty());
        assert_eq!(fetched[1].detail.avg_heart_rate, Some(139));
    }

    #[tokio::test]
    async fn test_fetch_paginates() {
        let mock_server = MockServer::start().await;
        let page: serde_json::Value =
            serde_json::from_str(include_str!("fixtures/activities_page.json")).unwrap();
        let first = serde_json::Value::Array(page.as_array().unwrap()[..2].to_vec());
        let second = serde_json::Value::Array(page.as_array().unwrap()[2..].to_vec());

        Mock::given(method("GET"))
            .and(path(LIST_PATH))
            .and(query_param("start", "0"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(first))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path(LIST_PATH))
            .and(query_param("start", "2"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(second))
            .mount(&mock_server)
            .await;

        let fetched = test_source(&mock_server)
            .with_page_size(2)
            .fetch(&window())
            .await
            .unwrap();
        assert_eq!(fetched.len(), 2);
    }

    #[tokio::test]
    async fn test_server_error_is_source_unavailable() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(LIST_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&mock_server)
            .await;

        let err = test_source(&mock_server).fetch(&window()).await.unwrap_err();
        match err {
            StrideError::SourceUnavailable { source_name, reason } => {
                assert_eq!(source_name, "connect");
                assert!(reason.contains("500"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_is_source_unavailable() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(LIST_PATH))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let err = test_source(&mock_server).fetch(&window()).await.unwrap_err();
        assert!(matches!(err, StrideError::SourceUnavailable { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_retries_after_rate_limit() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(LIST_PATH))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path(LIST_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .with_priority(2)
            .mount(&mock_server)
            .await;

        let fetched = test_source(&mock_server).fetch(&window()).await.unwrap();
        assert!(fetched.is_empty());
    }
}

mod stream_tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_streams() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/activity-service/activity/101/details"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(include_str!("fixtures/activity_details.json")),
            )
            .mount(&mock_server)
            .await;

        let streams = test_source(&mock_server)
            .fetch_streams("101")
            .await
            .unwrap()
            .expect("streams present");

        assert_eq!(streams.heart_rate, vec![120, 130, 0, 140, 150, 160]);
        assert_eq!(streams.distance_m.last(), Some(&2000.0));

        let splits = stride_sync::enrich::per_km_splits(&streams);
        assert_eq!(splits.len(), 2);
        assert_eq!(splits[0].avg_heart_rate, Some(130));
    }

    #[tokio::test]
    async fn test_missing_descriptors_yield_none() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/activity-service/activity/5/details"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"metricDescriptors": [], "activityDetailMetrics": []}"#,
            ))
            .mount(&mock_server)
            .await;

        let streams = test_source(&mock_server).fetch_streams("5").await.unwrap();
        assert!(streams.is_none());
    }
}
