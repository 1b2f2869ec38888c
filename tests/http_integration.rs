//! Integration tests for the cached request executor using wiremock
//!
//! These tests verify caching, status handling and method rules of the
//! executor against a mocked driver endpoint.

use std::time::Duration;

use reqwest::Method;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcplane::driver::cache::{CachedRequestExecutor, ResponseCache};
use mcplane::driver::http::DriverHttpClient;
use mcplane::driver::DriverError;

fn executor() -> CachedRequestExecutor {
    CachedRequestExecutor::new(DriverHttpClient::new(Duration::from_secs(5)).unwrap())
}

/// Test module for executor cache behavior
mod cache_tests {
    use super::*;

    /// Two GETs inside the cache window reach the driver once
    #[tokio::test]
    async fn test_get_within_duration_hits_transport_once() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/spider/vmstatus/vm01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Status": "Running"})))
            .expect(1)
            .mount(&server)
            .await;

        let cache = ResponseCache::<Value>::new();
        let url = format!("{}/spider/vmstatus/vm01", server.uri());
        let exec = executor();

        for _ in 0..2 {
            let reply: Value = exec
                .execute(&cache, Method::GET, &url, &[], None::<&Value>, Duration::from_secs(5))
                .await
                .expect("GET should succeed");
            assert_eq!(reply["Status"], "Running");
        }
        assert_eq!(cache.len(), 1);
    }

    /// After expiry the entry is evicted and the driver is called again
    #[tokio::test]
    async fn test_get_after_expiry_hits_transport_again() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/spider/vmstatus/vm01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Status": "Running"})))
            .expect(2)
            .mount(&server)
            .await;

        let cache = ResponseCache::<Value>::new();
        let url = format!("{}/spider/vmstatus/vm01", server.uri());
        let exec = executor();
        let ttl = Duration::from_millis(100);

        let _: Value = exec
            .execute(&cache, Method::GET, &url, &[], None::<&Value>, ttl)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        let _: Value = exec
            .execute(&cache, Method::GET, &url, &[], None::<&Value>, ttl)
            .await
            .unwrap();
    }

    /// Different bodies are different cache entries
    #[tokio::test]
    async fn test_get_body_is_part_of_cache_key() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/spider/keypair/key01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"IId": {"NameId": "key01"}})))
            .expect(2)
            .mount(&server)
            .await;

        let cache = ResponseCache::<Value>::new();
        let url = format!("{}/spider/keypair/key01", server.uri());
        let exec = executor();

        for conn in ["conn-a", "conn-b", "conn-a"] {
            let body = json!({"ConnectionName": conn});
            let _: Value = exec
                .execute(&cache, Method::GET, &url, &[], Some(&body), Duration::from_secs(5))
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 2);
    }

    /// POST always goes to the driver and never fills the cache
    #[tokio::test]
    async fn test_post_is_never_cached() {
        let server = MockServer::start().await;
        let body = json!({"ConnectionName": "conn", "ReqInfo": {"Name": "ns01-key01"}});

        Mock::given(method("POST"))
            .and(path("/spider/keypair"))
            .and(header("content-type", "application/json"))
            .and(body_json(&body))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"IId": {"SystemId": "k-1"}})))
            .expect(2)
            .mount(&server)
            .await;

        let cache = ResponseCache::<Value>::new();
        let url = format!("{}/spider/keypair", server.uri());
        let exec = executor();

        for _ in 0..2 {
            let _: Value = exec
                .execute(&cache, Method::POST, &url, &[], Some(&body), Duration::from_secs(5))
                .await
                .unwrap();
        }
        assert!(cache.is_empty());
    }
}

/// Test module for driver error responses
mod status_tests {
    use super::*;

    /// Status outside [200, 400) carries URL and status
    #[tokio::test]
    async fn test_500_returns_status_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/spider/securitygroup"))
            .respond_with(ResponseTemplate::new(500).set_body_string("connection refused by csp"))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/spider/securitygroup", server.uri());
        let err = executor()
            .execute::<Value, Value>(
                &ResponseCache::new(),
                Method::POST,
                &url,
                &[],
                Some(&json!({})),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();

        match err {
            DriverError::Status { url: u, status, body } => {
                assert_eq!(u, url);
                assert_eq!(status, 500);
                assert!(body.contains("connection refused"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// Failed GETs are not cached
    #[tokio::test]
    async fn test_404_is_not_cached() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/spider/vpc/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;

        let cache = ResponseCache::<Value>::new();
        let url = format!("{}/spider/vpc/missing", server.uri());
        let exec = executor();

        for _ in 0..2 {
            let result: Result<Value, _> = exec
                .execute(&cache, Method::GET, &url, &[], None::<&Value>, Duration::from_secs(5))
                .await;
            assert!(matches!(result, Err(DriverError::Status { status: 404, .. })));
        }
        assert!(cache.is_empty());
    }

    /// Unreachable driver is a transport error
    #[tokio::test]
    async fn test_unreachable_driver_is_transport_error() {
        let result: Result<Value, _> = executor()
            .execute(
                &ResponseCache::new(),
                Method::GET,
                "http://127.0.0.1:9/spider/vpc",
                &[],
                None::<&Value>,
                Duration::from_secs(5),
            )
            .await;
        assert!(matches!(result, Err(DriverError::Transport { .. })));
    }

    /// Only GET/POST/PUT/DELETE are accepted
    #[tokio::test]
    async fn test_patch_is_rejected_before_network() {
        let result: Result<Value, _> = executor()
            .execute(
                &ResponseCache::new(),
                Method::PATCH,
                "http://127.0.0.1:9/spider/vpc",
                &[],
                None::<&Value>,
                Duration::from_secs(5),
            )
            .await;
        assert!(matches!(result, Err(DriverError::UnsupportedMethod(_))));
    }
}
