//! Integration tests for the retrying fetcher

use shelfwatch::config::UserAgentConfig;
use shelfwatch::crawler::{build_http_client, fetch_page, FetchError, RetryPolicy};
use std::time::{Duration, Instant};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> reqwest::Client {
    build_http_client(&UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0".to_string(),
        contact_url: "https://example.com/about".to_string(),
    })
    .unwrap()
}

fn policy(max_retries: u32, base_delay_ms: u64) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        timeout: Duration::from_secs(5),
        base_delay: Duration::from_millis(base_delay_ms),
    }
}

#[tokio::test]
async fn test_always_failing_url_is_exhausted_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let url = format!("{}/broken", server.uri());
    let started = Instant::now();
    let result = fetch_page(&client(), &url, &policy(3, 20)).await;

    match result {
        Err(FetchError::Exhausted {
            url: failed,
            attempts,
            last_error,
        }) => {
            assert_eq!(failed, url);
            assert_eq!(attempts, 3);
            assert!(last_error.contains("503"), "last error: {}", last_error);
        }
        Ok(_) => panic!("expected the fetch to fail"),
    }

    // Pauses of 20ms and 40ms between the three attempts, none after the last
    assert!(started.elapsed() >= Duration::from_millis(60));
}

#[tokio::test]
async fn test_pauses_grow_between_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;

    let url = format!("{}/broken", server.uri());
    let started = Instant::now();
    let _ = fetch_page(&client(), &url, &policy(4, 40)).await;
    let elapsed = started.elapsed();

    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 4);

    // 40 + 80 + 120 ms of pauses; a constant delay would only add up to 120
    assert!(elapsed >= Duration::from_millis(240), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_recovers_after_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let body = fetch_page(&client(), &format!("{}/flaky", server.uri()), &policy(3, 10))
        .await
        .unwrap();
    assert_eq!(body, "<html>ok</html>");
}

#[tokio::test]
async fn test_not_found_counts_as_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let result = fetch_page(&client(), &format!("{}/missing", server.uri()), &policy(2, 5)).await;
    assert!(matches!(
        result,
        Err(FetchError::Exhausted { attempts: 2, .. })
    ));
}

#[tokio::test]
async fn test_slow_response_times_out_per_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .expect(2)
        .mount(&server)
        .await;

    let policy = RetryPolicy {
        max_retries: 2,
        timeout: Duration::from_millis(100),
        base_delay: Duration::from_millis(5),
    };
    let started = Instant::now();
    let result = fetch_page(&client(), &format!("{}/slow", server.uri()), &policy).await;

    assert!(result.is_err());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_sends_identifying_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header(
            "user-agent",
            "TestBot/1.0 (+https://example.com/about)",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .expect(1)
        .mount(&server)
        .await;

    let body = fetch_page(&client(), &format!("{}/page", server.uri()), &policy(1, 0))
        .await
        .unwrap();
    assert_eq!(body, "hello");
}
