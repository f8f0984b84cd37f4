//! End-to-end tests of the HTTP transport against a mock streaming server.

use std::time::Duration;

use fcp_testkit::{MockStreamServer, fixtures};
use fcp_twitter::{
    AccessToken, CloseReason, ConnectionState, EventReceiver, HttpTransport, SignedRequest,
    SignedTransport, StreamEvent, StreamFailure, TransportSignal, TwitterConfig, TwitterStream,
};
use reqwest::Method;
use serde_json::json;
use tokio::time::timeout;

const FILTER_PATH: &str = "/1.1/statuses/filter.json";

fn config(stream_url: String) -> TwitterConfig {
    TwitterConfig {
        consumer_key: "test_consumer_key".into(),
        consumer_secret: "test_consumer_secret".into(),
        access_token: "test_access_token".into(),
        access_token_secret: "test_access_token_secret".into(),
        track: "rust,tokio".into(),
        stream_url,
        connect_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

async fn next_event(events: &mut EventReceiver) -> StreamEvent {
    timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[tokio::test]
async fn streams_payloads_until_server_ends_body() {
    fcp_testkit::init_test_tracing();
    let mock = MockStreamServer::start().await;
    let tweet = fixtures::tweet("1", "hello from the stream");
    let limit = fixtures::limit_notice(42);
    let warning = fixtures::stall_warning(95);
    mock.expect_stream(
        FILTER_PATH,
        fixtures::delimited_json_body(&[tweet.clone(), limit.clone(), warning.clone()]),
    )
    .await;

    let (stream, mut events) = TwitterStream::new(config(mock.base_url())).unwrap();
    stream.stream();

    assert_eq!(next_event(&mut events).await, StreamEvent::Connected);
    assert_eq!(next_event(&mut events).await, StreamEvent::Data(tweet));
    assert_eq!(next_event(&mut events).await, StreamEvent::Data(limit));
    assert_eq!(next_event(&mut events).await, StreamEvent::Data(warning));
    assert_eq!(
        next_event(&mut events).await,
        StreamEvent::Close(CloseReason::SocketEnd)
    );
    assert_eq!(stream.state(), ConnectionState::Idle);

    let forms = mock.received_forms(FILTER_PATH).await;
    assert_eq!(forms.len(), 1);
    assert!(forms[0].contains(&("delimited".to_string(), "length".to_string())));
    assert!(forms[0].contains(&("stall_warnings".to_string(), "true".to_string())));
    assert!(forms[0].contains(&("track".to_string(), "rust,tokio".to_string())));

    let headers = mock.authorization_headers().await;
    assert_eq!(headers.len(), 1);
    assert!(headers[0].starts_with("OAuth "));
    assert!(headers[0].contains("oauth_consumer_key=\"test_consumer_key\""));
    assert!(headers[0].contains("oauth_token=\"test_access_token\""));
}

#[tokio::test]
async fn garbage_payload_does_not_end_stream() {
    fcp_testkit::init_test_tracing();
    let mock = MockStreamServer::start().await;
    mock.expect_stream(
        FILTER_PATH,
        fixtures::delimited_body(&["{\"truncated\":", "{\"delete\":{}}"]),
    )
    .await;

    let (stream, mut events) = TwitterStream::new(config(mock.base_url())).unwrap();
    stream.stream();

    assert_eq!(next_event(&mut events).await, StreamEvent::Connected);
    assert_eq!(
        next_event(&mut events).await,
        StreamEvent::Garbage("{\"truncated\":".into())
    );
    assert_eq!(
        next_event(&mut events).await,
        StreamEvent::Data(json!({"delete": {}}))
    );
    assert_eq!(
        next_event(&mut events).await,
        StreamEvent::Close(CloseReason::SocketEnd)
    );
}

#[tokio::test]
async fn rejected_status_is_response_error() {
    fcp_testkit::init_test_tracing();
    let mock = MockStreamServer::start().await;
    mock.expect_status(FILTER_PATH, 420, "Enhance Your Calm").await;

    let (stream, mut events) = TwitterStream::new(config(mock.base_url())).unwrap();
    stream.stream();

    assert_eq!(
        next_event(&mut events).await,
        StreamEvent::Error(StreamFailure::Response { code: 420 })
    );
    assert_eq!(stream.state(), ConnectionState::Idle);
    mock.assert_request_count(1).await;
}

#[tokio::test]
async fn rejected_status_ends_transport_signals() {
    fcp_testkit::init_test_tracing();
    let mock = MockStreamServer::start().await;
    mock.expect_status(FILTER_PATH, 420, "Enhance Your Calm").await;

    let config = config(mock.base_url());
    let transport = HttpTransport::new(&config).unwrap();
    let mut handle = transport.open(SignedRequest {
        method: Method::POST,
        url: config.filter_url(),
        token: AccessToken::new(&config.access_token, &config.access_token_secret),
        params: vec![("track".to_string(), config.track.clone())],
    });

    let mut signals = Vec::new();
    while let Some(signal) = timeout(Duration::from_secs(10), handle.next_signal())
        .await
        .expect("timed out waiting for signal")
    {
        signals.push(signal);
    }
    assert_eq!(signals, vec![TransportSignal::Response { status: 420 }]);
}

#[tokio::test]
async fn unreachable_server_is_request_error() {
    fcp_testkit::init_test_tracing();
    let (stream, mut events) = TwitterStream::new(config("http://127.0.0.1:1".into())).unwrap();
    stream.stream();

    match next_event(&mut events).await {
        StreamEvent::Error(failure @ StreamFailure::Request { .. }) => {
            assert_eq!(failure.kind(), "request");
        }
        other => panic!("expected request error, got {other:?}"),
    }
    assert!(!stream.is_active());
}

#[tokio::test]
async fn destroy_stops_delivery() {
    fcp_testkit::init_test_tracing();
    let mock = MockStreamServer::start().await;
    mock.expect_stream(FILTER_PATH, fixtures::delimited_body(&["{}"]))
        .await;

    let (stream, mut events) = TwitterStream::new(config(mock.base_url())).unwrap();
    stream.stream();
    stream.destroy();
    stream.destroy();

    assert!(
        timeout(Duration::from_millis(200), events.recv())
            .await
            .is_err()
    );
    assert_eq!(stream.state(), ConnectionState::Idle);
}
