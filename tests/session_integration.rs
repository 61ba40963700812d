//! CSRF and session handling against a mock SAP Gateway

mod common;

use common::helpers::{SERVICE_PATH, create_client, create_session_manager, create_transport, host_of};
use common::sap_mock::{CSRF_TOKEN, SESSION_COOKIE, mount_csrf_fetch};
use reqwest::Method;
use sap_odata_gateway::{
    Error,
    config::BatchSettings,
    session::{RequestOptions, SessionPhase},
    types::HttpRequest,
};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetch_request(server: &MockServer) -> impl FnOnce() -> HttpRequest {
    let url = format!("{}{}/", server.uri(), SERVICE_PATH);
    move || HttpRequest::get(url)
}

#[tokio::test]
async fn test_csrf_fetch_happens_once() {
    let server = MockServer::start().await;
    mount_csrf_fetch(&server, 1).await;

    let sessions = create_session_manager(create_transport());
    let host = host_of(&server);

    let first = sessions
        .fetch_csrf_token(&host, SERVICE_PATH, fetch_request(&server))
        .await;
    let second = sessions
        .fetch_csrf_token(&host, SERVICE_PATH, fetch_request(&server))
        .await;

    assert_eq!(first, CSRF_TOKEN);
    assert_eq!(second, CSRF_TOKEN);

    let status = sessions.get_session_status(&host, SERVICE_PATH).await;
    assert_eq!(status.phase, SessionPhase::HasCsrfToken);
    assert_eq!(status.cookie_count, 1);
    assert_eq!(
        sessions.get_cookie_header(&host, SERVICE_PATH).await,
        Some(format!("{}=session-1", SESSION_COOKIE))
    );
}

#[tokio::test]
async fn test_required_sentinel_is_never_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("x-csrf-token", "Fetch"))
        .respond_with(ResponseTemplate::new(200).insert_header("x-csrf-token", "Required"))
        .expect(2)
        .mount(&server)
        .await;

    let sessions = create_session_manager(create_transport());
    let host = host_of(&server);

    let token = sessions
        .fetch_csrf_token(&host, SERVICE_PATH, fetch_request(&server))
        .await;
    assert_eq!(token, "");
    assert_eq!(sessions.get_csrf_token(&host, SERVICE_PATH).await, None);

    // Nothing cached, so the next call goes back to the server
    sessions
        .fetch_csrf_token(&host, SERVICE_PATH, fetch_request(&server))
        .await;
}

#[tokio::test]
async fn test_unreachable_server_yields_empty_token() {
    let sessions = create_session_manager(create_transport());
    let token = sessions
        .fetch_csrf_token("127.0.0.1:1", SERVICE_PATH, || {
            HttpRequest::get("http://127.0.0.1:1/sap/opu/odata/sap/ZSALES_SRV/")
        })
        .await;
    assert_eq!(token, "");
}

#[tokio::test]
async fn test_enhanced_request_carries_session() {
    let server = MockServer::start().await;
    mount_csrf_fetch(&server, 1).await;

    let sessions = create_session_manager(create_transport());
    let host = host_of(&server);
    sessions
        .fetch_csrf_token(&host, SERVICE_PATH, fetch_request(&server))
        .await;

    let mut request = HttpRequest::post(format!("{}{}/Orders", server.uri(), SERVICE_PATH));
    sessions
        .enhance_request_options(&host, SERVICE_PATH, &mut request, RequestOptions::default())
        .await;

    assert_eq!(request.header("x-csrf-token"), Some(CSRF_TOKEN));
    assert_eq!(request.header("sap-contextid"), Some("SID:ANON:mock:ctx"));
    assert_eq!(
        request.header("cookie"),
        Some(format!("{}=session-1", SESSION_COOKIE).as_str())
    );
    assert_eq!(request.header("dataserviceversion"), Some("2.0"));
    assert_eq!(request.header("prefer"), Some("return=minimal"));
}

#[tokio::test]
async fn test_stale_token_retry_fetches_fresh_token() {
    let server = MockServer::start().await;
    mount_csrf_fetch(&server, 2).await;

    // First write is rejected, the retry succeeds
    Mock::given(method("POST"))
        .and(path(format!("{}/Orders", SERVICE_PATH)))
        .respond_with(ResponseTemplate::new(403).insert_header("x-csrf-token", "Required"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/Orders", SERVICE_PATH)))
        .respond_with(ResponseTemplate::new(201).set_body_string(r#"{"d":{"OrderId":"7"}}"#))
        .mount(&server)
        .await;

    let client = create_client(&server, BatchSettings::default());
    let payload = json!({"Customer": "C1"});

    let first = client
        .send_write(Method::POST, "Orders", Some(&payload), true)
        .await;
    let err = first.unwrap_err();
    assert!(matches!(err, Error::CsrfRejected { .. }));
    assert!(err.is_session_error());

    let retried = client
        .send_write(Method::POST, "Orders", Some(&payload), true)
        .await
        .unwrap();
    assert_eq!(retried.data(), Some(json!({"OrderId": "7"})));
}
