//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

/// Test helper functions
pub mod helpers {
    use sap_odata_gateway::{
        ODataClient, SessionStateManager,
        config::{BatchSettings, Settings},
        pool::ConnectionPoolManager,
        transport::{HttpTransport, ReqwestTransport},
        types::{Credentials, ServiceTarget},
    };
    use std::sync::Arc;
    use wiremock::MockServer;

    pub const SERVICE_PATH: &str = "/sap/opu/odata/sap/ZSALES_SRV";

    /// Create test settings with custom values
    pub fn create_test_settings(port: u16) -> Settings {
        let mut settings = Settings::default();
        settings.server.port = port;
        settings
    }

    /// Transport backed by a fresh pool
    pub fn create_transport() -> Arc<dyn HttpTransport> {
        Arc::new(ReqwestTransport::new(Arc::new(
            ConnectionPoolManager::default(),
        )))
    }

    /// Session manager with the default timeout
    pub fn create_session_manager(transport: Arc<dyn HttpTransport>) -> Arc<SessionStateManager> {
        Arc::new(SessionStateManager::from_settings(
            transport,
            &Settings::default().session,
        ))
    }

    /// Client pointed at the mock server's service
    pub fn create_client(server: &MockServer, batch: BatchSettings) -> ODataClient {
        let transport = create_transport();
        ODataClient::new(
            ServiceTarget::new(&server.uri(), SERVICE_PATH).expect("valid target"),
            Credentials::basic("tester", "secret"),
            create_session_manager(transport.clone()),
            transport,
        )
        .with_batch_settings(batch)
    }

    /// Host key the session manager uses for the mock server
    pub fn host_of(server: &MockServer) -> String {
        ServiceTarget::new(&server.uri(), SERVICE_PATH)
            .expect("valid target")
            .host()
    }
}

/// A mock SAP Gateway `$batch` endpoint
pub mod sap_mock {
    use std::sync::Mutex;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    use super::helpers::SERVICE_PATH;

    pub const CSRF_TOKEN: &str = "mock-csrf-token";
    pub const SESSION_COOKIE: &str = "SAP_SESSIONID_MCK_100";

    /// Answers each inner request of a `$batch` body with the next configured status.
    ///
    /// When `atomic` is set and the request used a changeset, any failing
    /// status fails the whole changeset with a single error response, as SAP does.
    pub struct BatchResponder {
        outcomes: Mutex<std::vec::IntoIter<u16>>,
        atomic: bool,
    }

    impl BatchResponder {
        pub fn new(outcomes: Vec<u16>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into_iter()),
                atomic: false,
            }
        }

        pub fn atomic(mut self) -> Self {
            self.atomic = true;
            self
        }
    }

    impl Respond for BatchResponder {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let body = String::from_utf8_lossy(&request.body);
            let operations = count_operations(&body);
            let uses_changeset = body.contains("boundary=changeset_");

            let statuses: Vec<u16> = {
                let mut outcomes = self.outcomes.lock().unwrap();
                (0..operations)
                    .map(|_| outcomes.next().unwrap_or(204))
                    .collect()
            };

            let boundary = "batchresponse_mock";
            let failing = statuses.iter().find(|s| !(200..300).contains(*s));
            let response_body = match failing {
                Some(status) if self.atomic && uses_changeset => {
                    let mut out = String::new();
                    out.push_str(&format!("--{}\r\n", boundary));
                    out.push_str(&http_part(*status));
                    out.push_str(&format!("--{}--\r\n", boundary));
                    out
                }
                _ if uses_changeset => {
                    let changeset = "changesetresponse_mock";
                    let mut out = String::new();
                    out.push_str(&format!("--{}\r\n", boundary));
                    out.push_str(&format!(
                        "Content-Type: multipart/mixed; boundary={}\r\n\r\n",
                        changeset
                    ));
                    for status in &statuses {
                        out.push_str(&format!("--{}\r\n", changeset));
                        out.push_str(&http_part(*status));
                    }
                    out.push_str(&format!("--{}--\r\n\r\n", changeset));
                    out.push_str(&format!("--{}--\r\n", boundary));
                    out
                }
                _ => {
                    let mut out = String::new();
                    for status in &statuses {
                        out.push_str(&format!("--{}\r\n", boundary));
                        out.push_str(&http_part(*status));
                    }
                    out.push_str(&format!("--{}--\r\n", boundary));
                    out
                }
            };

            ResponseTemplate::new(202)
                .insert_header(
                    "content-type",
                    format!("multipart/mixed; boundary={}", boundary).as_str(),
                )
                .set_body_string(response_body)
        }
    }

    /// Inner requests in a `$batch` body
    pub fn count_operations(body: &str) -> usize {
        body.lines()
            .filter(|line| {
                ["POST ", "PATCH ", "PUT ", "MERGE ", "DELETE ", "GET "]
                    .iter()
                    .any(|m| line.starts_with(m))
                    && line.trim_end().ends_with("HTTP/1.1")
            })
            .count()
    }

    fn http_part(status: u16) -> String {
        let mut part = String::from(
            "Content-Type: application/http\r\nContent-Transfer-Encoding: binary\r\n\r\n",
        );
        match status {
            201 => part.push_str(
                "HTTP/1.1 201 Created\r\nContent-Type: application/json\r\n\r\n{\"d\":{\"OrderId\":\"100\"}}\r\n",
            ),
            200..=299 => part.push_str(&format!("HTTP/1.1 {} OK\r\n\r\n\r\n", status)),
            _ => part.push_str(&format!(
                "HTTP/1.1 {} Bad Request\r\nContent-Type: application/json\r\n\r\n\
{{\"error\":{{\"code\":\"/IWBEP/CM_MGW_RT/020\",\"message\":{{\"lang\":\"en\",\"value\":\"Order rejected\"}}}}}}\r\n",
                status
            )),
        }
        part
    }

    /// Mount the CSRF fetch endpoint (service root, `x-csrf-token: Fetch`)
    pub async fn mount_csrf_fetch(server: &MockServer, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path(format!("{}/", SERVICE_PATH)))
            .and(header("x-csrf-token", "Fetch"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-csrf-token", CSRF_TOKEN)
                    .insert_header(
                        "set-cookie",
                        format!("{}=session-1; path=/; HttpOnly", SESSION_COOKIE).as_str(),
                    )
                    .insert_header("sap-contextid", "SID:ANON:mock:ctx"),
            )
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    /// Mount the `$batch` endpoint, requiring the token and session cookie
    pub async fn mount_batch(server: &MockServer, responder: BatchResponder, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path(format!("{}/$batch", SERVICE_PATH)))
            .and(header("x-csrf-token", CSRF_TOKEN))
            .and(header("sap-contextid", "SID:ANON:mock:ctx"))
            .respond_with(responder)
            .expect(expected_calls)
            .mount(server)
            .await;
    }
}
