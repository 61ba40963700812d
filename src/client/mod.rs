//! OData client orchestration
//!
//! Wires the session manager, transport and batch codec together for one
//! service target. Retry policy stays with the caller: a 403 clears the
//! session and surfaces as [`Error::CsrfRejected`](crate::Error::CsrfRejected)
//! so the caller can retry once with a fresh token.

use crate::{
    Result,
    batch::{self, BatchRequest},
    config::BatchSettings,
    message,
    session::{RequestOptions, SessionStateManager},
    transport::HttpTransport,
    types::{
        BatchOperation, BatchOperationResult, BatchResult, Credentials, HttpRequest, HttpResponse,
        SapMessage, ServiceTarget,
    },
};
use reqwest::Method;
use std::sync::Arc;

/// Response to a write together with the SAP messages it carried
#[derive(Debug, Clone)]
pub struct WriteResponse {
    pub response: HttpResponse,
    pub messages: Vec<SapMessage>,
}

impl WriteResponse {
    /// Response body as JSON with the OData v2 `d` envelope removed
    pub fn data(&self) -> Option<serde_json::Value> {
        let mut value = self.response.json()?;
        match value.get_mut("d") {
            Some(inner) => Some(inner.take()),
            None => Some(value),
        }
    }
}

/// Client for one SAP Gateway OData service
#[derive(Debug, Clone)]
pub struct ODataClient {
    target: ServiceTarget,
    credentials: Credentials,
    session: Arc<SessionStateManager>,
    transport: Arc<dyn HttpTransport>,
    batch: BatchSettings,
}

impl ODataClient {
    pub fn new(
        target: ServiceTarget,
        credentials: Credentials,
        session: Arc<SessionStateManager>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            target,
            credentials,
            session,
            transport,
            batch: BatchSettings::default(),
        }
    }

    pub fn with_batch_settings(mut self, batch: BatchSettings) -> Self {
        self.batch = batch;
        self
    }

    pub fn target(&self) -> &ServiceTarget {
        &self.target
    }

    pub fn session(&self) -> &Arc<SessionStateManager> {
        &self.session
    }

    /// CSRF token for the target, fetched against the service root when not cached
    pub async fn fetch_csrf_token(&self) -> String {
        let url = self.target.service_root();
        let credentials = &self.credentials;
        self.session
            .fetch_csrf_token(&self.target.host(), self.target.service_path(), || {
                HttpRequest::get(url).with_credentials(credentials)
            })
            .await
    }

    /// Send one write request (`POST`, `PUT`, `PATCH`, `MERGE` or `DELETE`) to `resource`.
    pub async fn send_write(
        &self,
        method: Method,
        resource: &str,
        body: Option<&serde_json::Value>,
        return_representation: bool,
    ) -> Result<WriteResponse> {
        let host = self.target.host();
        let service_path = self.target.service_path();

        let token = self.fetch_csrf_token().await;

        let mut request = HttpRequest::new(method, self.target.resource_url(resource))
            .with_credentials(&self.credentials);
        if let Some(body) = body {
            request = request
                .with_header("Content-Type", "application/json")
                .with_body(serde_json::to_string(body)?);
        }
        if !token.is_empty() {
            request.set_header("x-csrf-token", &token);
        }

        self.session
            .enhance_request_options(
                &host,
                service_path,
                &mut request,
                RequestOptions {
                    batch: false,
                    return_representation,
                },
            )
            .await;

        let response = self.transport.send(request).await?;
        let messages = self
            .session
            .process_response(&host, service_path, &response)
            .await;

        self.check_status(&response, &messages).await?;
        Ok(WriteResponse { response, messages })
    }

    /// Validate, chunk and submit `operations`; results are positionally aligned.
    ///
    /// A chunk whose response could not be fully decoded contributes fewer
    /// results; later chunks are still submitted. When a chunk fails outright
    /// (transport error, 403, non-2xx envelope) submission stops: results of
    /// the chunks already committed are kept, and every operation of the
    /// failed and the unsubmitted chunks is reported as a failure.
    pub async fn execute_batch(&self, operations: Vec<BatchOperation>) -> Result<BatchResult> {
        let errors = batch::validate_operations(&operations);
        if !errors.is_empty() {
            return Err(crate::Error::validation(errors));
        }

        let chunks = batch::split_into_batches(&operations, self.batch.batch_size);
        tracing::info!(
            "Submitting {} operations in {} batch(es) to {}",
            operations.len(),
            chunks.len(),
            self.target
        );

        let mut results = BatchResult::with_capacity(operations.len());
        let mut chunks = chunks.into_iter();
        while let Some(chunk) = chunks.next() {
            let expected = chunk.len();
            match self.submit_batch(chunk).await {
                Ok(chunk_results) => {
                    if chunk_results.len() < expected {
                        tracing::warn!(
                            "Batch decoded {} of {} results",
                            chunk_results.len(),
                            expected
                        );
                    }
                    results.extend(chunk_results);
                }
                Err(err) => {
                    let skipped: usize = chunks.by_ref().map(|c| c.len()).sum();
                    tracing::warn!(
                        "Batch of {} operations failed ({}), skipping {} remaining",
                        expected,
                        err,
                        skipped
                    );
                    let status = err.status_code().unwrap_or(0);
                    let reason = err.to_string();
                    results.extend(
                        std::iter::repeat_with(|| {
                            BatchOperationResult::failure(status, reason.clone())
                        })
                        .take(expected),
                    );
                    results.extend(
                        std::iter::repeat_with(|| {
                            BatchOperationResult::failure(
                                0,
                                format!("Not submitted: an earlier batch failed: {}", reason),
                            )
                        })
                        .take(skipped),
                    );
                    break;
                }
            }
        }
        Ok(results)
    }

    async fn submit_batch(&self, operations: Vec<BatchOperation>) -> Result<BatchResult> {
        let host = self.target.host();
        let service_path = self.target.service_path();

        let built = batch::build_batch_request(
            &BatchRequest::new(operations, service_path).with_change_set(self.batch.use_change_set),
        )?;

        let token = self.fetch_csrf_token().await;

        let mut request = HttpRequest::post(self.target.batch_url())
            .with_credentials(&self.credentials)
            .with_header("Content-Type", &built.content_type)
            .with_body(built.body.clone());
        if !token.is_empty() {
            request.set_header("x-csrf-token", &token);
        }

        self.session
            .enhance_request_options(
                &host,
                service_path,
                &mut request,
                RequestOptions {
                    batch: true,
                    return_representation: false,
                },
            )
            .await;

        let response = self.transport.send(request).await?;
        let messages = self
            .session
            .process_response(&host, service_path, &response)
            .await;
        self.check_status(&response, &messages).await?;

        Ok(batch::parse_for_request(&built, &response.body))
    }

    async fn check_status(&self, response: &HttpResponse, messages: &[SapMessage]) -> Result<()> {
        if response.is_success() {
            return Ok(());
        }

        if response.status == 403 {
            tracing::warn!("Write to {} rejected with 403, clearing session", self.target);
            self.session
                .clear_session(&self.target.host(), self.target.service_path())
                .await;
            return Err(crate::Error::csrf_rejected(self.target.to_string()));
        }

        let detail = if messages.is_empty() {
            response.body.trim().to_string()
        } else {
            message::format_messages(messages)
        };
        Err(crate::Error::odata_request(response.status, detail))
    }
}
