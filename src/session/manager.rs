//! # Session State Manager
//!
//! Guarantees that every write request toward a SAP Gateway service carries a
//! valid CSRF token and the session affinity cookies, fetching and caching
//! them lazily and dropping them when the server signals they are stale.
//!
//! ## Architecture
//!
//! State is kept per `(host, service path)` key. Each key owns a slot with:
//! - a `RwLock` over the cached [`Session`], read on the hot path
//! - a `Mutex` that serializes CSRF fetches for that key only
//!
//! Two concurrent fetches for the same key therefore perform one network
//! call; fetches for different keys never wait on each other.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sap_odata_gateway::{
//!     pool::ConnectionPoolManager,
//!     session::SessionStateManager,
//!     transport::ReqwestTransport,
//!     types::HttpRequest,
//! };
//!
//! # tokio_test::block_on(async {
//! let pool = Arc::new(ConnectionPoolManager::default());
//! let manager = SessionStateManager::new(
//!     Arc::new(ReqwestTransport::new(pool)),
//!     std::time::Duration::from_secs(1800),
//! );
//!
//! let token = manager
//!     .fetch_csrf_token("sap.example.com", "/sap/opu/odata/sap/ZSRV", || {
//!         HttpRequest::get("https://sap.example.com/sap/opu/odata/sap/ZSRV/")
//!     })
//!     .await;
//! println!("CSRF token: {}", token);
//! # });
//! ```

use crate::{
    config::SessionSettings,
    message,
    transport::HttpTransport,
    types::{HttpRequest, HttpResponse, SapMessage},
};
use chrono::Duration;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, Weak};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use super::cookies::{Cookie, cookie_names};
use super::state::{
    CSRF_TOKEN_FETCH, Session, SessionKey, SessionStatus, is_real_csrf_token,
};

pub const HEADER_CSRF_TOKEN: &str = "x-csrf-token";
pub const HEADER_SET_COOKIE: &str = "set-cookie";
pub const HEADER_CONTEXT_ID_IN: &str = "sap-contextid";
pub const HEADER_CONTEXT_ID_OUT: &str = "SAP-ContextId";
pub const HEADER_DATA_SERVICE_VERSION: &str = "DataServiceVersion";
pub const HEADER_MAX_DATA_SERVICE_VERSION: &str = "MaxDataServiceVersion";
pub const HEADER_MESSAGE_SCOPE: &str = "sap-message-scope";
pub const HEADER_PREFER: &str = "Prefer";

const ODATA_VERSION: &str = "2.0";
const MESSAGE_SCOPE_BUSINESS_OBJECT: &str = "BusinessObject";

/// Per-call decoration options for [`SessionStateManager::enhance_request_options`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// The request is a `$batch` submission; its `Prefer` header is left to the caller
    pub batch: bool,
    /// Ask for the entity in the response (`return=representation`) instead of `return=minimal`
    pub return_representation: bool,
}

#[derive(Debug, Default)]
struct SessionSlot {
    state: RwLock<Option<Session>>,
    fetch_lock: Mutex<()>,
}

impl SessionSlot {
    /// Live session, or `None` when absent or expired
    async fn live(&self) -> Option<Session> {
        self.state
            .read()
            .await
            .as_ref()
            .filter(|s| !s.is_expired())
            .cloned()
    }

    /// Apply `f` to the session, creating it if absent or expired, then reset expiry
    async fn update(&self, ttl: Duration, f: impl FnOnce(&mut Session)) {
        let mut state = self.state.write().await;
        if state.as_ref().is_none_or(Session::is_expired) {
            *state = Some(Session::new(ttl));
        }
        if let Some(session) = state.as_mut() {
            f(session);
            session.touch(ttl);
        }
    }
}

/// Session and CSRF state manager for SAP Gateway services.
///
/// Constructed once by the host application and shared by handle.
#[derive(Debug)]
pub struct SessionStateManager {
    transport: Arc<dyn HttpTransport>,
    session_ttl: Duration,
    slots: RwLock<HashMap<SessionKey, Arc<SessionSlot>>>,
    cleanup_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SessionStateManager {
    /// Creates a session manager sending CSRF fetches through `transport`.
    ///
    /// Sessions expire `session_timeout` after their last update.
    pub fn new(transport: Arc<dyn HttpTransport>, session_timeout: std::time::Duration) -> Self {
        let session_ttl = Duration::from_std(session_timeout).unwrap_or(Duration::minutes(30));
        Self {
            transport,
            session_ttl,
            slots: RwLock::new(HashMap::new()),
            cleanup_handle: std::sync::Mutex::new(None),
        }
    }

    /// Creates a session manager from configuration
    pub fn from_settings(transport: Arc<dyn HttpTransport>, settings: &SessionSettings) -> Self {
        Self::new(transport, settings.timeout())
    }

    /// Run [`cleanup_expired`](Self::cleanup_expired) every `period` in the
    /// background. Calling it again restarts the task.
    ///
    /// The task holds a weak reference and ends once the manager is dropped.
    pub fn start_cleanup(self: &Arc<Self>, period: std::time::Duration) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = period.max(std::time::Duration::from_secs(1));

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                manager.cleanup_expired().await;
            }
        });

        let previous = self
            .cleanup_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        tracing::debug!("Session cleanup running every {:?}", period);
    }

    /// Stop the background cleanup task
    pub fn stop_cleanup(&self) {
        let handle = self
            .cleanup_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    /// Number of keys currently tracked, live or not
    pub async fn tracked_sessions(&self) -> usize {
        self.slots.read().await.len()
    }

    /// `Cookie` header built from the cached session
    pub async fn get_cookie_header(&self, host: &str, service_path: &str) -> Option<String> {
        self.live_session(host, service_path)
            .await
            .and_then(|s| s.cookies.header_value())
    }

    /// Cached SAP context id
    pub async fn get_context_id(&self, host: &str, service_path: &str) -> Option<String> {
        self.live_session(host, service_path)
            .await
            .and_then(|s| s.context_id)
    }

    /// Cached CSRF token
    pub async fn get_csrf_token(&self, host: &str, service_path: &str) -> Option<String> {
        self.live_session(host, service_path)
            .await
            .and_then(|s| s.csrf_token)
    }

    /// Merge `set-cookie` values into the session
    pub async fn update_cookies<S: AsRef<str>>(
        &self,
        host: &str,
        service_path: &str,
        set_cookie_values: &[S],
    ) {
        let cookies: Vec<Cookie> = set_cookie_values
            .iter()
            .filter_map(|v| Cookie::parse(v.as_ref()))
            .collect();
        if cookies.is_empty() {
            return;
        }

        let slot = self.slot(host, service_path).await;
        slot.update(self.session_ttl, |session| {
            for cookie in cookies {
                session.merge_cookie(cookie);
            }
        })
        .await;
    }

    /// Store the SAP context id
    pub async fn update_context_id(&self, host: &str, service_path: &str, context_id: &str) {
        let context_id = context_id.trim();
        if context_id.is_empty() {
            return;
        }

        let slot = self.slot(host, service_path).await;
        slot.update(self.session_ttl, |session| {
            session.context_id = Some(context_id.to_string());
        })
        .await;
    }

    /// Store a CSRF token. The `Required`/`Fetch` sentinels are ignored.
    pub async fn update_csrf_token(&self, host: &str, service_path: &str, token: &str) {
        if !is_real_csrf_token(token) {
            tracing::debug!(
                "Ignoring CSRF sentinel {:?} for {}{}",
                token,
                host,
                service_path
            );
            return;
        }

        let slot = self.slot(host, service_path).await;
        slot.update(self.session_ttl, |session| {
            session.csrf_token = Some(token.trim().to_string());
        })
        .await;
    }

    /// Return a CSRF token for the target, fetching one if none is cached.
    ///
    /// The cached path performs no network call. Otherwise the request from
    /// `build_request` is decorated with the session cookies and context id,
    /// sent with `x-csrf-token: Fetch`, and the token is read from the
    /// response. Failures yield an empty string; whether a tokenless write is
    /// acceptable is the caller's decision.
    pub async fn fetch_csrf_token<F>(&self, host: &str, service_path: &str, build_request: F) -> String
    where
        F: FnOnce() -> HttpRequest,
    {
        let slot = self.slot(host, service_path).await;
        if let Some(token) = slot.live().await.and_then(|s| s.csrf_token) {
            return token;
        }

        let _fetching = slot.fetch_lock.lock().await;

        // Another caller may have fetched while we waited
        if let Some(token) = slot.live().await.and_then(|s| s.csrf_token) {
            return token;
        }

        let mut request = build_request();
        self.apply_session_headers(&slot, &mut request).await;
        request.set_header(HEADER_CSRF_TOKEN, CSRF_TOKEN_FETCH);

        tracing::debug!("Fetching CSRF token for {}{}", host, service_path);

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    "CSRF token fetch for {}{} failed: {}",
                    host,
                    service_path,
                    e
                );
                return String::new();
            }
        };

        self.store_response_state(&slot, ResponseState::from_response(&response))
            .await;

        match response
            .header(HEADER_CSRF_TOKEN)
            .filter(|t| is_real_csrf_token(t))
        {
            Some(token) => {
                tracing::debug!("CSRF token fetched for {}{}", host, service_path);
                token.trim().to_string()
            }
            None => {
                tracing::warn!(
                    "No CSRF token in response for {}{} (status {})",
                    host,
                    service_path,
                    response.status
                );
                String::new()
            }
        }
    }

    /// Decorate an outgoing request with session and protocol headers.
    ///
    /// Headers the caller already set are left alone; cached cookies are
    /// appended to a caller `Cookie` header only when their names differ.
    /// Outside batch mode `Prefer` is set from `options`.
    pub async fn enhance_request_options(
        &self,
        host: &str,
        service_path: &str,
        request: &mut HttpRequest,
        options: RequestOptions,
    ) {
        if let Some(slot) = self.existing_slot(host, service_path).await {
            self.apply_session_headers(&slot, request).await;

            if request.is_write()
                && !request.has_header(HEADER_CSRF_TOKEN)
                && let Some(token) = slot.live().await.and_then(|s| s.csrf_token)
            {
                request.set_header(HEADER_CSRF_TOKEN, &token);
            }
        }

        set_if_absent(request, HEADER_DATA_SERVICE_VERSION, ODATA_VERSION);
        set_if_absent(request, HEADER_MAX_DATA_SERVICE_VERSION, ODATA_VERSION);
        set_if_absent(request, HEADER_MESSAGE_SCOPE, MESSAGE_SCOPE_BUSINESS_OBJECT);
        set_if_absent(request, "Accept", "application/json");

        if !options.batch {
            let prefer = if options.return_representation {
                "return=representation"
            } else {
                "return=minimal"
            };
            set_if_absent(request, HEADER_PREFER, prefer);
        }
    }

    /// Store session state carried by a response and extract its SAP messages
    pub async fn process_response(
        &self,
        host: &str,
        service_path: &str,
        response: &HttpResponse,
    ) -> Vec<SapMessage> {
        let state = ResponseState::from_response(response);
        if !state.is_empty() {
            let slot = self.slot(host, service_path).await;
            self.store_response_state(&slot, state).await;
        }
        message::extract_all(response)
    }

    /// Drop the whole session for the key
    pub async fn clear_session(&self, host: &str, service_path: &str) {
        let key = SessionKey::new(host, service_path);
        let slot = self.slots.read().await.get(&key).cloned();
        if let Some(slot) = slot {
            *slot.state.write().await = None;
            tracing::info!("Session cleared for {}", key);
        }
    }

    /// Drop every session
    pub async fn clear_all_sessions(&self) {
        let mut slots = self.slots.write().await;
        slots.clear();
        tracing::info!("All sessions cleared");
    }

    /// Introspection for one key
    pub async fn get_session_status(&self, host: &str, service_path: &str) -> SessionStatus {
        self.live_session(host, service_path)
            .await
            .map(|s| SessionStatus::from(&s))
            .unwrap_or_else(SessionStatus::absent)
    }

    /// Remove expired or empty sessions that nobody is fetching for.
    /// Returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut slots = self.slots.write().await;
        let before = slots.len();

        let mut stale = Vec::new();
        for (key, slot) in slots.iter() {
            let expired = match slot.state.try_read() {
                Ok(state) => state.as_ref().is_none_or(|s| s.is_expired()),
                Err(_) => false,
            };
            if expired && slot.fetch_lock.try_lock().is_ok() {
                stale.push(key.clone());
            }
        }
        for key in stale {
            slots.remove(&key);
        }

        let removed = before - slots.len();
        if removed > 0 {
            tracing::debug!("Removed {} expired sessions", removed);
        }
        removed
    }

    async fn live_session(&self, host: &str, service_path: &str) -> Option<Session> {
        self.existing_slot(host, service_path).await?.live().await
    }

    async fn existing_slot(&self, host: &str, service_path: &str) -> Option<Arc<SessionSlot>> {
        let key = SessionKey::new(host, service_path);
        self.slots.read().await.get(&key).cloned()
    }

    async fn slot(&self, host: &str, service_path: &str) -> Arc<SessionSlot> {
        let key = SessionKey::new(host, service_path);
        if let Some(slot) = self.slots.read().await.get(&key) {
            return slot.clone();
        }

        let mut slots = self.slots.write().await;
        slots.entry(key).or_default().clone()
    }

    async fn apply_session_headers(&self, slot: &SessionSlot, request: &mut HttpRequest) {
        let Some(session) = slot.live().await else {
            return;
        };

        match request.header("cookie").map(str::to_string) {
            Some(existing) => {
                let present = cookie_names(&existing);
                let extra: Vec<String> = session
                    .cookies
                    .iter()
                    .filter(|c| !present.contains(&c.name))
                    .map(|c| format!("{}={}", c.name, c.value))
                    .collect();
                if !extra.is_empty() {
                    request.set_header("cookie", &format!("{}; {}", existing, extra.join("; ")));
                }
            }
            None => {
                if let Some(cookie_header) = session.cookies.header_value() {
                    request.set_header("cookie", &cookie_header);
                }
            }
        }

        if let Some(context_id) = session.context_id.as_deref() {
            set_if_absent(request, HEADER_CONTEXT_ID_OUT, context_id);
        }
    }

    async fn store_response_state(&self, slot: &SessionSlot, state: ResponseState) {
        if state.is_empty() {
            return;
        }

        slot.update(self.session_ttl, |session| {
            for cookie in state.cookies {
                session.merge_cookie(cookie);
            }
            if let Some(context_id) = state.context_id {
                session.context_id = Some(context_id);
            }
            if let Some(token) = state.token {
                session.csrf_token = Some(token);
            }
        })
        .await;
    }
}

impl Drop for SessionStateManager {
    fn drop(&mut self) {
        self.stop_cleanup();
    }
}

/// Session state a response carries
struct ResponseState {
    cookies: Vec<Cookie>,
    context_id: Option<String>,
    token: Option<String>,
}

impl ResponseState {
    fn from_response(response: &HttpResponse) -> Self {
        Self {
            cookies: response
                .header_all(HEADER_SET_COOKIE)
                .into_iter()
                .filter_map(Cookie::parse)
                .collect(),
            context_id: response
                .header(HEADER_CONTEXT_ID_IN)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            token: response
                .header(HEADER_CSRF_TOKEN)
                .filter(|t| is_real_csrf_token(t))
                .map(|t| t.trim().to_string()),
        }
    }

    fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.context_id.is_none() && self.token.is_none()
    }
}

fn set_if_absent(request: &mut HttpRequest, name: &str, value: &str) {
    if !request.has_header(name) {
        request.set_header(name, value);
    }
}
