//! Per-target session state
//!
//! A session accumulates cookies, the SAP context id and the CSRF token
//! monotonically; the only way to shed information is a full clear or expiry.

use super::cookies::{Cookie, CookieJar};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// `x-csrf-token` value asking the server to issue a token
pub const CSRF_TOKEN_FETCH: &str = "Fetch";

/// `x-csrf-token` value the server sends when a token is required but none was supplied
pub const CSRF_TOKEN_REQUIRED: &str = "Required";

/// Whether a `x-csrf-token` value is a real token rather than a protocol sentinel
pub fn is_real_csrf_token(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty()
        && !value.eq_ignore_ascii_case(CSRF_TOKEN_FETCH)
        && !value.eq_ignore_ascii_case(CSRF_TOKEN_REQUIRED)
}

/// Session key: host authority plus OData service path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub host: String,
    pub service_path: String,
}

impl SessionKey {
    pub fn new(host: impl Into<String>, service_path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            service_path: service_path.into(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.host, self.service_path)
    }
}

/// Cached session data for one key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub cookies: CookieJar,
    pub csrf_token: Option<String>,
    pub context_id: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Empty session expiring after `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            cookies: CookieJar::new(),
            csrf_token: None,
            context_id: None,
            expires_at: Utc::now() + ttl,
        }
    }

    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Get time remaining until expiration
    pub fn time_until_expiry(&self) -> Duration {
        self.expires_at - Utc::now()
    }

    pub fn touch(&mut self, ttl: Duration) {
        self.expires_at = Utc::now() + ttl;
    }

    pub fn merge_cookie(&mut self, cookie: Cookie) {
        self.cookies.merge(cookie);
    }

    /// Furthest lifecycle stage reached. Use [`SessionStatus`] flags for
    /// what is actually stored.
    pub fn phase(&self) -> SessionPhase {
        if self.csrf_token.is_some() {
            SessionPhase::HasCsrfToken
        } else if self.context_id.is_some() {
            SessionPhase::CookiesAndContext
        } else {
            SessionPhase::CookiesOnly
        }
    }
}

/// Where a session is in its lifecycle.
///
/// Phases are ordered stages, not an inventory: a session that received a
/// context id before any cookie still reports `CookiesAndContext`, with
/// `cookie_count == 0` in its [`SessionStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SessionPhase {
    NoSession,
    CookiesOnly,
    CookiesAndContext,
    HasCsrfToken,
}

/// Introspection snapshot of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub cookie_count: usize,
    pub has_context_id: bool,
    pub has_csrf_token: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionStatus {
    pub fn absent() -> Self {
        Self {
            phase: SessionPhase::NoSession,
            cookie_count: 0,
            has_context_id: false,
            has_csrf_token: false,
            expires_at: None,
        }
    }

    pub fn has_session(&self) -> bool {
        self.phase != SessionPhase::NoSession
    }
}

impl From<&Session> for SessionStatus {
    fn from(session: &Session) -> Self {
        Self {
            phase: session.phase(),
            cookie_count: session.cookies.len(),
            has_context_id: session.context_id.is_some(),
            has_csrf_token: session.csrf_token.is_some(),
            expires_at: Some(session.expires_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_are_not_tokens() {
        assert!(!is_real_csrf_token("Required"));
        assert!(!is_real_csrf_token("fetch"));
        assert!(!is_real_csrf_token("  "));
        assert!(is_real_csrf_token("Xy8a-9QwE=="));
    }

    #[test]
    fn test_phase_progression() {
        let mut session = Session::new(Duration::minutes(30));
        session.merge_cookie(Cookie::parse("a=1").unwrap());
        assert_eq!(session.phase(), SessionPhase::CookiesOnly);

        session.context_id = Some("ctx".to_string());
        assert_eq!(session.phase(), SessionPhase::CookiesAndContext);

        session.csrf_token = Some("tok".to_string());
        assert_eq!(session.phase(), SessionPhase::HasCsrfToken);
    }

    #[test]
    fn test_context_only_session_reports_stage_and_inventory() {
        let mut session = Session::new(Duration::minutes(30));
        session.context_id = Some("SID:ANON:ctx".to_string());

        let status = SessionStatus::from(&session);
        assert_eq!(status.phase, SessionPhase::CookiesAndContext);
        assert!(status.has_context_id);
        assert_eq!(status.cookie_count, 0);
        assert!(SessionPhase::CookiesAndContext > SessionPhase::CookiesOnly);
        assert!(SessionPhase::HasCsrfToken > SessionPhase::CookiesAndContext);
    }

    #[test]
    fn test_expiry() {
        let session = Session::new(Duration::seconds(-1));
        assert!(session.is_expired());

        let mut session = Session::new(Duration::minutes(5));
        assert!(!session.is_expired());
        session.touch(Duration::minutes(10));
        assert!(session.time_until_expiry() > Duration::minutes(9));
    }

    #[test]
    fn test_status_from_session() {
        let mut session = Session::new(Duration::minutes(5));
        session.csrf_token = Some("tok".to_string());
        let status = SessionStatus::from(&session);
        assert!(status.has_session());
        assert!(status.has_csrf_token);
        assert_eq!(status.cookie_count, 0);
        assert!(!SessionStatus::absent().has_session());
    }
}
