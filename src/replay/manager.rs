//! Bounded, time-limited nonce store guarding the inbound webhook

use crate::config::ReplaySettings;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::task::JoinHandle;

/// A nonce seen by the receiver
#[derive(Debug, Clone, PartialEq)]
pub struct NonceEntry {
    pub nonce: String,
    pub first_seen: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub signature: Option<String>,
}

impl NonceEntry {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Outcome of a replay check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayCheck {
    /// Nonce unknown or expired; the caller may store it
    Fresh,
    /// Nonce already seen within its lifetime
    Replay,
    /// Request timestamp outside the allowed clock skew
    TimestampOutOfRange,
}

impl ReplayCheck {
    pub fn is_replay(&self) -> bool {
        matches!(self, Self::Replay)
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh)
    }
}

/// Outcome of [`ReplayProtectionManager::record_nonce`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// A live entry for the nonce already exists
    AlreadyRecorded,
    /// The store is at capacity
    StoreFull,
}

/// Nonce store with a hard capacity and a periodic expiry sweep.
///
/// Check and store are separate so a signature can be verified in between.
#[derive(Debug)]
pub struct ReplayProtectionManager {
    settings: ReplaySettings,
    entries: Mutex<HashMap<String, NonceEntry>>,
    cleanup_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReplayProtectionManager {
    pub fn new(settings: ReplaySettings) -> Self {
        Self {
            settings,
            entries: Mutex::new(HashMap::new()),
            cleanup_handle: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &ReplaySettings {
        &self.settings
    }

    /// Start the background sweep. Calling it again restarts the task.
    ///
    /// The task holds a weak reference and ends once the manager is dropped.
    pub fn start(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self
            .settings
            .cleanup_interval()
            .max(std::time::Duration::from_secs(1));

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                let removed = manager.sweep();
                if removed > 0 {
                    tracing::debug!("Nonce sweep removed {} entries", removed);
                }
            }
        });

        if let Some(previous) = lock(&self.cleanup_handle).replace(handle) {
            previous.abort();
        }
        tracing::debug!("Nonce cleanup running every {:?}", period);
    }

    /// Stop the background sweep and drop every stored nonce
    pub fn destroy(&self) {
        if let Some(handle) = lock(&self.cleanup_handle).take() {
            handle.abort();
        }
        lock(&self.entries).clear();
    }

    pub fn is_running(&self) -> bool {
        lock(&self.cleanup_handle)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Whether `nonce` was already seen and has not expired
    pub fn check_nonce(&self, nonce: &str) -> ReplayCheck {
        let entries = lock(&self.entries);
        match entries.get(nonce) {
            Some(entry) if !entry.is_expired() => {
                tracing::warn!("Replayed nonce rejected: {}", nonce);
                ReplayCheck::Replay
            }
            _ => ReplayCheck::Fresh,
        }
    }

    /// Reject timestamps further than `tolerance` from now, then check the nonce
    pub fn check_nonce_with_timestamp(
        &self,
        nonce: &str,
        timestamp: DateTime<Utc>,
        tolerance: std::time::Duration,
    ) -> ReplayCheck {
        let tolerance = Duration::from_std(tolerance).unwrap_or(Duration::MAX);
        let skew = (Utc::now() - timestamp).abs();
        if skew > tolerance {
            tracing::warn!(
                "Request timestamp {} outside tolerance ({}s skew)",
                timestamp,
                skew.num_seconds()
            );
            return ReplayCheck::TimestampOutOfRange;
        }
        self.check_nonce(nonce)
    }

    /// Record a nonce for `ttl` (the configured TTL when `None`).
    ///
    /// A nonce that is already stored is refreshed. Returns false when the
    /// store is full and the nonce is new.
    pub fn store_nonce(
        &self,
        nonce: &str,
        signature: Option<&str>,
        ttl: Option<std::time::Duration>,
    ) -> bool {
        let mut entries = lock(&self.entries);
        self.insert(&mut entries, nonce, signature, ttl)
    }

    /// Insert `nonce` only if no live entry exists, under a single lock.
    ///
    /// Concurrent deliveries of the same nonce get exactly one
    /// [`RecordOutcome::Recorded`].
    pub fn record_nonce(
        &self,
        nonce: &str,
        signature: Option<&str>,
        ttl: Option<std::time::Duration>,
    ) -> RecordOutcome {
        let mut entries = lock(&self.entries);
        if entries.get(nonce).is_some_and(|entry| !entry.is_expired()) {
            tracing::warn!("Replayed nonce rejected: {}", nonce);
            return RecordOutcome::AlreadyRecorded;
        }
        entries.remove(nonce);

        if self.insert(&mut entries, nonce, signature, ttl) {
            RecordOutcome::Recorded
        } else {
            RecordOutcome::StoreFull
        }
    }

    fn insert(
        &self,
        entries: &mut HashMap<String, NonceEntry>,
        nonce: &str,
        signature: Option<&str>,
        ttl: Option<std::time::Duration>,
    ) -> bool {
        let ttl = ttl.unwrap_or_else(|| self.settings.nonce_ttl());
        let now = Utc::now();
        let expires_at = Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        if !entries.contains_key(nonce) && entries.len() >= self.settings.max_entries {
            entries.retain(|_, entry| !entry.is_expired());
            if entries.len() >= self.settings.max_entries {
                tracing::warn!(
                    "Nonce store full ({} entries), rejecting {}",
                    entries.len(),
                    nonce
                );
                return false;
            }
        }

        let first_seen = entries.get(nonce).map_or(now, |e| e.first_seen);
        entries.insert(
            nonce.to_string(),
            NonceEntry {
                nonce: nonce.to_string(),
                first_seen,
                expires_at,
                signature: signature.map(str::to_string),
            },
        );
        true
    }

    /// Remove expired entries, then trim the oldest while over capacity.
    /// Returns how many entries were removed.
    pub fn sweep(&self) -> usize {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());

        let max = self.settings.max_entries;
        if entries.len() > max {
            let mut by_age: Vec<(DateTime<Utc>, String)> = entries
                .values()
                .map(|e| (e.first_seen, e.nonce.clone()))
                .collect();
            by_age.sort();
            let excess = entries.len() - max;
            for (_, nonce) in by_age.into_iter().take(excess) {
                entries.remove(&nonce);
            }
        }

        before - entries.len()
    }

    pub fn get(&self, nonce: &str) -> Option<NonceEntry> {
        lock(&self.entries).get(nonce).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Random alphanumeric nonce of `length` characters
    pub fn generate_nonce(length: usize) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect()
    }
}

impl Default for ReplayProtectionManager {
    fn default() -> Self {
        Self::new(ReplaySettings::default())
    }
}

impl Drop for ReplayProtectionManager {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.cleanup_handle).take() {
            handle.abort();
        }
    }
}

/// Parse a request timestamp given as epoch seconds or milliseconds
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let raw: i64 = value.trim().parse().ok()?;
    if raw.abs() >= 100_000_000_000 {
        DateTime::from_timestamp_millis(raw)
    } else {
        DateTime::from_timestamp(raw, 0)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
