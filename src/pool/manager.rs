//! Connection pool manager
//!
//! Owns the HTTP and HTTPS clients (agents) used toward SAP hosts. Each agent
//! is a `reqwest::Client` with keep-alive pooling plus a semaphore that caps
//! concurrently active connections at `max_sockets`. Callers hold a
//! [`ConnectionLease`] for the duration of a request; leases feed the
//! created/reused counters and the active/free/pending gauges.
//!
//! One manager is constructed by the host application and shared by handle
//! (`Arc<ConnectionPoolManager>`); only one configuration is active at a time.

use crate::{Result, config::PoolSettings};
use reqwest::Client;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::stats::{PoolConfigUpdate, PoolStats};

/// URL scheme of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    /// Scheme of an absolute URL
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = url::Url::parse(url)?;
        match parsed.scheme() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            other => Err(crate::Error::invalid_target(format!(
                "unsupported scheme: {}",
                other
            ))),
        }
    }
}

/// Cumulative counters, kept across rebuilds
#[derive(Debug, Default)]
struct Counters {
    total_requests: AtomicU64,
    connections_created: AtomicU64,
    connections_reused: AtomicU64,
}

/// Per-agent socket bookkeeping. Detached on destroy so leases outliving
/// their agent stop reporting into it.
#[derive(Debug)]
struct PoolHooks {
    attached: AtomicBool,
    free: AtomicUsize,
    pending: AtomicUsize,
    max_free: usize,
    counters: Arc<Counters>,
}

impl PoolHooks {
    fn on_acquired(&self) {
        if !self.attached.load(Ordering::Acquire) {
            return;
        }
        let reused = self
            .free
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |free| free.checked_sub(1))
            .is_ok();
        if reused {
            self.counters
                .connections_reused
                .fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters
                .connections_created
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    fn on_released(&self) {
        if !self.attached.load(Ordering::Acquire) {
            return;
        }
        let max_free = self.max_free;
        let _ = self
            .free
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |free| {
                (free < max_free).then_some(free + 1)
            });
    }

    fn detach(&self) {
        self.attached.store(false, Ordering::Release);
        self.free.store(0, Ordering::Release);
    }
}

/// Counts a caller waiting for a slot; decrements even if the wait is cancelled.
struct PendingGuard<'a>(&'a PoolHooks);

impl<'a> PendingGuard<'a> {
    fn enter(hooks: &'a PoolHooks) -> Self {
        hooks.pending.fetch_add(1, Ordering::AcqRel);
        Self(hooks)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug)]
struct Agent {
    client: Client,
    limiter: Arc<Semaphore>,
    hooks: Arc<PoolHooks>,
}

#[derive(Debug)]
struct Agents {
    http: Agent,
    https: Agent,
}

impl Agents {
    fn get(&self, scheme: Scheme) -> &Agent {
        match scheme {
            Scheme::Http => &self.http,
            Scheme::Https => &self.https,
        }
    }

    fn iter(&self) -> impl Iterator<Item = &Agent> {
        [&self.http, &self.https].into_iter()
    }
}

/// A connection slot held for the duration of one request
#[derive(Debug)]
pub struct ConnectionLease {
    client: Client,
    hooks: Arc<PoolHooks>,
    reusable: bool,
    _permit: OwnedSemaphorePermit,
}

impl ConnectionLease {
    /// Client to issue the request with
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Do not return this connection to the free list (e.g. after a transport error)
    pub fn discard(mut self) {
        self.reusable = false;
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        if self.reusable {
            self.hooks.on_released();
        }
    }
}

/// Shared connection pool for SAP hosts
#[derive(Debug)]
pub struct ConnectionPoolManager {
    config: RwLock<PoolSettings>,
    agents: RwLock<Option<Agents>>,
    counters: Arc<Counters>,
}

impl ConnectionPoolManager {
    /// Create a pool; agents are built lazily on first use.
    pub fn new(config: PoolSettings) -> Self {
        Self {
            config: RwLock::new(config),
            agents: RwLock::new(None),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Current configuration
    pub fn config(&self) -> PoolSettings {
        read(&self.config).clone()
    }

    /// Client for `scheme`. Counts one request.
    pub fn get_agent(&self, scheme: Scheme) -> Result<Client> {
        self.counters.total_requests.fetch_add(1, Ordering::Relaxed);
        self.with_agent(scheme, |agent| agent.client.clone())
    }

    /// Acquire a connection slot for `scheme`, waiting while `max_sockets`
    /// connections are active. Counts one request.
    pub async fn acquire(&self, scheme: Scheme) -> Result<ConnectionLease> {
        self.counters.total_requests.fetch_add(1, Ordering::Relaxed);
        let (client, limiter, hooks) = self.with_agent(scheme, |agent| {
            (
                agent.client.clone(),
                agent.limiter.clone(),
                agent.hooks.clone(),
            )
        })?;

        let permit = {
            let _pending = PendingGuard::enter(&hooks);
            limiter.acquire_owned().await
        }
        .map_err(|_| crate::Error::transport("connection pool was destroyed"))?;

        hooks.on_acquired();

        Ok(ConnectionLease {
            client,
            hooks,
            reusable: true,
            _permit: permit,
        })
    }

    /// Aggregate counters and gauges across both agents
    pub fn get_stats(&self) -> PoolStats {
        let max_sockets = read(&self.config).max_sockets;
        let mut stats = PoolStats {
            total_requests: self.counters.total_requests.load(Ordering::Relaxed),
            total_connections_created: self.counters.connections_created.load(Ordering::Relaxed),
            total_connections_reused: self.counters.connections_reused.load(Ordering::Relaxed),
            active_sockets: 0,
            free_sockets: 0,
            pending_requests: 0,
            max_sockets,
        };

        if let Some(agents) = read(&self.agents).as_ref() {
            for agent in agents.iter() {
                stats.active_sockets += max_sockets.saturating_sub(agent.limiter.available_permits());
                stats.free_sockets += agent.hooks.free.load(Ordering::Acquire);
                stats.pending_requests += agent.hooks.pending.load(Ordering::Acquire);
            }
        }

        stats
    }

    /// Merge `update` into the configuration.
    ///
    /// Returns `Ok(false)` without touching the agents when nothing changes;
    /// otherwise destroys and rebuilds both agents. In-flight leases keep
    /// their old connections.
    pub fn update_config(&self, update: PoolConfigUpdate) -> Result<bool> {
        let current = read(&self.config).clone();
        let merged = update.apply(&current);
        if merged == current {
            tracing::debug!("Pool configuration unchanged, keeping agents");
            return Ok(false);
        }

        let rebuilt = build_agents(&merged, &self.counters)?;
        {
            let mut agents = write(&self.agents);
            if let Some(old) = agents.take() {
                detach(&old);
            }
            *agents = Some(rebuilt);
        }
        *write(&self.config) = merged;

        tracing::info!("Connection pool reconfigured and agents rebuilt");
        Ok(true)
    }

    /// Unhealthy when pending requests exceed twice the socket ceiling, or
    /// active sockets exceed the ceiling.
    pub fn is_healthy(&self) -> bool {
        let stats = self.get_stats();
        stats.pending_requests <= stats.max_sockets * 2
            && stats.active_sockets <= stats.max_sockets
    }

    /// Detach bookkeeping hooks, then drop both agents. The next request
    /// rebuilds them.
    pub fn destroy(&self) {
        let mut agents = write(&self.agents);
        if let Some(old) = agents.take() {
            detach(&old);
            for agent in old.iter() {
                agent.limiter.close();
            }
            tracing::debug!("Connection pool agents destroyed");
        }
    }

    fn with_agent<T>(&self, scheme: Scheme, f: impl FnOnce(&Agent) -> T) -> Result<T> {
        if let Some(agents) = read(&self.agents).as_ref() {
            return Ok(f(agents.get(scheme)));
        }

        let config = read(&self.config).clone();
        let mut agents = write(&self.agents);
        if agents.is_none() {
            *agents = Some(build_agents(&config, &self.counters)?);
            tracing::debug!(
                max_sockets = config.max_sockets,
                max_free_sockets = config.max_free_sockets,
                "Connection pool agents created"
            );
        }
        match agents.as_ref() {
            Some(built) => Ok(f(built.get(scheme))),
            None => Err(crate::Error::internal("connection pool agents missing")),
        }
    }
}

impl Default for ConnectionPoolManager {
    fn default() -> Self {
        Self::new(PoolSettings::default())
    }
}

impl Drop for ConnectionPoolManager {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn detach(agents: &Agents) {
    for agent in agents.iter() {
        agent.hooks.detach();
    }
}

fn build_agents(config: &PoolSettings, counters: &Arc<Counters>) -> Result<Agents> {
    Ok(Agents {
        http: build_agent(config, counters, Scheme::Http)?,
        https: build_agent(config, counters, Scheme::Https)?,
    })
}

fn build_agent(config: &PoolSettings, counters: &Arc<Counters>, scheme: Scheme) -> Result<Agent> {
    let max_idle = if config.keep_alive {
        config.max_free_sockets
    } else {
        0
    };

    let mut builder = Client::builder()
        .timeout(config.timeout())
        .pool_idle_timeout(config.free_socket_timeout())
        .pool_max_idle_per_host(max_idle)
        .tcp_nodelay(true);

    if config.keep_alive {
        builder = builder.tcp_keepalive(config.keep_alive_interval());
    }
    if scheme == Scheme::Https && !config.reject_unauthorized {
        tracing::warn!("TLS certificate verification disabled for SAP connections");
        builder = builder.danger_accept_invalid_certs(true);
    }

    let client = builder
        .build()
        .map_err(|e| crate::Error::config(format!("Failed to build HTTP client: {}", e)))?;

    Ok(Agent {
        client,
        limiter: Arc::new(Semaphore::new(config.max_sockets)),
        hooks: Arc::new(PoolHooks {
            attached: AtomicBool::new(true),
            free: AtomicUsize::new(0),
            pending: AtomicUsize::new(0),
            max_free: max_idle,
            counters: counters.clone(),
        }),
    })
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
