//! The per-endpoint probe loop.
//!
//! ```text
//! Connecting ──ok──▶ Idle ──tick──▶ Probing ──ok──▶ Idle
//!     ▲  │                              │
//!     │  └─fail: backoff─┐              │
//!     └──────────────────┴──fail: close session, backoff
//! ```
//!
//! Every wait (connect, tick, RPC, backoff delay) races the shutdown
//! signal. Transient failures never leave this module.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use dcstat_client::{ClientError, ConnectOptions, Connector, Session, SessionStore};
use dcstat_core::config::BackoffSettings;
use dcstat_core::{EndpointAddress, EndpointId, Identity, RemoteConfig, Settings};

use crate::backoff::{Backoff, shutdown_signalled, with_retry};
use crate::error::{ProbeError, ProbeResult};
use crate::state::ProbeState;

/// Timing and identity shared by every probe.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub identity: Identity,
    /// Time between probe ticks on an open session.
    pub interval: Duration,
    /// Deadline for one connect or one configuration fetch.
    pub timeout: Duration,
    /// Deadline for one bootstrap attempt.
    pub bootstrap_timeout: Duration,
    /// How long a cached session token stays usable.
    pub session_ttl: Duration,
    pub backoff: BackoffSettings,
}

impl ProbeSettings {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            interval: dcstat_core::config::DEFAULT_PROBE_INTERVAL,
            timeout: dcstat_core::config::DEFAULT_PROBE_TIMEOUT,
            bootstrap_timeout: dcstat_core::config::DEFAULT_BOOTSTRAP_TIMEOUT,
            session_ttl: dcstat_core::config::DEFAULT_SESSION_TTL,
            backoff: BackoffSettings::default(),
        }
    }
}

impl From<&Settings> for ProbeSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            identity: settings.identity.clone(),
            interval: settings.probe_interval,
            timeout: settings.probe_timeout,
            bootstrap_timeout: settings.bootstrap_timeout,
            session_ttl: settings.session_ttl,
            backoff: settings.backoff,
        }
    }
}

/// Why an open session was given up.
enum Outcome {
    Cancelled,
    Failed(ClientError),
}

/// Owns one endpoint's connection lifecycle and writes its [`ProbeState`].
pub struct Probe {
    id: EndpointId,
    state: ProbeState,
    connector: Arc<dyn Connector>,
    sessions: Arc<dyn SessionStore>,
    settings: Arc<ProbeSettings>,
}

impl Probe {
    pub fn new(
        state: ProbeState,
        connector: Arc<dyn Connector>,
        sessions: Arc<dyn SessionStore>,
        settings: Arc<ProbeSettings>,
    ) -> Self {
        Self {
            id: state.id(),
            state,
            connector,
            sessions,
            settings,
        }
    }

    /// Probe until shutdown.
    ///
    /// Always ends with [`ProbeError::Cancelled`]; every other failure is
    /// retried internally.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> ProbeResult<()> {
        let endpoint = self.id;
        let mut backoff = Backoff::new(self.settings.backoff);
        debug!(endpoint, "probe starting");

        loop {
            let (mut session, connected) =
                with_retry(&mut backoff, &mut shutdown, "connect", || self.connect()).await?;

            let outcome = self
                .observe(session.as_mut(), &connected, &mut backoff, &mut shutdown)
                .await;
            session.close().await;

            match outcome {
                Outcome::Cancelled => {
                    debug!(endpoint, "probe stopped");
                    return Err(ProbeError::Cancelled);
                }
                Outcome::Failed(e) => {
                    let delay = backoff.next_delay();
                    debug!(
                        endpoint,
                        addr = %connected,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "probe failed, reconnecting"
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown_signalled(&mut shutdown) => {
                            debug!(endpoint, "probe stopped");
                            return Err(ProbeError::Cancelled);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Open a session to the current target, resuming a cached token when
    /// one is available.
    async fn connect(&self) -> Result<(Box<dyn Session>, EndpointAddress), ClientError> {
        let address = self.state.target();
        let token = self.sessions.load(self.id);
        let options = ConnectOptions::endpoint(
            self.settings.identity.clone(),
            self.id,
            address.clone(),
            token,
        );
        debug!(
            endpoint = self.id,
            addr = %address,
            resumed = options.token.is_some(),
            "connecting"
        );

        let timeout = self.settings.timeout;
        let session = tokio::time::timeout(timeout, self.connector.connect(&options))
            .await
            .map_err(|_| ClientError::Timeout(timeout))??;

        if let Some(token) = session.session_token() {
            self.sessions.store(self.id, token, self.settings.session_ttl);
        }
        info!(endpoint = self.id, addr = %address, "connected");
        Ok((session, address))
    }

    /// Tick and probe on an open session until a probe fails or shutdown.
    async fn observe(
        &self,
        session: &mut dyn Session,
        connected: &EndpointAddress,
        backoff: &mut Backoff,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Outcome {
        let interval = self.settings.interval;
        let timeout = self.settings.timeout;
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_signalled(shutdown) => return Outcome::Cancelled,
                _ = ticker.tick() => {}
            }

            let started = Instant::now();
            let result = tokio::select! {
                biased;
                _ = shutdown_signalled(shutdown) => return Outcome::Cancelled,
                result = tokio::time::timeout(timeout, session.fetch_config()) => result,
            };

            match result {
                Ok(Ok(config)) => {
                    self.record_success(connected, started, &config);
                    backoff.reset();
                }
                Ok(Err(e)) => return Outcome::Failed(e),
                Err(_) => return Outcome::Failed(ClientError::Timeout(timeout)),
            }
        }
    }

    /// Record a successful probe. All fields change under one lock.
    fn record_success(&self, connected: &EndpointAddress, started: Instant, config: &RemoteConfig) {
        let now = Instant::now();
        let latency = now.saturating_duration_since(started);
        let advertised = config.address_for(self.id);

        let moved = self.state.update(|status| {
            let moved = match advertised {
                Some(addr) if addr != status.address => {
                    Some((std::mem::replace(&mut status.address, addr), status.address.clone()))
                }
                _ => None,
            };
            status.current_address = Some(connected.clone());
            status.last_success_at = Some(now);
            status.latency = Some(latency);
            moved
        });

        if let Some((old, new)) = moved {
            info!(endpoint = self.id, addr_old = %old, addr_new = %new, "updating addr");
        }
        debug!(
            endpoint = self.id,
            latency_ms = latency.as_millis() as u64,
            "probe succeeded"
        );
    }
}
