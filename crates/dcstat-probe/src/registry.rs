//! Registry: bootstraps the endpoint list once, runs one probe task per
//! endpoint and serves snapshots of their state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use dcstat_client::{Connector, MemorySessionStore, SessionStore};
use dcstat_core::EndpointId;

use crate::bootstrap::discover;
use crate::error::{ProbeError, ProbeResult};
use crate::probe::{Probe, ProbeSettings};
use crate::state::{EndpointStatus, ProbeState, Snapshot};

/// Owns every probe of one process.
///
/// Constructed explicitly and shared by `Arc` with whatever serves its
/// snapshots. The probe set is fixed after bootstrap.
pub struct Registry {
    connector: Arc<dyn Connector>,
    sessions: Arc<dyn SessionStore>,
    settings: Arc<ProbeSettings>,
    /// Set once, after bootstrap. Sorted by id.
    probes: OnceLock<Vec<ProbeState>>,
    started: AtomicBool,
}

impl Registry {
    /// Create a registry with an in-memory session cache.
    pub fn new(connector: Arc<dyn Connector>, settings: ProbeSettings) -> Self {
        Self::with_session_store(connector, Arc::new(MemorySessionStore::new()), settings)
    }

    pub fn with_session_store(
        connector: Arc<dyn Connector>,
        sessions: Arc<dyn SessionStore>,
        settings: ProbeSettings,
    ) -> Self {
        Self {
            connector,
            sessions,
            settings: Arc::new(settings),
            probes: OnceLock::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Whether bootstrap has completed and probes are running.
    pub fn is_started(&self) -> bool {
        self.probes.get().is_some()
    }

    /// Ids of the probed endpoints. Empty until bootstrap completes.
    pub fn endpoint_ids(&self) -> Vec<EndpointId> {
        self.probes
            .get()
            .map(|probes| probes.iter().map(ProbeState::id).collect())
            .unwrap_or_default()
    }

    /// Bootstrap, then probe every discovered endpoint until shutdown.
    ///
    /// Returns [`ProbeError::BootstrapFailed`] if shutdown arrives before an
    /// endpoint list was obtained, [`ProbeError::Cancelled`] once every probe
    /// has exited, and [`ProbeError::AlreadyStarted`] on a second call.
    pub async fn start(&self, mut shutdown: watch::Receiver<bool>) -> ProbeResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ProbeError::AlreadyStarted);
        }

        let endpoints = match discover(
            self.connector.as_ref(),
            &self.settings.identity,
            self.settings.bootstrap_timeout,
            self.settings.backoff,
            &mut shutdown,
        )
        .await
        {
            Ok(endpoints) => endpoints,
            Err(_) => {
                debug!("bootstrap interrupted by shutdown");
                return Err(ProbeError::BootstrapFailed);
            }
        };

        let states: Vec<ProbeState> = endpoints.iter().map(ProbeState::new).collect();
        let mut tasks = JoinSet::new();
        for state in &states {
            let probe = Probe::new(
                state.clone(),
                self.connector.clone(),
                self.sessions.clone(),
                self.settings.clone(),
            );
            let id = state.id();
            let rx = shutdown.clone();
            tasks.spawn(async move { (id, probe.run(rx).await) });
        }
        if self.probes.set(states).is_err() {
            warn!("probe list was already set");
        }
        info!(probes = tasks.len(), "probes started");

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Err(ProbeError::Cancelled))) => debug!(endpoint = id, "probe exited"),
                Ok((id, result)) => {
                    error!(endpoint = id, ?result, "probe exited unexpectedly");
                }
                Err(e) if e.is_panic() => error!(error = %e, "probe task panicked"),
                Err(e) => debug!(error = %e, "probe task aborted"),
            }
        }

        info!("all probes stopped");
        Err(ProbeError::Cancelled)
    }

    /// Copy of every started probe's status, sorted by id.
    ///
    /// Locks one endpoint at a time, only for the copy.
    pub fn snapshot(&self) -> Snapshot {
        let mut endpoints: Vec<EndpointStatus> = self
            .probes
            .get()
            .map(|probes| probes.iter().map(ProbeState::read).collect())
            .unwrap_or_default();
        endpoints.sort_by_key(|e| e.id);
        Snapshot {
            taken_at: Instant::now(),
            endpoints,
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("settings", &self.settings)
            .field("started", &self.started.load(Ordering::SeqCst))
            .field("endpoints", &self.endpoint_ids())
            .finish()
    }
}
