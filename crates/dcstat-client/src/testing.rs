//! Scripted in-memory connector for tests.
//!
//! Each address gets a [`Script`]; bootstrap sessions (no address) answer
//! with the configured [`RemoteConfig`]. Every connect, fetch and open
//! session is counted so tests can assert on what the prober did.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dcstat_core::{EndpointAddress, EndpointId, RemoteConfig};

use crate::error::ClientError;
use crate::session::{ConfigFuture, ConnectFuture, ConnectOptions, Connector, Session, SessionToken};

/// Behaviour of one scripted address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Script {
    /// Connects and answers every fetch.
    Healthy,
    /// Refuses every connection.
    #[default]
    Refuse,
    /// Connects, but every fetch fails.
    FailFetch,
    /// Connects, but fetches never complete.
    HangFetch,
    /// Answers the first `n` fetches (over all sessions), then fails.
    HealthyFor(u32),
}

#[derive(Default)]
struct Inner {
    config: RemoteConfig,
    scripts: HashMap<EndpointAddress, Script>,
    bootstrap_failures: u32,
    bootstrap_hangs: u32,
    connects: HashMap<Option<EndpointAddress>, u32>,
    fetches: HashMap<Option<EndpointAddress>, u32>,
    answered: HashMap<Option<EndpointAddress>, u32>,
    presented_tokens: Vec<(EndpointId, SessionToken)>,
}

impl Inner {
    fn script(&self, address: &Option<EndpointAddress>) -> Script {
        match address {
            None => Script::Healthy,
            Some(addr) => self.scripts.get(addr).copied().unwrap_or_default(),
        }
    }
}

/// A [`Connector`] whose behaviour is set per address by the test.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    inner: Arc<Mutex<Inner>>,
    open: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new(config: RemoteConfig) -> Self {
        let connector = Self::default();
        connector.set_config(config);
        connector
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the configuration every session answers with.
    pub fn set_config(&self, config: RemoteConfig) {
        self.lock().config = config;
    }

    pub fn set_script(&self, address: EndpointAddress, script: Script) {
        self.lock().scripts.insert(address, script);
    }

    /// Refuse the next `times` bootstrap connects.
    pub fn fail_bootstrap(&self, times: u32) {
        self.lock().bootstrap_failures = times;
    }

    /// Let the next `times` bootstrap fetches hang forever.
    pub fn hang_bootstrap(&self, times: u32) {
        self.lock().bootstrap_hangs = times;
    }

    pub fn connects(&self, address: &EndpointAddress) -> u32 {
        self.lock()
            .connects
            .get(&Some(address.clone()))
            .copied()
            .unwrap_or(0)
    }

    pub fn bootstrap_connects(&self) -> u32 {
        self.lock().connects.get(&None).copied().unwrap_or(0)
    }

    pub fn fetches(&self, address: &EndpointAddress) -> u32 {
        self.lock()
            .fetches
            .get(&Some(address.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Sessions handed out and not yet closed or dropped.
    pub fn open_sessions(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Cached tokens presented on connect, in order.
    pub fn presented_tokens(&self) -> Vec<(EndpointId, SessionToken)> {
        self.lock().presented_tokens.clone()
    }
}

impl Connector for ScriptedConnector {
    fn connect<'a>(&'a self, options: &'a ConnectOptions) -> ConnectFuture<'a> {
        Box::pin(async move {
            {
                let mut inner = self.lock();
                *inner.connects.entry(options.address.clone()).or_default() += 1;
                if let (Some(endpoint), Some(token)) = (options.endpoint, options.token.clone()) {
                    inner.presented_tokens.push((endpoint, token));
                }

                if options.address.is_none() && inner.bootstrap_failures > 0 {
                    inner.bootstrap_failures -= 1;
                    return Err(ClientError::Connect("scripted bootstrap refusal".to_string()));
                }
                if inner.script(&options.address) == Script::Refuse {
                    return Err(ClientError::Connect("scripted refusal".to_string()));
                }
            }

            self.open.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ClientError>(Box::new(ScriptedSession {
                address: options.address.clone(),
                endpoint: options.endpoint,
                inner: self.inner.clone(),
                open: self.open.clone(),
            }) as Box<dyn Session>)
        })
    }
}

/// Session produced by [`ScriptedConnector`].
pub struct ScriptedSession {
    address: Option<EndpointAddress>,
    endpoint: Option<EndpointId>,
    inner: Arc<Mutex<Inner>>,
    open: Arc<AtomicUsize>,
}

impl std::fmt::Debug for ScriptedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedSession")
            .field("address", &self.address)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl Session for ScriptedSession {
    fn fetch_config(&mut self) -> ConfigFuture<'_> {
        Box::pin(async move {
            let outcome = {
                let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
                *inner.fetches.entry(self.address.clone()).or_default() += 1;
                let answered = inner.answered.get(&self.address).copied().unwrap_or(0);
                let script = if self.address.is_none() && inner.bootstrap_hangs > 0 {
                    inner.bootstrap_hangs -= 1;
                    Script::HangFetch
                } else {
                    inner.script(&self.address)
                };
                let verdict = match script {
                    Script::Healthy => Some(Ok(())),
                    Script::HealthyFor(n) if answered < n => Some(Ok(())),
                    Script::HealthyFor(_) | Script::FailFetch => {
                        Some(Err(ClientError::Rpc("scripted failure".to_string())))
                    }
                    Script::Refuse => Some(Err(ClientError::Closed)),
                    Script::HangFetch => None,
                };
                verdict.map(|result| {
                    result.map(|()| {
                        *inner.answered.entry(self.address.clone()).or_default() += 1;
                        inner.config.clone()
                    })
                })
            };

            match outcome {
                Some(result) => result,
                None => std::future::pending().await,
            }
        })
    }

    fn session_token(&self) -> Option<SessionToken> {
        self.endpoint
            .map(|id| SessionToken(format!("token-{id}").into_bytes()))
    }

    fn close(self: Box<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        drop(self);
        Box::pin(async {})
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcstat_core::{DcOption, Identity};

    fn addr(last: u8) -> EndpointAddress {
        EndpointAddress::new(format!("10.0.0.{last}"), 443)
    }

    #[tokio::test]
    async fn bootstrap_answers_config_after_failures() {
        let config = RemoteConfig::new(vec![DcOption::new(1, "10.0.0.1", 443)]);
        let connector = ScriptedConnector::new(config.clone());
        connector.fail_bootstrap(1);

        let options = ConnectOptions::bootstrap(Identity::new(1, "h"));
        assert!(connector.connect(&options).await.is_err());

        let mut session = connector.connect(&options).await.unwrap();
        assert_eq!(session.fetch_config().await.unwrap(), config);
        assert_eq!(connector.bootstrap_connects(), 2);
        assert_eq!(connector.open_sessions(), 1);

        session.close().await;
        assert_eq!(connector.open_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_bootstrap_fetch_then_answers() {
        let config = RemoteConfig::new(vec![DcOption::new(1, "10.0.0.1", 443)]);
        let connector = ScriptedConnector::new(config.clone());
        connector.hang_bootstrap(1);

        let options = ConnectOptions::bootstrap(Identity::new(1, "h"));
        let mut session = connector.connect(&options).await.unwrap();
        let hung = tokio::time::timeout(std::time::Duration::from_secs(5), session.fetch_config()).await;
        assert!(hung.is_err());
        assert_eq!(session.fetch_config().await.unwrap(), config);
    }

    #[tokio::test]
    async fn healthy_for_then_fails() {
        let connector = ScriptedConnector::new(RemoteConfig::default());
        connector.set_script(addr(1), Script::HealthyFor(1));

        let options = ConnectOptions::endpoint(Identity::new(1, "h"), 1, addr(1), None);
        let mut session = connector.connect(&options).await.unwrap();
        assert!(session.fetch_config().await.is_ok());
        assert!(session.fetch_config().await.is_err());
        assert_eq!(connector.fetches(&addr(1)), 2);
    }

    #[tokio::test]
    async fn unknown_address_is_refused() {
        let connector = ScriptedConnector::new(RemoteConfig::default());
        let options = ConnectOptions::endpoint(Identity::new(1, "h"), 9, addr(9), None);
        assert!(connector.connect(&options).await.is_err());
        assert_eq!(connector.connects(&addr(9)), 1);
        assert_eq!(connector.open_sessions(), 0);
    }
}
