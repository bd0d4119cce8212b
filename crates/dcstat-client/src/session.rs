//! Connector and session traits.
//!
//! Boxed futures keep both traits object-safe so the prober can hold an
//! `Arc<dyn Connector>` and swap in a fake for tests.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use dcstat_core::{EndpointAddress, EndpointId, Identity, RemoteConfig};

use crate::error::ClientResult;

/// Boxed future alias for connect results.
pub type ConnectFuture<'a> =
    Pin<Box<dyn Future<Output = ClientResult<Box<dyn Session>>> + Send + 'a>>;

/// Boxed future alias for configuration-fetch results.
pub type ConfigFuture<'a> = Pin<Box<dyn Future<Output = ClientResult<RemoteConfig>> + Send + 'a>>;

/// Opaque reusable authorization blob for one endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(pub Vec<u8>);

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken({} bytes)", self.0.len())
    }
}

/// Parameters for opening one session.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub identity: Identity,
    /// Target address; `None` lets the client pick its default entry point.
    pub address: Option<EndpointAddress>,
    /// Endpoint the session is bound to, if any.
    pub endpoint: Option<EndpointId>,
    /// Previously cached token to resume with.
    pub token: Option<SessionToken>,
}

impl ConnectOptions {
    /// Options for a session against the client's default entry point.
    pub fn bootstrap(identity: Identity) -> Self {
        Self {
            identity,
            address: None,
            endpoint: None,
            token: None,
        }
    }

    /// Options for a session bound to one endpoint.
    pub fn endpoint(
        identity: Identity,
        endpoint: EndpointId,
        address: EndpointAddress,
        token: Option<SessionToken>,
    ) -> Self {
        Self {
            identity,
            address: Some(address),
            endpoint: Some(endpoint),
            token,
        }
    }
}

/// An open session to the remote system.
pub trait Session: Send + fmt::Debug {
    /// Invoke the configuration-fetch RPC.
    fn fetch_config(&mut self) -> ConfigFuture<'_>;

    /// Token the session is willing to have cached for reuse.
    fn session_token(&self) -> Option<SessionToken>;

    /// Release the session and any background machinery it owns.
    fn close(self: Box<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// Factory for sessions, injected for testability.
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, options: &'a ConnectOptions) -> ConnectFuture<'a>;
}
