//! dcstat-client: the remote client capability consumed by the prober.
//!
//! The protocol client itself lives behind two traits:
//!
//! ```text
//! Connector::connect(ConnectOptions) → Box<dyn Session>
//!   Session::fetch_config()  → RemoteConfig
//!   Session::session_token() → Option<SessionToken>
//!   Session::close()
//! ```
//!
//! Deadlines are applied by the caller, so implementations do not need to
//! enforce their own timeouts. [`TcpConnector`] is a plain TCP stand-in
//! driven by a static catalog; [`testing::ScriptedConnector`] is a fake for
//! tests (feature `testing`).

pub mod error;
pub mod session;
pub mod store;
pub mod tcp;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{ClientError, ClientResult};
pub use session::{ConfigFuture, ConnectFuture, ConnectOptions, Connector, Session, SessionToken};
pub use store::{MemorySessionStore, SessionStore};
pub use tcp::TcpConnector;
