//! dcstat-probe: the concurrent probe supervisor.
//!
//! Discovers the endpoint list once, then keeps one reconnecting probe
//! loop per endpoint and exposes point-in-time snapshots of what they saw.
//!
//! # Architecture
//!
//! ```text
//! Registry::start
//!   ├── bootstrap::discover (retry with backoff until a list arrives)
//!   └── JoinSet of Probe::run, one per endpoint
//!       ├── Connecting: with_retry(connect), cached session token
//!       ├── Idle: interval tick
//!       ├── Probing: fetch_config under a deadline
//!       └── ProbeState (one lock per endpoint)
//!
//! Registry::snapshot ──▶ copies every ProbeState, sorted by id
//! ```
//!
//! # Shutdown
//!
//! A single `watch::Receiver<bool>` is cloned into bootstrap and every
//! probe. Each wait races it, so a probe exits within one RPC deadline of
//! the signal and always closes its session on the way out.

pub mod backoff;
pub mod bootstrap;
pub mod error;
pub mod probe;
pub mod registry;
pub mod state;

pub use backoff::{Backoff, shutdown_signalled, with_retry};
pub use bootstrap::{discover, select_endpoints};
pub use error::{ProbeError, ProbeResult};
pub use probe::{Probe, ProbeSettings};
pub use registry::Registry;
pub use state::{EndpointStatus, ProbeState, Snapshot};
