//! One-time discovery of the endpoint list.
//!
//! Opens a short-lived session against the client's default entry point,
//! fetches the global configuration and keeps the options worth probing.
//! Failed attempts are retried with backoff until shutdown.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use dcstat_client::{ClientError, ConnectOptions, Connector};
use dcstat_core::config::BackoffSettings;
use dcstat_core::{EndpointDescriptor, Identity, RemoteConfig};

use crate::backoff::{Backoff, with_retry};
use crate::error::ProbeResult;

/// Discover the endpoints to probe.
///
/// Each attempt is bounded by `attempt_timeout`. Fails only with
/// [`crate::ProbeError::Cancelled`].
pub async fn discover(
    connector: &dyn Connector,
    identity: &Identity,
    attempt_timeout: Duration,
    backoff: BackoffSettings,
    shutdown: &mut watch::Receiver<bool>,
) -> ProbeResult<Vec<EndpointDescriptor>> {
    let mut backoff = Backoff::new(backoff);
    let options = ConnectOptions::bootstrap(identity.clone());

    debug!("getting config");
    let endpoints = with_retry(&mut backoff, shutdown, "bootstrap", || async {
        let config = fetch_once(connector, &options, attempt_timeout).await?;
        let endpoints = select_endpoints(&config);
        if endpoints.is_empty() {
            return Err(ClientError::Rpc(
                "config lists no probeable endpoints".to_string(),
            ));
        }
        Ok(endpoints)
    })
    .await?;

    info!(endpoints = endpoints.len(), "endpoint list discovered");
    Ok(endpoints)
}

async fn fetch_once(
    connector: &dyn Connector,
    options: &ConnectOptions,
    attempt_timeout: Duration,
) -> Result<RemoteConfig, ClientError> {
    let attempt = async {
        let mut session = connector.connect(options).await?;
        debug!("bootstrap session open");
        let result = session.fetch_config().await;
        session.close().await;
        result
    };
    tokio::time::timeout(attempt_timeout, attempt)
        .await
        .map_err(|_| ClientError::Timeout(attempt_timeout))?
}

/// Keep one probeable option per id, in id order. The first usable option
/// for an id wins.
pub fn select_endpoints(config: &RemoteConfig) -> Vec<EndpointDescriptor> {
    let mut selected: BTreeMap<_, EndpointDescriptor> = BTreeMap::new();

    for dc in &config.dc_options {
        let flags = dc.flags();
        if flags.any() {
            debug!(dc = dc.id, addr = %dc.address(), excluded = ?flags.reasons(), "skipping option");
            continue;
        }
        if let Some(existing) = selected.get(&dc.id) {
            debug!(
                dc = dc.id,
                addr = %dc.address(),
                kept = %existing.address,
                "skipping duplicate option"
            );
            continue;
        }
        debug!(dc = dc.id, addr = %dc.address(), "datacenter");
        selected.insert(dc.id, EndpointDescriptor::from(dc));
    }

    selected.into_values().collect()
}
