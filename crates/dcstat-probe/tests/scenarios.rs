//! End-to-end prober scenarios against the scripted connector.
//!
//! All tests run on paused time, so intervals and backoff delays are
//! exact and the suite finishes instantly.

use std::sync::Arc;
use std::time::Duration;

use dcstat_client::testing::{Script, ScriptedConnector};
use dcstat_core::config::BackoffSettings;
use dcstat_core::{DcOption, EndpointAddress, Identity, RemoteConfig};
use dcstat_probe::{ProbeError, ProbeResult, ProbeSettings, Registry};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

const INTERVAL: Duration = Duration::from_secs(10);

fn addr(last: u8) -> EndpointAddress {
    EndpointAddress::new(format!("10.0.0.{last}"), 443)
}

fn settings() -> ProbeSettings {
    ProbeSettings {
        interval: INTERVAL,
        timeout: Duration::from_secs(5),
        bootstrap_timeout: Duration::from_secs(5),
        backoff: BackoffSettings {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            multiplier: 1.5,
            jitter: 0.5,
        },
        ..ProbeSettings::new(Identity::new(12345, "0123456789abcdef"))
    }
}

struct Running {
    registry: Arc<Registry>,
    connector: ScriptedConnector,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<ProbeResult<()>>,
}

fn start(connector: ScriptedConnector) -> Running {
    let registry = Arc::new(Registry::new(Arc::new(connector.clone()), settings()));
    let (shutdown, rx) = watch::channel(false);
    let task = tokio::spawn({
        let registry = registry.clone();
        async move { registry.start(rx).await }
    });
    Running {
        registry,
        connector,
        shutdown,
        task,
    }
}

impl Running {
    /// Signal shutdown and return how long the registry took to stop.
    async fn stop(self) -> Duration {
        let started = Instant::now();
        self.shutdown.send(true).unwrap();
        assert_eq!(self.task.await.unwrap(), Err(ProbeError::Cancelled));
        assert_eq!(self.connector.open_sessions(), 0);
        started.elapsed()
    }
}

#[tokio::test(start_paused = true)]
async fn healthy_and_failing_endpoints_after_three_intervals() {
    let connector = ScriptedConnector::new(RemoteConfig::new(vec![
        DcOption::new(1, "10.0.0.1", 443),
        DcOption::new(2, "10.0.0.2", 443),
    ]));
    connector.set_script(addr(1), Script::Healthy);
    connector.set_script(addr(2), Script::Refuse);
    let run = start(connector);

    tokio::time::sleep(INTERVAL * 3 + Duration::from_secs(1)).await;
    let snapshot = run.registry.snapshot();
    let ids: Vec<_> = snapshot.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![1, 2]);

    let one = snapshot.get(1).unwrap();
    let age = one.since_last_success(snapshot.taken_at).unwrap();
    assert!(age <= INTERVAL + Duration::from_secs(1), "age {age:?}");
    assert_eq!(one.current_address, Some(addr(1)));

    let two = snapshot.get(2).unwrap();
    assert!(two.last_success_at.is_none());
    assert!(two.current_address.is_none());
    assert!(run.connector.connects(&addr(2)) > 1);

    run.stop().await;
}

#[tokio::test(start_paused = true)]
async fn age_keeps_growing_after_failures_start() {
    let connector = ScriptedConnector::new(RemoteConfig::new(vec![DcOption::new(1, "10.0.0.1", 443)]));
    connector.set_script(addr(1), Script::HealthyFor(1));
    let run = start(connector);

    tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
    let first = run.registry.snapshot().get(1).unwrap().last_success_at;
    assert!(first.is_some());

    let mut previous_age = Duration::ZERO;
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_secs(30)).await;
        let snapshot = run.registry.snapshot();
        let status = snapshot.get(1).unwrap();
        assert_eq!(status.last_success_at, first);
        let age = status.since_last_success(snapshot.taken_at).unwrap();
        assert!(age > previous_age);
        previous_age = age;
    }
    assert!(previous_age >= Duration::from_secs(300));

    run.stop().await;
}

#[tokio::test(start_paused = true)]
async fn address_change_is_followed_without_new_probe() {
    let connector = ScriptedConnector::new(RemoteConfig::new(vec![DcOption::new(3, "10.0.0.3", 443)]));
    connector.set_script(addr(3), Script::Healthy);
    let run = start(connector.clone());

    tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
    assert_eq!(run.registry.snapshot().get(3).unwrap().address, addr(3));

    connector.set_script(addr(33), Script::Healthy);
    connector.set_config(RemoteConfig::new(vec![DcOption::new(3, "10.0.0.33", 443)]));
    tokio::time::sleep(INTERVAL).await;

    let snapshot = run.registry.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.get(3).unwrap().address, addr(33));
    assert_eq!(run.registry.endpoint_ids(), vec![3]);
    // Still on the first session.
    assert_eq!(connector.connects(&addr(3)), 1);

    run.stop().await;
}

#[tokio::test(start_paused = true)]
async fn excluded_options_never_get_a_probe() {
    let connector = ScriptedConnector::new(RemoteConfig::new(vec![
        DcOption::new(1, "10.0.0.1", 443),
        DcOption { ipv6: true, ..DcOption::new(2, "10.0.0.2", 443) },
        DcOption { media_only: true, ..DcOption::new(3, "10.0.0.3", 443) },
        DcOption { is_static: true, ..DcOption::new(4, "10.0.0.4", 443) },
        DcOption { cdn: true, ..DcOption::new(5, "10.0.0.5", 443) },
        DcOption { tcpo_only: true, ..DcOption::new(6, "10.0.0.6", 443) },
    ]));
    for last in 1..=6 {
        connector.set_script(addr(last), Script::Healthy);
    }
    let run = start(connector.clone());

    tokio::time::sleep(INTERVAL * 2).await;
    assert_eq!(run.registry.endpoint_ids(), vec![1]);
    for last in 2..=6 {
        assert_eq!(connector.connects(&addr(last)), 0, "10.0.0.{last} was dialed");
    }

    run.stop().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_is_prompt_in_every_wait() {
    let connector = ScriptedConnector::new(RemoteConfig::new(vec![
        DcOption::new(1, "10.0.0.1", 443),
        DcOption::new(2, "10.0.0.2", 443),
        DcOption::new(3, "10.0.0.3", 443),
    ]));
    // Idle, backing off, and stuck in an RPC, respectively.
    connector.set_script(addr(1), Script::Healthy);
    connector.set_script(addr(2), Script::Refuse);
    connector.set_script(addr(3), Script::HangFetch);
    let run = start(connector.clone());

    tokio::time::sleep(INTERVAL + Duration::from_secs(2)).await;
    assert_eq!(connector.fetches(&addr(3)), 1);
    assert_eq!(connector.open_sessions(), 2);

    let took = run.stop().await;
    assert!(took < Duration::from_secs(5), "shutdown took {took:?}");
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_bootstrap() {
    let connector = ScriptedConnector::new(RemoteConfig::new(vec![DcOption::new(1, "10.0.0.1", 443)]));
    connector.fail_bootstrap(u32::MAX);
    let registry = Arc::new(Registry::new(Arc::new(connector.clone()), settings()));
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn({
        let registry = registry.clone();
        async move { registry.start(rx).await }
    });

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(connector.bootstrap_connects() > 1);
    assert!(!registry.is_started());

    tx.send(true).unwrap();
    assert_eq!(task.await.unwrap(), Err(ProbeError::BootstrapFailed));
    assert_eq!(connector.open_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn reconnect_resumes_cached_session() {
    let connector = ScriptedConnector::new(RemoteConfig::new(vec![DcOption::new(1, "10.0.0.1", 443)]));
    connector.set_script(addr(1), Script::FailFetch);
    let run = start(connector.clone());

    tokio::time::sleep(INTERVAL * 3).await;
    let connects = connector.connects(&addr(1));
    assert!(connects >= 2);
    let tokens = connector.presented_tokens();
    // Every reconnect after the first session presents the cached token.
    assert_eq!(tokens.len() as u32, connects - 1);
    assert!(tokens.iter().all(|(id, _)| *id == 1));

    run.stop().await;
}
