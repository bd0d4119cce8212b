//! Per-endpoint observation state and point-in-time snapshots.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use dcstat_core::{EndpointAddress, EndpointDescriptor, EndpointId};

/// What is known about one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointStatus {
    pub id: EndpointId,
    /// Target for the next connect. Revised when the remote advertises a
    /// different address for this id.
    pub address: EndpointAddress,
    /// Address of the session that produced the last success.
    pub current_address: Option<EndpointAddress>,
    /// `None` until the first successful probe.
    pub last_success_at: Option<Instant>,
    /// Round trip of the last successful probe.
    pub latency: Option<Duration>,
}

impl EndpointStatus {
    pub fn new(descriptor: &EndpointDescriptor) -> Self {
        Self {
            id: descriptor.id,
            address: descriptor.address.clone(),
            current_address: None,
            last_success_at: None,
            latency: None,
        }
    }

    /// Time since the last success, or `None` if never observed.
    pub fn since_last_success(&self, now: Instant) -> Option<Duration> {
        self.last_success_at
            .map(|seen| now.saturating_duration_since(seen))
    }

    /// Up means a success within `threshold` of `now`.
    pub fn is_up(&self, now: Instant, threshold: Duration) -> bool {
        self.since_last_success(now)
            .is_some_and(|age| age < threshold)
    }
}

/// Shared, lock-guarded status of one endpoint.
///
/// The probe is the only writer. All fields change in one critical section
/// so readers never see a mix of two cycles.
#[derive(Debug, Clone)]
pub struct ProbeState {
    inner: Arc<Mutex<EndpointStatus>>,
}

impl ProbeState {
    pub fn new(descriptor: &EndpointDescriptor) -> Self {
        Self {
            inner: Arc::new(Mutex::new(EndpointStatus::new(descriptor))),
        }
    }

    pub fn id(&self) -> EndpointId {
        self.read().id
    }

    /// Copy of the current status.
    pub fn read(&self) -> EndpointStatus {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Address the next connect should use.
    pub fn target(&self) -> EndpointAddress {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .address
            .clone()
    }

    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut EndpointStatus) -> R) -> R {
        let mut status = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut status)
    }
}

/// Immutable copy of every started endpoint's status, sorted by id.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub taken_at: Instant,
    pub endpoints: Vec<EndpointStatus>,
}

impl Snapshot {
    pub fn get(&self, id: EndpointId) -> Option<&EndpointStatus> {
        self.endpoints.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EndpointStatus> {
        self.endpoints.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcstat_core::ExcludeFlags;

    fn descriptor(id: EndpointId) -> EndpointDescriptor {
        EndpointDescriptor {
            id,
            address: EndpointAddress::new(format!("10.0.0.{id}"), 443),
            flags: ExcludeFlags::default(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_state_is_never_seen() {
        let state = ProbeState::new(&descriptor(1));
        let status = state.read();
        assert_eq!(status.id, 1);
        assert!(status.last_success_at.is_none());
        assert!(status.since_last_success(Instant::now()).is_none());
        assert!(!status.is_up(Instant::now(), Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn up_until_threshold_passes() {
        let state = ProbeState::new(&descriptor(1));
        state.update(|s| s.last_success_at = Some(Instant::now()));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(state.read().is_up(Instant::now(), Duration::from_secs(60)));

        tokio::time::advance(Duration::from_secs(1)).await;
        let status = state.read();
        assert!(!status.is_up(Instant::now(), Duration::from_secs(60)));
        assert_eq!(
            status.since_last_success(Instant::now()),
            Some(Duration::from_secs(60))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn readers_never_see_a_mixed_cycle() {
        use std::sync::atomic::{AtomicBool, Ordering};

        const CYCLES: u16 = 20_000;
        let state = ProbeState::new(&descriptor(1));
        let base = Instant::now();
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let state = state.clone();
                let done = done.clone();
                tokio::spawn(async move {
                    while !done.load(Ordering::Acquire) {
                        let status = state.read();
                        if let Some(addr) = &status.current_address {
                            let cycle = u64::from(addr.port);
                            assert_eq!(status.latency, Some(Duration::from_millis(cycle)));
                            assert_eq!(
                                status.last_success_at,
                                Some(base + Duration::from_secs(cycle))
                            );
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        let writer = {
            let state = state.clone();
            tokio::spawn(async move {
                for cycle in 1..=CYCLES {
                    state.update(|s| {
                        s.current_address = Some(EndpointAddress::new("10.0.0.1", cycle));
                        s.latency = Some(Duration::from_millis(u64::from(cycle)));
                        s.last_success_at = Some(base + Duration::from_secs(u64::from(cycle)));
                    });
                    if cycle % 64 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        };

        writer.await.unwrap();
        done.store(true, Ordering::Release);
        for reader in readers {
            reader.await.unwrap();
        }

        let last = state.read();
        assert_eq!(last.current_address.map(|a| a.port), Some(CYCLES));
        assert_eq!(last.latency, Some(Duration::from_millis(u64::from(CYCLES))));
    }

    #[test]
    fn clones_share_one_record() {
        let state = ProbeState::new(&descriptor(2));
        let reader = state.clone();
        state.update(|s| s.address = EndpointAddress::new("10.9.9.9", 80));
        assert_eq!(reader.target(), EndpointAddress::new("10.9.9.9", 80));
    }
}
