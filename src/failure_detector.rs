//! Heartbeat-driven liveness (§4.4). As leader, ticks on an interval and
//! leaves the actual send fan-out to the caller; as follower, tracks
//! `last_heartbeat_at` and signals once the lease has lapsed. Runs as a
//! cooperative task against the runtime's own clock (paused/advanced in
//! tests) rather than a bespoke clock abstraction.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

pub struct FailureDetector {
    heartbeat_interval: Duration,
    lease_timeout: Duration,
    last_heartbeat_at: Mutex<Instant>,
}

impl FailureDetector {
    pub fn new(heartbeat_interval: Duration, lease_timeout: Duration) -> Self {
        FailureDetector {
            heartbeat_interval,
            lease_timeout,
            last_heartbeat_at: Mutex::new(Instant::now()),
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    pub fn lease_timeout(&self) -> Duration {
        self.lease_timeout
    }

    /// Called on every `Heartbeat` receipt, resetting the deadline.
    pub fn record_heartbeat(&self) {
        *self.last_heartbeat_at.lock().unwrap() = Instant::now();
    }

    pub fn time_since_last_heartbeat(&self) -> Duration {
        self.last_heartbeat_at.lock().unwrap().elapsed()
    }

    pub fn has_lease_expired(&self) -> bool {
        self.time_since_last_heartbeat() >= self.lease_timeout
    }

    /// Follower mode: polls at a quarter of `lease_timeout` until the lease
    /// has lapsed, then returns. The caller (the per-replica context) then
    /// drives the elector; calling `record_heartbeat` concurrently from
    /// another task keeps the deadline pushed out indefinitely.
    pub async fn watch_as_follower(&self) {
        let poll = (self.lease_timeout / 4).max(Duration::from_millis(25));
        loop {
            tokio::time::sleep(poll).await;
            if self.has_lease_expired() {
                return;
            }
        }
    }

    /// Leader mode: invokes `tick` every `heartbeat_interval`, forever. The
    /// caller supplies the actual best-effort fan-out send and aborts this
    /// loop's task on stepping down.
    pub async fn run_heartbeat_loop<F, Fut>(&self, mut tick: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.heartbeat_interval);
        loop {
            interval.tick().await;
            tick().await;
        }
    }
}
