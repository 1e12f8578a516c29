//! Client runtime (§4.8): leader discovery, write retries, and the
//! in-memory retry queue. This is a library used by whatever produces
//! report tuples (the Reporter, §4.9); `triagedb_client` is a thin CLI
//! shell around it for manual operation and smoke testing.

mod config;

pub use config::ClientConfig;

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio::time;

use crate::error::TriageError;
use crate::pf_info;
use crate::report::{NewReport, RiskReport};
use crate::transport::{RpcRequest, RpcResponse, TransportClient};

/// Outcome of a successful `send_report` call.
#[derive(Debug, Clone, Copy)]
pub struct SendOutcome {
    pub alert_sent: bool,
}

pub struct ClientRuntime {
    config: ClientConfig,
    known_leader: RwLock<Option<SocketAddr>>,
    retry_queue: Mutex<VecDeque<NewReport>>,
}

impl ClientRuntime {
    pub fn new(config: ClientConfig) -> Self {
        let known_leader = RwLock::new(config.preferred_leader_address);
        ClientRuntime {
            config,
            known_leader,
            retry_queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Resolves the current leader: tries the preferred address first, then
    /// races `GetLeaderInfo` against every fallback address, adopting the
    /// first response. A failed attempt is retried after `retry_delay_s`
    /// (§4.8's "fail the current attempt and retry after retry_delay"),
    /// bounded overall by `overall_leader_lookup_timeout_s`.
    pub async fn discover_leader(&self) -> Result<SocketAddr, TriageError> {
        let overall = Duration::from_secs(self.config.overall_leader_lookup_timeout_s);
        let retry_delay = Duration::from_secs(self.config.retry_delay_s);
        time::timeout(overall, async {
            loop {
                if let Ok(addr) = self.discover_leader_inner().await {
                    return addr;
                }
                pf_info!("leader discovery attempt failed, retrying in {retry_delay:?}");
                time::sleep(retry_delay).await;
            }
        })
        .await
        .map_err(|_| TriageError::Transport("leader lookup timed out".into()))
    }

    async fn discover_leader_inner(&self) -> Result<SocketAddr, TriageError> {
        let per_call = Duration::from_secs(self.config.fallback_timeout_s);

        if let Some(preferred) = self.config.preferred_leader_address {
            if let Ok(RpcResponse::LeaderInfo {
                leader_address: Some(addr),
                ..
            }) = TransportClient::call(preferred, RpcRequest::GetLeaderInfo, per_call).await
            {
                *self.known_leader.write().await = Some(addr);
                return Ok(addr);
            }
        }

        let mut calls = JoinSet::new();
        for addr in &self.config.fallback_addresses {
            let addr = *addr;
            calls.spawn(async move {
                TransportClient::call(addr, RpcRequest::GetLeaderInfo, per_call).await
            });
        }

        while let Some(joined) = calls.join_next().await {
            if let Ok(Ok(RpcResponse::LeaderInfo {
                leader_address: Some(addr),
                ..
            })) = joined
            {
                *self.known_leader.write().await = Some(addr);
                return Ok(addr);
            }
        }

        Err(TriageError::Transport(
            "no reachable replica reported a leader".into(),
        ))
    }

    /// Sends `report` with deadline `rpc_timeout_s`. On failure or a
    /// `NotLeader` hint, re-enqueues the report for a later retry and
    /// propagates the error.
    pub async fn send_report(&self, report: NewReport) -> Result<SendOutcome, TriageError> {
        let leader = match *self.known_leader.read().await {
            Some(addr) => addr,
            None => self.discover_leader().await?,
        };

        let deadline = Duration::from_secs(self.config.rpc_timeout_s);
        match TransportClient::call(leader, RpcRequest::SendRiskReport(report.clone()), deadline)
            .await
        {
            Ok(RpcResponse::Ack {
                success: true,
                alert_sent,
                ..
            }) => Ok(SendOutcome {
                alert_sent: alert_sent.unwrap_or(false),
            }),
            Ok(RpcResponse::Ack {
                success: false,
                message,
                ..
            }) => {
                self.retry_queue.lock().unwrap().push_back(report);
                Err(TriageError::Transport(format!(
                    "leader rejected write: {message}"
                )))
            }
            Ok(_) => {
                self.retry_queue.lock().unwrap().push_back(report);
                Err(TriageError::Transport("unexpected response shape".into()))
            }
            Err(e) => {
                *self.known_leader.write().await = None;
                self.retry_queue.lock().unwrap().push_back(report);
                Err(e)
            }
        }
    }

    /// Drains the retry queue, re-sending each in FIFO order. A failed send
    /// re-enqueues its report (via `send_report`) and is retried after
    /// `retry_delay_s`; after `MAX_CONSECUTIVE_FAILURES` such failures in a
    /// row (the leader is likely unreachable for a while), stops so the
    /// caller's own retry cadence (e.g. `run_background_loop`'s tick) takes
    /// over instead of this call blocking indefinitely.
    pub async fn flush_retry_queue(&self) {
        const MAX_CONSECUTIVE_FAILURES: u32 = 3;
        let retry_delay = Duration::from_secs(self.config.retry_delay_s);
        let mut consecutive_failures = 0;

        loop {
            let next = self.retry_queue.lock().unwrap().pop_front();
            let Some(report) = next else { return };
            match self.send_report(report).await {
                Ok(_) => consecutive_failures = 0,
                Err(_) => {
                    consecutive_failures += 1;
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        return;
                    }
                    time::sleep(retry_delay).await;
                }
            }
        }
    }

    pub fn queued_len(&self) -> usize {
        self.retry_queue.lock().unwrap().len()
    }

    pub async fn list_reports(
        &self,
        patient_id: &str,
        count: usize,
    ) -> Result<Vec<RiskReport>, TriageError> {
        let leader = match *self.known_leader.read().await {
            Some(addr) => addr,
            None => self.discover_leader().await?,
        };
        let deadline = Duration::from_secs(self.config.rpc_timeout_s);
        match TransportClient::call(
            leader,
            RpcRequest::ListRiskReports {
                patient_id: patient_id.to_string(),
                count,
            },
            deadline,
        )
        .await?
        {
            RpcResponse::Reports(reports) => Ok(reports),
            _ => Err(TriageError::Transport("unexpected response shape".into())),
        }
    }

    /// Runs forever, periodically refreshing leader knowledge and flushing
    /// the retry queue, at `client_heartbeat_interval_s`.
    pub async fn run_background_loop(&self) {
        let mut interval = time::interval(Duration::from_secs(
            self.config.client_heartbeat_interval_s,
        ));
        loop {
            interval.tick().await;
            if let Err(e) = self.discover_leader().await {
                pf_info!("leader refresh failed: {e}");
            }
            self.flush_retry_queue().await;
        }
    }
}
