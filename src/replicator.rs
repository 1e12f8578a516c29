//! Write replication (§4.6). On the leader, fans a committed write out to
//! followers and waits for at-least-one-follower durability (weaker than a
//! majority quorum, per §9's open question); on followers, applies
//! replicated operations to the Store.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::alert_sink::AlertSink;
use crate::error::TriageError;
use crate::membership::Membership;
use crate::pf_debug;
use crate::report::NewReport;
use crate::store::Store;
use crate::transport::{ReplicatedOp, RpcRequest, RpcResponse, TransportClient};

pub struct Replicator {
    store: Arc<dyn Store>,
    alert_sink: Arc<dyn AlertSink>,
}

/// Outcome of a leader-side committed write, for the RPC layer to render.
pub struct WriteOutcome {
    pub success: bool,
    pub alert_sent: bool,
}

impl Replicator {
    pub fn new(store: Arc<dyn Store>, alert_sink: Arc<dyn AlertSink>) -> Self {
        Replicator { store, alert_sink }
    }

    /// Leader path for a client `SendRiskReport` (§4.6 steps 1-7). Returns
    /// `Err` only for `InvalidTier` or `StorageFailed`; a write that
    /// replicates to zero followers still succeeds.
    pub async fn handle_client_write(
        &self,
        report: NewReport,
        membership: &Membership,
        per_call_deadline: Duration,
    ) -> Result<WriteOutcome, TriageError> {
        if report.tier.into_tier().is_none() {
            return Err(TriageError::InvalidTier(
                "GREEN reports are never stored".into(),
            ));
        }
        let tier = report.tier.into_tier().expect("checked above");

        let local_id = self.store.append(report.clone()).await?;

        let followers = membership.other_peers();
        if !followers.is_empty() {
            let acked = self
                .fan_out_replicate(
                    ReplicatedOp::RiskReport(report),
                    &followers,
                    per_call_deadline,
                )
                .await;
            pf_debug!(
                "replication fan-out to {} follower(s), {} acked",
                followers.len(),
                acked
            );
        }

        let alert_sent = if tier == crate::report::Tier::Red {
            match self.alert_sink.notify(local_id).await {
                Ok(()) => {
                    self.store.mark_alert_sent(local_id).await?;
                    true
                }
                Err(e) => {
                    pf_debug!("alert sink failed for report {local_id}: {e}");
                    false
                }
            }
        } else {
            false
        };

        Ok(WriteOutcome {
            success: true,
            alert_sent,
        })
    }

    /// Sends `op` to every `(id, addr)` in `followers` in parallel, each
    /// bounded by `per_call_deadline`. Returns the number that answered
    /// `success = true`. Best-effort: a failing follower is logged, never
    /// retried here (it re-converges via `JoinCluster`).
    async fn fan_out_replicate(
        &self,
        op: ReplicatedOp,
        followers: &[(crate::error::ReplicaId, std::net::SocketAddr)],
        per_call_deadline: Duration,
    ) -> usize {
        let mut calls = JoinSet::new();
        for &(peer_id, addr) in followers {
            let op = op.clone();
            calls.spawn(async move {
                TransportClient::call(
                    addr,
                    RpcRequest::ReplicateOperation(op),
                    per_call_deadline,
                )
                .await
                .ok()
                .map(|resp| (peer_id, matches!(resp, RpcResponse::Ack { success: true, .. })))
            });
        }

        let mut acked = 0;
        while let Some(joined) = calls.join_next().await {
            match joined {
                Ok(Some((peer_id, true))) => {
                    acked += 1;
                    pf_debug!("follower {peer_id} acked replication");
                }
                Ok(Some((peer_id, false))) => {
                    pf_debug!("follower {peer_id} rejected replication");
                }
                Ok(None) => pf_debug!("a follower was unreachable for replication"),
                Err(e) => pf_debug!("replication fan-out task panicked: {e}"),
            }
        }
        acked
    }

    /// Follower path for `ReplicateOperation` (§4.6).
    pub async fn handle_replicated_op(
        &self,
        op: ReplicatedOp,
        membership: &Membership,
    ) -> Result<(), TriageError> {
        match op {
            ReplicatedOp::RiskReport(report) => {
                self.store.append(report).await?;
                Ok(())
            }
            ReplicatedOp::MembershipUpdate {
                peers,
                leader_address,
            } => {
                membership.replace_all(peers);
                membership.set_current_leader_address(leader_address);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert_sink::LoggingAlertSink;
    use crate::report::{ClinicalInputs, WireTier};
    use crate::store::SqliteStore;

    fn inputs() -> ClinicalInputs {
        ClinicalInputs {
            age: 70.0,
            serum_sodium: 140.0,
            serum_creatinine: 1.0,
            ejection_fraction: 40.0,
            day: 1,
        }
    }

    fn report(tier: WireTier) -> NewReport {
        NewReport {
            patient_id: "P1".into(),
            timestamp: 1000,
            inputs: inputs(),
            probability: 0.65,
            tier,
        }
    }

    fn replicator() -> Replicator {
        let store = Arc::new(SqliteStore::open(":memory:").unwrap());
        Replicator::new(store, Arc::new(LoggingAlertSink))
    }

    fn solo_membership() -> Membership {
        Membership::new(1, "127.0.0.1:9001".parse().unwrap(), [])
    }

    #[tokio::test]
    async fn green_report_is_rejected() {
        let r = replicator();
        let err = r
            .handle_client_write(report(WireTier::Green), &solo_membership(), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, TriageError::InvalidTier(_)));
    }

    #[tokio::test]
    async fn red_report_commits_and_alerts_with_no_followers() {
        let r = replicator();
        let outcome = r
            .handle_client_write(report(WireTier::Red), &solo_membership(), Duration::from_millis(100))
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.alert_sent);
    }

    #[tokio::test]
    async fn amber_report_commits_without_alert() {
        let r = replicator();
        let outcome = r
            .handle_client_write(report(WireTier::Amber), &solo_membership(), Duration::from_millis(100))
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(!outcome.alert_sent);
    }

    #[tokio::test]
    async fn follower_applies_replicated_risk_report() {
        let r = replicator();
        let membership = solo_membership();
        r.handle_replicated_op(ReplicatedOp::RiskReport(report(WireTier::Amber)), &membership)
            .await
            .unwrap();
        let rows = r.store.list_by_patient("P1", 0).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn follower_applies_membership_update() {
        let r = replicator();
        let membership = solo_membership();
        let leader_addr: std::net::SocketAddr = "127.0.0.1:9002".parse().unwrap();
        r.handle_replicated_op(
            ReplicatedOp::MembershipUpdate {
                peers: vec![(1, "127.0.0.1:9001".parse().unwrap()), (2, leader_addr)],
                leader_address: leader_addr,
            },
            &membership,
        )
        .await
        .unwrap();
        assert_eq!(membership.current_leader_address(), Some(leader_addr));
        assert_eq!(membership.peers().len(), 2);
    }
}
