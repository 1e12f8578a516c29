//! Dynamic membership growth via state transfer (§4.7). Leader-side:
//! admits a joiner and ships it a full snapshot. Joiner-side: requests that
//! snapshot and retries with exponential backoff until it lands.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ReplicaId, TriageError};
use crate::membership::Membership;
use crate::pf_info;
use crate::store::Store;
use crate::transport::{ReplicatedOp, RpcRequest, RpcResponse, TransportClient};

pub struct JoinCoordinator;

impl JoinCoordinator {
    /// Leader-side handling of an inbound `JoinCluster` (§4.7 steps 1-4).
    /// The `membership_update` broadcast to the rest of the cluster happens
    /// on a detached task so the joiner's call isn't held up by it.
    pub async fn handle_join(
        store: &Arc<dyn Store>,
        membership: &Arc<Membership>,
        new_id: ReplicaId,
        new_address: SocketAddr,
        broadcast_deadline: Duration,
    ) -> Result<RpcResponse, TriageError> {
        membership.add_peer(new_id, new_address);
        pf_info!("admitted joiner {new_id} at {new_address}");

        let snapshot = store.snapshot().await?;

        let membership = Arc::clone(membership);
        tokio::spawn(async move {
            Self::broadcast_membership_update(&membership, broadcast_deadline).await;
        });

        Ok(RpcResponse::JoinResult {
            success: true,
            message: "joined".into(),
            snapshot,
        })
    }

    async fn broadcast_membership_update(membership: &Membership, deadline: Duration) {
        let peers = membership.peers();
        let leader_address = membership.self_address();
        for (peer_id, addr) in membership.other_peers() {
            let op = ReplicatedOp::MembershipUpdate {
                peers: peers.clone(),
                leader_address,
            };
            if let Err(e) =
                TransportClient::call(addr, RpcRequest::ReplicateOperation(op), deadline).await
            {
                pf_info!("membership broadcast to {peer_id} failed: {e}");
            }
        }
    }

    /// Joiner-side: repeatedly asks `leader_address` to admit
    /// `(self_id, self_address)`, backing off `1s, 2s, 4s, ...` capped at
    /// `~30s`, until a snapshot is obtained and loaded into `store`.
    pub async fn join_and_load_snapshot(
        store: &Arc<dyn Store>,
        self_id: ReplicaId,
        self_address: SocketAddr,
        leader_address: SocketAddr,
        rpc_deadline: Duration,
    ) -> Result<(), TriageError> {
        let mut delay = Duration::from_secs(1);
        let cap = Duration::from_secs(30);

        loop {
            match TransportClient::call(
                leader_address,
                RpcRequest::JoinCluster {
                    new_id: self_id,
                    new_address: self_address,
                },
                rpc_deadline,
            )
            .await
            {
                Ok(RpcResponse::JoinResult {
                    success: true,
                    snapshot,
                    ..
                }) => {
                    store.load_snapshot(snapshot).await?;
                    pf_info!("loaded snapshot from {leader_address}");
                    return Ok(());
                }
                Ok(_) | Err(_) => {
                    pf_info!(
                        "join attempt against {leader_address} failed, retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(cap);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{ClinicalInputs, NewReport, WireTier};
    use crate::store::SqliteStore;
    use crate::transport::{RequestHandler, TransportListener};
    use async_trait::async_trait;

    struct LeaderHandler {
        store: Arc<dyn Store>,
        membership: Arc<Membership>,
    }

    #[async_trait]
    impl RequestHandler for LeaderHandler {
        async fn handle(&self, req: RpcRequest) -> RpcResponse {
            match req {
                RpcRequest::JoinCluster {
                    new_id,
                    new_address,
                } => JoinCoordinator::handle_join(
                    &self.store,
                    &self.membership,
                    new_id,
                    new_address,
                    Duration::from_millis(200),
                )
                .await
                .unwrap_or_else(|e| RpcResponse::err(e.to_string())),
                _ => RpcResponse::err("unexpected"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn joiner_loads_leader_snapshot() {
        let leader_store: Arc<dyn Store> = Arc::new(SqliteStore::open(":memory:").unwrap());
        leader_store
            .append(NewReport {
                patient_id: "P1".into(),
                timestamp: 1,
                inputs: ClinicalInputs {
                    age: 70.0,
                    serum_sodium: 140.0,
                    serum_creatinine: 1.0,
                    ejection_fraction: 40.0,
                    day: 1,
                },
                probability: 0.5,
                tier: WireTier::Amber,
            })
            .await
            .unwrap();

        let leader_membership = Arc::new(Membership::new(
            1,
            "127.0.0.1:9101".parse().unwrap(),
            [],
        ));
        let listener = TransportListener::bind(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(LeaderHandler {
                store: Arc::clone(&leader_store),
                membership: Arc::clone(&leader_membership),
            }),
        )
        .await
        .unwrap();
        let leader_addr = listener.local_addr();

        let joiner_store: Arc<dyn Store> = Arc::new(SqliteStore::open(":memory:").unwrap());
        assert!(joiner_store.is_empty().await.unwrap());

        JoinCoordinator::join_and_load_snapshot(
            &joiner_store,
            2,
            "127.0.0.1:9102".parse().unwrap(),
            leader_addr,
            Duration::from_millis(200),
        )
        .await
        .unwrap();

        let rows = joiner_store.list_by_patient("P1", 0).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(leader_membership.peers().iter().any(|(id, _)| *id == 2));
    }
}
