//! Lowest-id election (§4.5). The protocol's actual decision is "who is
//! still alive with the smallest id," decided by contact rather than vote
//! counting: `Election` receivers always grant.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::error::ReplicaId;
use crate::pf_debug;
use crate::transport::{RpcRequest, TransportClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// No lower-id peer answered; self becomes leader.
    BecameLeader,
    /// A lower-id peer is alive; self remains (or returns to) follower.
    SteppedDown,
}

pub struct Elector;

impl Elector {
    /// Contacts every peer in `lower_peers` with `Election(self_id)` in
    /// parallel, each bounded by `per_call_deadline`. If any responds at
    /// all, self abandons candidacy; otherwise self declares leadership.
    pub async fn run_election(
        self_id: ReplicaId,
        lower_peers: &[(ReplicaId, SocketAddr)],
        per_call_deadline: Duration,
    ) -> ElectionOutcome {
        if lower_peers.is_empty() {
            pf_debug!("no lower-id peers to contact, becoming leader");
            return ElectionOutcome::BecameLeader;
        }

        let mut contacts = JoinSet::new();
        for &(peer_id, addr) in lower_peers {
            contacts.spawn(async move {
                TransportClient::call(
                    addr,
                    RpcRequest::Election {
                        candidate_id: self_id,
                    },
                    per_call_deadline,
                )
                .await
                .map(|_| peer_id)
            });
        }

        while let Some(joined) = contacts.join_next().await {
            if let Ok(Ok(peer_id)) = joined {
                pf_debug!("lower-id peer {peer_id} is alive, stepping down");
                return ElectionOutcome::SteppedDown;
            }
        }

        pf_debug!("no lower-id peer answered, becoming leader");
        ElectionOutcome::BecameLeader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{RequestHandler, RpcResponse, TransportListener};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct AlwaysGrants;

    #[async_trait]
    impl RequestHandler for AlwaysGrants {
        async fn handle(&self, _req: RpcRequest) -> RpcResponse {
            RpcResponse::ElectionVote { vote_granted: true }
        }
    }

    #[tokio::test]
    async fn no_lower_peers_becomes_leader() {
        let outcome = Elector::run_election(3, &[], Duration::from_millis(200)).await;
        assert_eq!(outcome, ElectionOutcome::BecameLeader);
    }

    #[tokio::test]
    async fn alive_lower_peer_causes_step_down() {
        let listener = TransportListener::bind(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(AlwaysGrants),
        )
        .await
        .unwrap();
        let addr = listener.local_addr();

        let outcome =
            Elector::run_election(3, &[(1, addr)], Duration::from_millis(500)).await;
        assert_eq!(outcome, ElectionOutcome::SteppedDown);
    }

    #[tokio::test]
    async fn unreachable_lower_peer_becomes_leader() {
        // nothing listens on this port
        let dead: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let outcome =
            Elector::run_election(3, &[(1, dead)], Duration::from_millis(200)).await;
        assert_eq!(outcome, ElectionOutcome::BecameLeader);
    }
}
