//! The per-replica context (§9's reshape of the original's global mutable
//! state into one injected object) and the binary-facing `ReplicaNode` that
//! wires Store, Transport, Membership, FailureDetector, Elector, Replicator
//! and JoinCoordinator together.

mod config;
mod context;
mod role_loop;

pub use config::ServerConfig;
pub use context::ReplicaContext;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;

use crate::alert_sink::LoggingAlertSink;
use crate::elector::{ElectionOutcome, Elector};
use crate::error::TriageError;
use crate::failure_detector::FailureDetector;
use crate::join_coordinator::JoinCoordinator;
use crate::membership::Membership;
use crate::pf_info;
use crate::replicator::Replicator;
use crate::report::NewReport;
use crate::store::SqliteStore;
use crate::store::Store;
use crate::transport::{
    RequestHandler, RpcRequest, RpcResponse, TransportListener,
};

/// Which half of the primary/backup pair this process currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Follower,
}

/// A running replica: owns its context and its inbound `TransportListener`
/// for as long as the process lives.
pub struct ReplicaNode {
    ctx: Arc<ReplicaContext>,
    _listener: TransportListener,
}

impl ReplicaNode {
    pub async fn start(config: ServerConfig) -> Result<Self, TriageError> {
        let self_address: SocketAddr =
            format!("{}:{}", config.self_host, config.self_port)
                .parse()
                .map_err(|e| {
                    TriageError::MalformedInput(format!("invalid self address: {e}"))
                })?;

        let initial_peers = config.parse_peer_specs()?;
        let membership = Arc::new(Membership::new(
            config.self_id,
            self_address,
            initial_peers,
        ));

        let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&config.db_path)?);
        let alert_sink = Arc::new(LoggingAlertSink);
        let replicator = Replicator::new(Arc::clone(&store), alert_sink);

        let failure_detector = Arc::new(FailureDetector::new(
            Duration::from_secs(config.heartbeat_interval_s),
            Duration::from_secs(config.lease_timeout_s),
        ));

        let initial_role = if config.initial_leader {
            membership.set_self_as_leader();
            Role::Leader
        } else {
            Role::Follower
        };

        let ctx = Arc::new(ReplicaContext {
            membership,
            store,
            replicator,
            failure_detector,
            role: RwLock::new(initial_role),
            heartbeat_rpc_deadline: Duration::from_secs(1),
            election_rpc_deadline: Duration::from_secs(1),
            join_rpc_deadline: Duration::from_secs(2),
        });

        let listener = TransportListener::bind(self_address, ctx.clone() as Arc<dyn RequestHandler>)
            .await?;

        pf_info!(
            "replica {} listening on {} as {:?}",
            config.self_id,
            self_address,
            initial_role
        );

        tokio::spawn(role_loop::drive_role(Arc::clone(&ctx)));

        if !config.initial_leader {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                role_loop::attempt_join_if_empty(ctx).await;
            });
        }

        Ok(ReplicaNode {
            ctx,
            _listener: listener,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.ctx.membership.self_address()
    }

    pub fn role(&self) -> Role {
        *self.ctx.role.read().unwrap()
    }
}

#[async_trait]
impl RequestHandler for ReplicaContext {
    async fn handle(&self, req: RpcRequest) -> RpcResponse {
        match req {
            RpcRequest::SendRiskReport(report) => self.handle_send_risk_report(report).await,
            RpcRequest::ListRiskReports { patient_id, count } => {
                self.handle_list_risk_reports(patient_id, count).await
            }
            RpcRequest::GetLeaderInfo => self.handle_get_leader_info(),
            RpcRequest::Heartbeat {
                leader_id,
                leader_address,
                ts,
            } => self.handle_heartbeat(leader_id, leader_address, ts),
            RpcRequest::Election { candidate_id } => self.handle_election(candidate_id),
            RpcRequest::ReplicateOperation(op) => self.handle_replicate_operation(op).await,
            RpcRequest::JoinCluster {
                new_id,
                new_address,
            } => self.handle_join_cluster(new_id, new_address).await,
        }
    }
}

impl ReplicaContext {
    async fn handle_send_risk_report(&self, report: NewReport) -> RpcResponse {
        if *self.role.read().unwrap() != Role::Leader {
            return RpcResponse::not_leader(self.membership.current_leader_address());
        }
        match self
            .replicator
            .handle_client_write(report, &self.membership, self.heartbeat_rpc_deadline)
            .await
        {
            Ok(outcome) => RpcResponse::Ack {
                success: outcome.success,
                message: "committed".into(),
                alert_sent: Some(outcome.alert_sent),
            },
            Err(e) => RpcResponse::err(e.to_string()),
        }
    }

    async fn handle_list_risk_reports(&self, patient_id: String, count: usize) -> RpcResponse {
        match self.store.list_by_patient(&patient_id, count).await {
            Ok(reports) => RpcResponse::Reports(reports),
            Err(e) => RpcResponse::err(e.to_string()),
        }
    }

    fn handle_get_leader_info(&self) -> RpcResponse {
        RpcResponse::LeaderInfo {
            leader_address: self.membership.current_leader_address(),
            peers: self.membership.peers(),
        }
    }

    fn handle_heartbeat(
        &self,
        leader_id: crate::error::ReplicaId,
        leader_address: SocketAddr,
        _ts: i64,
    ) -> RpcResponse {
        self.membership.set_current_leader_address(leader_address);
        self.failure_detector.record_heartbeat();

        let mut role = self.role.write().unwrap();
        if *role == Role::Leader && leader_id < self.membership.self_id() {
            pf_info!(
                "stepping down: heartbeat from lower-id leader {leader_id}"
            );
            *role = Role::Follower;
        }
        RpcResponse::Ack {
            success: true,
            message: "ok".into(),
            alert_sent: None,
        }
    }

    fn handle_election(&self, _candidate_id: crate::error::ReplicaId) -> RpcResponse {
        RpcResponse::ElectionVote { vote_granted: true }
    }

    async fn handle_replicate_operation(
        &self,
        op: crate::transport::ReplicatedOp,
    ) -> RpcResponse {
        match self
            .replicator
            .handle_replicated_op(op, &self.membership)
            .await
        {
            Ok(()) => RpcResponse::Ack {
                success: true,
                message: "applied".into(),
                alert_sent: None,
            },
            Err(e) => RpcResponse::err(e.to_string()),
        }
    }

    async fn handle_join_cluster(
        &self,
        new_id: crate::error::ReplicaId,
        new_address: SocketAddr,
    ) -> RpcResponse {
        if *self.role.read().unwrap() != Role::Leader {
            return RpcResponse::not_leader(self.membership.current_leader_address());
        }
        match JoinCoordinator::handle_join(
            &self.store,
            &self.membership,
            new_id,
            new_address,
            self.heartbeat_rpc_deadline,
        )
        .await
        {
            Ok(resp) => resp,
            Err(e) => RpcResponse::err(e.to_string()),
        }
    }

    /// Runs the elector against currently-known lower-id peers, installing
    /// leadership on self if nobody answers.
    pub(crate) async fn run_election(&self) -> ElectionOutcome {
        let lower_peers = self.membership.lower_id_peers();
        let outcome =
            Elector::run_election(self.membership.self_id(), &lower_peers, self.election_rpc_deadline)
                .await;
        let mut role = self.role.write().unwrap();
        if outcome == ElectionOutcome::BecameLeader {
            *role = Role::Leader;
            drop(role);
            self.membership.set_self_as_leader();
            self.failure_detector.record_heartbeat();
        } else {
            *role = Role::Follower;
            drop(role);
            // a lower-id peer just answered the election, proving it alive;
            // reset the lease so we don't immediately re-trigger another
            // election before its next real heartbeat arrives.
            self.failure_detector.record_heartbeat();
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn solo_node_self_elects_on_startup_as_leader() {
        let config = ServerConfig {
            self_id: 1,
            self_host: "127.0.0.1".into(),
            self_port: 0,
            initial_replica_addresses: vec![],
            db_path: ":memory:".into(),
            heartbeat_interval_s: 3,
            lease_timeout_s: 10,
            initial_leader: true,
        };
        let node = ReplicaNode::start(config).await.unwrap();
        assert_eq!(node.role(), Role::Leader);
    }
}
