//! Typed request/response RPC endpoint (§4.2). One schema, shared by client
//! and internal (heartbeat/election/replication/join) traffic; every call
//! is a single connect-write-read-drop round trip (§10.4: no long-lived
//! multiplexed connection to reason about).

mod listener;

pub use listener::TransportListener;

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time;

use crate::error::{ReplicaId, TriageError};
use crate::report::{NewReport, RiskReport};
use crate::utils::{safe_tcp_read, safe_tcp_write};

/// One replicated operation, carried inside `ReplicateOperation` (§9:
/// the `operation_type + JSON data` envelope reshaped as a tagged variant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReplicatedOp {
    RiskReport(NewReport),
    MembershipUpdate {
        peers: Vec<(ReplicaId, SocketAddr)>,
        leader_address: SocketAddr,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RpcRequest {
    SendRiskReport(NewReport),
    ListRiskReports { patient_id: String, count: usize },
    GetLeaderInfo,
    Heartbeat {
        leader_id: ReplicaId,
        leader_address: SocketAddr,
        ts: i64,
    },
    Election {
        candidate_id: ReplicaId,
    },
    ReplicateOperation(ReplicatedOp),
    JoinCluster {
        new_id: ReplicaId,
        new_address: SocketAddr,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RpcResponse {
    Ack {
        success: bool,
        message: String,
        alert_sent: Option<bool>,
    },
    Reports(Vec<RiskReport>),
    LeaderInfo {
        leader_address: Option<SocketAddr>,
        peers: Vec<(ReplicaId, SocketAddr)>,
    },
    ElectionVote {
        vote_granted: bool,
    },
    JoinResult {
        success: bool,
        message: String,
        snapshot: Vec<RiskReport>,
    },
}

impl RpcResponse {
    pub fn not_leader(leader_address: Option<SocketAddr>) -> Self {
        RpcResponse::Ack {
            success: false,
            message: format!(
                "not leader (known leader: {})",
                leader_address
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "unknown".into())
            ),
            alert_sent: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        RpcResponse::Ack {
            success: false,
            message: message.into(),
            alert_sent: None,
        }
    }
}

/// Implemented by whatever owns request processing on a replica (the
/// per-replica context, §9). The transport layer dispatches every inbound
/// connection onto its own task and awaits this without holding any lock.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, req: RpcRequest) -> RpcResponse;
}

/// Stateless RPC client: one TCP connection per call.
pub struct TransportClient;

impl TransportClient {
    /// Issues `req` against `addr`, bounding the whole round trip
    /// (connect + write + read) by `deadline`.
    pub async fn call(
        addr: SocketAddr,
        req: RpcRequest,
        deadline: Duration,
    ) -> Result<RpcResponse, TriageError> {
        time::timeout(deadline, Self::call_inner(addr, req))
            .await
            .map_err(|_| TriageError::Transport(format!("deadline exceeded calling {addr}")))?
    }

    async fn call_inner(addr: SocketAddr, req: RpcRequest) -> Result<RpcResponse, TriageError> {
        let mut stream = TcpStream::connect(addr).await?;
        safe_tcp_write(&mut stream, &req).await?;
        let resp: RpcResponse = safe_tcp_read(&mut stream).await?;
        Ok(resp)
    }
}
