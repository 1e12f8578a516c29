//! Background tasks driving a replica between Follower and Leader (§5:
//! "the FailureDetector runs as a background periodic task").

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use std::net::SocketAddr;

use crate::join_coordinator::JoinCoordinator;
use crate::pf_info;
use crate::server::{ReplicaContext, Role};
use crate::transport::{RpcRequest, RpcResponse, TransportClient};

/// Forever alternates between watching the lease as a follower and, once a
/// lease lapses, contesting (or winning) an election; and emitting
/// heartbeats as leader until stepping down.
pub(crate) async fn drive_role(ctx: Arc<ReplicaContext>) {
    loop {
        let role = *ctx.role.read().unwrap();
        match role {
            Role::Follower => {
                ctx.failure_detector.watch_as_follower().await;
                pf_info!("lease expired, starting an election");
                ctx.run_election().await;
            }
            Role::Leader => {
                run_heartbeats_until_stepped_down(&ctx).await;
            }
        }
    }
}

async fn run_heartbeats_until_stepped_down(ctx: &Arc<ReplicaContext>) {
    let mut interval = tokio::time::interval(ctx.failure_detector.heartbeat_interval());
    loop {
        interval.tick().await;
        if *ctx.role.read().unwrap() != Role::Leader {
            return;
        }
        send_heartbeats(ctx).await;
    }
}

async fn send_heartbeats(ctx: &Arc<ReplicaContext>) {
    let self_id = ctx.membership.self_id();
    let self_address = ctx.membership.self_address();
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    let deadline = ctx.heartbeat_rpc_deadline;

    for (peer_id, addr) in ctx.membership.other_peers() {
        tokio::spawn(async move {
            if let Err(e) = TransportClient::call(
                addr,
                RpcRequest::Heartbeat {
                    leader_id: self_id,
                    leader_address: self_address,
                    ts,
                },
                deadline,
            )
            .await
            {
                pf_info!("heartbeat to {peer_id} failed: {e}");
            }
        });
    }
}

/// §4.7: once a fresh follower has learned who the leader is, if its Store
/// is still empty it asks for a snapshot. A brand-new replica is typically
/// unknown to the existing members (so it will never be pushed a
/// heartbeat); it discovers the leader the same way a client does, by
/// probing its own configured peers with `GetLeaderInfo`.
pub(crate) async fn attempt_join_if_empty(ctx: Arc<ReplicaContext>) {
    loop {
        if *ctx.role.read().unwrap() == Role::Leader {
            return;
        }
        if let Some(leader_address) = ctx.membership.current_leader_address() {
            try_join(&ctx, leader_address).await;
            return;
        }
        if let Some(leader_address) = probe_peers_for_leader(&ctx).await {
            ctx.membership.set_current_leader_address(leader_address);
            try_join(&ctx, leader_address).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

async fn probe_peers_for_leader(ctx: &Arc<ReplicaContext>) -> Option<SocketAddr> {
    for (_, addr) in ctx.membership.other_peers() {
        if let Ok(RpcResponse::LeaderInfo {
            leader_address: Some(addr),
            ..
        }) = TransportClient::call(addr, RpcRequest::GetLeaderInfo, ctx.election_rpc_deadline).await
        {
            return Some(addr);
        }
    }
    None
}

async fn try_join(ctx: &Arc<ReplicaContext>, leader_address: SocketAddr) {
    match ctx.store.is_empty().await {
        Ok(true) => {
            let _ = JoinCoordinator::join_and_load_snapshot(
                &ctx.store,
                ctx.membership.self_id(),
                ctx.membership.self_address(),
                leader_address,
                ctx.join_rpc_deadline,
            )
            .await;
        }
        Ok(false) => {}
        Err(e) => pf_info!("failed to check store emptiness: {e}"),
    }
}
