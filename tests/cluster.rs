//! Multi-replica behavioral tests (§8's end-to-end scenarios). Each test
//! spins up real `ReplicaNode` tasks bound to fixed localhost ports backed
//! by temporary SQLite files, and drives them through the same
//! `ClientRuntime`/`TransportClient` a real deployment would use.

use std::net::SocketAddr;
use std::time::Duration;

use tempfile::NamedTempFile;

use triagedb::transport::{RpcRequest, RpcResponse, TransportClient};
use triagedb::{
    ClientConfig, ClientRuntime, ClinicalInputs, NewReport, ReplicaNode, ServerConfig, WireTier,
};

fn db_path() -> String {
    NamedTempFile::new()
        .unwrap()
        .into_temp_path()
        .keep()
        .unwrap()
        .to_string_lossy()
        .into_owned()
}

fn peer_spec(id: u8, port: u16) -> String {
    format!("{id}@127.0.0.1:{port}")
}

async fn start_replica(
    self_id: u8,
    port: u16,
    peers: Vec<String>,
    initial_leader: bool,
) -> ReplicaNode {
    let config = ServerConfig {
        self_id,
        self_host: "127.0.0.1".into(),
        self_port: port,
        initial_replica_addresses: peers,
        db_path: db_path(),
        heartbeat_interval_s: 1,
        lease_timeout_s: 3,
        initial_leader,
    };
    ReplicaNode::start(config).await.unwrap()
}

async fn list_via_rpc(addr: SocketAddr, patient_id: &str) -> Vec<triagedb::RiskReport> {
    match TransportClient::call(
        addr,
        RpcRequest::ListRiskReports {
            patient_id: patient_id.into(),
            count: 0,
        },
        Duration::from_secs(1),
    )
    .await
    .unwrap()
    {
        RpcResponse::Reports(reports) => reports,
        other => panic!("unexpected response: {other:?}"),
    }
}

fn report(patient_id: &str, timestamp: i64, probability: f64, tier: WireTier) -> NewReport {
    NewReport {
        patient_id: patient_id.into(),
        timestamp,
        inputs: ClinicalInputs {
            age: 68.0,
            serum_sodium: 137.0,
            serum_creatinine: 1.3,
            ejection_fraction: 32.0,
            day: 5,
        },
        probability,
        tier,
    }
}

#[tokio::test]
async fn single_leader_baseline() {
    let node = start_replica(1, 19101, vec![], true).await;
    let addr = node.local_addr();

    let client = ClientRuntime::new(ClientConfig {
        preferred_leader_address: Some(addr),
        ..ClientConfig::default()
    });

    let outcome = client
        .send_report(report("P1", 1000, 0.70, WireTier::Red))
        .await
        .unwrap();
    assert!(outcome.alert_sent);

    let rows = client.list_reports("P1", 10).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn three_node_replication() {
    let addrs = [19111u16, 19112, 19113];
    let specs: Vec<String> = addrs
        .iter()
        .enumerate()
        .map(|(i, p)| peer_spec(i as u8 + 1, *p))
        .collect();

    let node1 = start_replica(1, addrs[0], specs.clone(), true).await;
    let node2 = start_replica(2, addrs[1], specs.clone(), false).await;
    let node3 = start_replica(3, addrs[2], specs.clone(), false).await;

    let client = ClientRuntime::new(ClientConfig {
        preferred_leader_address: Some(node1.local_addr()),
        ..ClientConfig::default()
    });
    let outcome = client
        .send_report(report("P2", 2000, 0.45, WireTier::Amber))
        .await
        .unwrap();
    assert!(!outcome.alert_sent);

    tokio::time::sleep(Duration::from_millis(800)).await;

    for addr in [node1.local_addr(), node2.local_addr(), node3.local_addr()] {
        let rows = list_via_rpc(addr, "P2").await;
        assert_eq!(rows.len(), 1, "replica at {addr} missing the row");
        assert_eq!(rows[0].timestamp, 2000);
    }
}

#[tokio::test]
async fn idempotent_retry() {
    let node = start_replica(1, 19121, vec![], true).await;
    let addr = node.local_addr();
    let client = ClientRuntime::new(ClientConfig {
        preferred_leader_address: Some(addr),
        ..ClientConfig::default()
    });

    for _ in 0..2 {
        let outcome = client
            .send_report(report("P3", 3000, 0.70, WireTier::Red))
            .await
            .unwrap();
        assert!(outcome.alert_sent);
    }

    let rows = client.list_reports("P3", 10).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].alert_sent);
}

#[tokio::test]
async fn green_rejection() {
    let node = start_replica(1, 19131, vec![], true).await;
    let addr = node.local_addr();
    let client = ClientRuntime::new(ClientConfig {
        preferred_leader_address: Some(addr),
        ..ClientConfig::default()
    });

    let err = client
        .send_report(report("P6", 6000, 0.10, WireTier::Green))
        .await
        .unwrap_err();
    assert!(err.to_string().to_lowercase().contains("tier"));

    let rows = client.list_reports("P6", 10).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn joiner_state_transfer() {
    let leader_port = 19141u16;
    let leader_spec = vec![peer_spec(1, leader_port)];

    let node1 = start_replica(1, leader_port, vec![], true).await;
    let addr1 = node1.local_addr();

    let client = ClientRuntime::new(ClientConfig {
        preferred_leader_address: Some(addr1),
        ..ClientConfig::default()
    });
    for i in 0..5 {
        client
            .send_report(report("P5", 5000 + i, 0.5, WireTier::Amber))
            .await
            .unwrap();
    }

    let node3 = start_replica(3, 19143, leader_spec, false).await;
    let addr3 = node3.local_addr();

    let mut joined = false;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let rows = list_via_rpc(addr3, "P5").await;
        if rows.len() == 5 {
            joined = true;
            break;
        }
    }
    assert!(joined, "joiner never caught up with leader's snapshot");
}

#[tokio::test(start_paused = true)]
async fn leader_failover_elects_lowest_surviving_id() {
    let addrs = [19151u16, 19152, 19153];
    let specs: Vec<String> = addrs
        .iter()
        .enumerate()
        .map(|(i, p)| peer_spec(i as u8 + 1, *p))
        .collect();

    let node1 = start_replica(1, addrs[0], specs.clone(), true).await;
    let node2 = start_replica(2, addrs[1], specs.clone(), false).await;
    let node3 = start_replica(3, addrs[2], specs.clone(), false).await;

    tokio::time::advance(Duration::from_millis(1500)).await;
    assert_eq!(node1.role(), triagedb::server::Role::Leader);

    drop(node1);

    tokio::time::advance(Duration::from_secs(4)).await;
    tokio::time::advance(Duration::from_secs(2)).await;

    assert_eq!(node2.role(), triagedb::server::Role::Leader);
    assert_eq!(node3.role(), triagedb::server::Role::Follower);
}
