//! Server configuration surface (§6), layered: compiled-in defaults, an
//! optional TOML file, `--name=value` CLI flags (the latter two assembled
//! by the `triagedb_server` binary; this struct only knows how to default
//! and validate itself).

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::error::{ReplicaId, TriageError};
use crate::pf_error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub self_id: ReplicaId,
    pub self_host: String,
    pub self_port: u16,
    /// Each entry is `"id@host:port"`, e.g. `"2@127.0.0.1:9002"`.
    pub initial_replica_addresses: Vec<String>,
    pub db_path: String,
    pub heartbeat_interval_s: u64,
    pub lease_timeout_s: u64,
    pub initial_leader: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            self_id: 1,
            self_host: "127.0.0.1".into(),
            self_port: 9001,
            initial_replica_addresses: vec![],
            db_path: "triagedb.sqlite3".into(),
            heartbeat_interval_s: 3,
            lease_timeout_s: 10,
            initial_leader: true,
        }
    }
}

impl ServerConfig {
    pub fn parse_peer_specs(&self) -> Result<Vec<(ReplicaId, SocketAddr)>, TriageError> {
        self.initial_replica_addresses
            .iter()
            .map(|spec| parse_peer_spec(spec))
            .collect()
    }
}

fn parse_peer_spec(spec: &str) -> Result<(ReplicaId, SocketAddr), TriageError> {
    let (id_str, addr_str) = spec.split_once('@').ok_or_else(|| {
        pf_error!("malformed peer spec '{spec}', expected 'id@host:port'");
        TriageError::MalformedInput(format!(
            "peer spec '{spec}' must be of the form 'id@host:port'"
        ))
    })?;
    let id: ReplicaId = id_str.parse().map_err(|e| {
        pf_error!("invalid replica id in '{spec}': {e}");
        TriageError::MalformedInput(format!("invalid replica id in '{spec}': {e}"))
    })?;
    let addr: SocketAddr = addr_str.parse().map_err(|e| {
        pf_error!("invalid address in '{spec}': {e}");
        TriageError::MalformedInput(format!("invalid address in '{spec}': {e}"))
    })?;
    Ok((id, addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_a_standalone_leader() {
        let config = ServerConfig::default();
        assert!(config.initial_leader);
        assert!(config.initial_replica_addresses.is_empty());
    }

    #[test]
    fn parse_peer_specs_parses_id_at_addr() {
        let config = ServerConfig {
            initial_replica_addresses: vec!["2@127.0.0.1:9002".into(), "3@127.0.0.1:9003".into()],
            ..ServerConfig::default()
        };
        let peers = config.parse_peer_specs().unwrap();
        assert_eq!(
            peers,
            vec![
                (2, "127.0.0.1:9002".parse().unwrap()),
                (3, "127.0.0.1:9003".parse().unwrap()),
            ]
        );
    }

    #[test]
    fn parse_peer_specs_rejects_malformed_entry() {
        let config = ServerConfig {
            initial_replica_addresses: vec!["not-a-spec".into()],
            ..ServerConfig::default()
        };
        assert!(config.parse_peer_specs().is_err());
    }
}
