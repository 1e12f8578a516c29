//! Client configuration surface (§6).

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub preferred_leader_address: Option<SocketAddr>,
    pub fallback_addresses: Vec<SocketAddr>,
    pub rpc_timeout_s: u64,
    pub fallback_timeout_s: u64,
    pub overall_leader_lookup_timeout_s: u64,
    pub retry_delay_s: u64,
    pub client_heartbeat_interval_s: u64,
    pub green_threshold: f64,
    pub amber_threshold: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            preferred_leader_address: None,
            fallback_addresses: vec![],
            rpc_timeout_s: 10,
            fallback_timeout_s: 2,
            overall_leader_lookup_timeout_s: 6,
            retry_delay_s: 2,
            client_heartbeat_interval_s: 5,
            green_threshold: 0.30,
            amber_threshold: 0.60,
        }
    }
}
