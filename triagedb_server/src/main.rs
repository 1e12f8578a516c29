//! Replica server binary: owns one Store, one Transport listener, and the
//! full replication component set (§2.1).

use std::process::ExitCode;

use clap::Parser;

use triagedb::utils::logger_init;
use triagedb::{parsed_config, ReplicaNode, ServerConfig};

/// `server --self_id=N --self_host=H --self_port=P --initial_leader=BOOL
/// [--db_path=...]` (§6). Any flag left unset falls back to `--config_file`
/// (if given) and then to `ServerConfig::default()`.
#[derive(Parser, Debug)]
#[command(name = "triagedb_server")]
struct Args {
    #[arg(long)]
    config_file: Option<String>,

    #[arg(long)]
    self_id: Option<u8>,
    #[arg(long)]
    self_host: Option<String>,
    #[arg(long)]
    self_port: Option<u16>,
    #[arg(long, value_delimiter = ',')]
    initial_replica_addresses: Option<Vec<String>>,
    #[arg(long)]
    db_path: Option<String>,
    #[arg(long)]
    heartbeat_interval_s: Option<u64>,
    #[arg(long)]
    lease_timeout_s: Option<u64>,
    #[arg(long)]
    initial_leader: Option<bool>,
}

impl Args {
    fn apply_onto(self, mut config: ServerConfig) -> ServerConfig {
        if let Some(v) = self.self_id {
            config.self_id = v;
        }
        if let Some(v) = self.self_host {
            config.self_host = v;
        }
        if let Some(v) = self.self_port {
            config.self_port = v;
        }
        if let Some(v) = self.initial_replica_addresses {
            config.initial_replica_addresses = v;
        }
        if let Some(v) = self.db_path {
            config.db_path = v;
        }
        if let Some(v) = self.heartbeat_interval_s {
            config.heartbeat_interval_s = v;
        }
        if let Some(v) = self.lease_timeout_s {
            config.lease_timeout_s = v;
        }
        if let Some(v) = self.initial_leader {
            config.initial_leader = v;
        }
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config_str = match &args.config_file {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(s) => Some(s),
            Err(e) => {
                eprintln!("failed to read config_file {path}: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    let base = match parsed_config!(config_str.as_deref() => ServerConfig) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("invalid config_file: {e}");
            return ExitCode::FAILURE;
        }
    };
    let self_id_for_log = args.self_id.unwrap_or(base.self_id);
    let config = args.apply_onto(base);

    logger_init(format!("r{self_id_for_log}"));

    let node = match ReplicaNode::start(config).await {
        Ok(node) => node,
        Err(e) => {
            log::error!("failed to start replica: {e}");
            return ExitCode::FAILURE;
        }
    };
    log::info!("replica bound to {}", node.local_addr());

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let shutdown_tx = std::sync::Mutex::new(Some(shutdown_tx));
    if let Err(e) = ctrlc::set_handler(move || {
        if let Some(tx) = shutdown_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
    }) {
        log::error!("failed to install signal handler: {e}");
        return ExitCode::FAILURE;
    }

    let _ = shutdown_rx.await;
    log::info!("shutting down");
    ExitCode::SUCCESS
}
