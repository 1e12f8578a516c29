//! CLI wrapper around the client runtime library (§2.1, §4.8), for manual
//! operation and smoke testing: a one-shot `send`, a `list` query, and a
//! `run` mode that drives the shipped synthetic [`Reporter`] continuously
//! alongside the runtime's own background leader-refresh/retry-flush loop,
//! mirroring how this codebase's other benchmarking client drives an
//! open-loop request generator.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use triagedb::utils::logger_init;
use triagedb::{
    classify_tier, parsed_config, ClientConfig, ClientRuntime, ClinicalInputs, NewReport,
    Reporter, SyntheticReporter,
};

#[derive(Parser, Debug)]
#[command(name = "triagedb_client")]
struct Args {
    #[arg(long)]
    config_file: Option<String>,

    #[arg(long)]
    preferred_leader_address: Option<String>,
    #[arg(long, value_delimiter = ',')]
    fallback_addresses: Option<Vec<String>>,
    #[arg(long)]
    rpc_timeout_s: Option<u64>,
    #[arg(long)]
    overall_leader_lookup_timeout_s: Option<u64>,
    #[arg(long)]
    green_threshold: Option<f64>,
    #[arg(long)]
    amber_threshold: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submits a single, fully-specified report.
    Send {
        patient_id: String,
        timestamp: i64,
        age: f64,
        serum_sodium: f64,
        serum_creatinine: f64,
        ejection_fraction: f64,
        day: i64,
        probability: f64,
    },
    /// Queries the most recent reports for a patient.
    List {
        patient_id: String,
        #[arg(default_value_t = 10)]
        count: usize,
    },
    /// Runs the synthetic reporter continuously against a pool of patient
    /// ids for `length_s` seconds, at roughly `freq_hz` reports/second.
    Run {
        #[arg(long, value_delimiter = ',', default_value = "P1,P2,P3")]
        patient_ids: Vec<String>,
        #[arg(long, default_value_t = 10)]
        length_s: u64,
        #[arg(long, default_value_t = 2)]
        freq_hz: u64,
    },
}

impl Args {
    fn apply_onto(&self, mut config: ClientConfig) -> Result<ClientConfig, String> {
        if let Some(addr) = &self.preferred_leader_address {
            config.preferred_leader_address =
                Some(addr.parse().map_err(|e| format!("invalid address: {e}"))?);
        }
        if let Some(addrs) = &self.fallback_addresses {
            config.fallback_addresses = addrs
                .iter()
                .map(|a| a.parse().map_err(|e| format!("invalid address: {e}")))
                .collect::<Result<_, _>>()?;
        }
        if let Some(v) = self.rpc_timeout_s {
            config.rpc_timeout_s = v;
        }
        if let Some(v) = self.overall_leader_lookup_timeout_s {
            config.overall_leader_lookup_timeout_s = v;
        }
        if let Some(v) = self.green_threshold {
            config.green_threshold = v;
        }
        if let Some(v) = self.amber_threshold {
            config.amber_threshold = v;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    logger_init("c");
    let args = Args::parse();

    let config_str = match &args.config_file {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(s) => Some(s),
            Err(e) => {
                eprintln!("failed to read config_file {path}: {e}");
                return std::process::ExitCode::FAILURE;
            }
        },
        None => None,
    };
    let base = match parsed_config!(config_str.as_deref() => ClientConfig) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("invalid config_file: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };
    let config = match args.apply_onto(base) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let client = Arc::new(ClientRuntime::new(config));

    let result = match args.command {
        Command::Send {
            patient_id,
            timestamp,
            age,
            serum_sodium,
            serum_creatinine,
            ejection_fraction,
            day,
            probability,
        } => {
            let report = NewReport {
                patient_id,
                timestamp,
                inputs: ClinicalInputs {
                    age,
                    serum_sodium,
                    serum_creatinine,
                    ejection_fraction,
                    day,
                },
                probability,
                tier: classify_tier(probability, 0.30, 0.60),
            };
            client.send_report(report).await.map(|o| {
                println!("committed, alert_sent={}", o.alert_sent);
            })
        }
        Command::List { patient_id, count } => client.list_reports(&patient_id, count).await.map(|reports| {
            for r in reports {
                println!(
                    "{} id={} ts={} p={:.2} tier={} alert_sent={}",
                    r.patient_id,
                    r.id,
                    r.timestamp,
                    r.probability,
                    r.tier.as_str(),
                    r.alert_sent
                );
            }
        }),
        Command::Run {
            patient_ids,
            length_s,
            freq_hz,
        } => {
            let background = tokio::spawn({
                let client = Arc::clone(&client);
                async move { client.run_background_loop().await }
            });
            run_synthetic(&client, patient_ids, length_s, freq_hz.max(1)).await;
            background.abort();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn run_synthetic(
    client: &ClientRuntime,
    patient_ids: Vec<String>,
    length_s: u64,
    freq_hz: u64,
) {
    let mut reporter = SyntheticReporter::new(patient_ids, 0);
    let mut ticker = tokio::time::interval(Duration::from_millis(1000 / freq_hz));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(length_s);

    while tokio::time::Instant::now() < deadline {
        ticker.tick().await;
        let report = reporter.next_report(0.30, 0.60);
        if report.tier == triagedb::WireTier::Green {
            continue;
        }
        match client.send_report(report).await {
            Ok(outcome) => {
                if outcome.alert_sent {
                    log::warn!("alert sent");
                }
            }
            Err(e) => log::info!("send failed, queued for retry: {e}"),
        }
    }
    client.flush_retry_queue().await;
}
