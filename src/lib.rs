//! Public interface to the triagedb core library, linked by both the
//! replica server executable and the client runtime.

pub mod alert_sink;
pub mod client;
pub mod elector;
pub mod error;
pub mod failure_detector;
pub mod join_coordinator;
pub mod membership;
pub mod replicator;
pub mod report;
pub mod reporter;
pub mod server;
pub mod store;
pub mod transport;
pub mod utils;

pub use client::{ClientConfig, ClientRuntime};
pub use error::{ReplicaId, TriageError};
pub use report::{ClinicalInputs, NewReport, RiskReport, Tier, WireTier};
pub use reporter::{classify_tier, Reporter, SyntheticReporter};
pub use server::{ReplicaNode, ServerConfig};
