//! The per-replica context object: one instance per process, injected into
//! every request handler and background task. Replaces the original
//! design's module-scope globals (§9).

use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::failure_detector::FailureDetector;
use crate::membership::Membership;
use crate::replicator::Replicator;
use crate::server::Role;
use crate::store::Store;

pub struct ReplicaContext {
    pub(crate) membership: Arc<Membership>,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) replicator: Replicator,
    pub(crate) failure_detector: Arc<FailureDetector>,
    pub(crate) role: RwLock<Role>,
    pub(crate) heartbeat_rpc_deadline: Duration,
    pub(crate) election_rpc_deadline: Duration,
    pub(crate) join_rpc_deadline: Duration,
}
