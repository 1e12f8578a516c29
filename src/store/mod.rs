//! The durable, single-writer, append-mostly table of risk reports (§4.1).

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::error::TriageError;
use crate::report::{NewReport, RiskReport};

/// Durable table of risk reports. All operations are serialized by the
/// implementation; callers may call them from any number of concurrent
/// tasks.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persists `report` durably before returning, assigning a
    /// monotonically increasing `local_id`. Idempotent over
    /// `(patient_id, timestamp)`: a duplicate pair returns the existing row's
    /// id without inserting a new one.
    async fn append(&self, report: NewReport) -> Result<i64, TriageError>;

    /// Sets `alert_sent`; a no-op if already set.
    async fn mark_alert_sent(&self, local_id: i64) -> Result<(), TriageError>;

    /// Most recent `limit` reports for `patient_id`, newest first by
    /// timestamp (ties broken by `local_id` descending). `limit == 0` means
    /// "all of them".
    async fn list_by_patient(
        &self,
        patient_id: &str,
        limit: usize,
    ) -> Result<Vec<RiskReport>, TriageError>;

    /// Full table dump, used by the join coordinator.
    async fn snapshot(&self) -> Result<Vec<RiskReport>, TriageError>;

    /// Atomically replaces the table contents with `reports`.
    async fn load_snapshot(
        &self,
        reports: Vec<RiskReport>,
    ) -> Result<(), TriageError>;

    /// Whether the table currently holds zero rows; used by a fresh replica
    /// to decide whether it should attempt to join an existing cluster.
    async fn is_empty(&self) -> Result<bool, TriageError>;
}
