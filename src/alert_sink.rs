//! `AlertSink` — the seam to whatever stands in for the console-driven
//! alert UI (§4.10, out of scope). The leader calls this synchronously on
//! its own replication path, once per committed RED write.

use async_trait::async_trait;

use crate::error::TriageError;
use crate::pf_warn;

#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Notified with the store's `local_id` of a just-committed RED
    /// report. `Err` means the alert did not go out; the caller does not
    /// fail the client's write for it, only skips `mark_alert_sent`.
    async fn notify(&self, local_id: i64) -> Result<(), TriageError>;
}

/// Default stand-in: a structured `warn`-level log line. Narrow and
/// observable, not a reimplementation of the real console.
pub struct LoggingAlertSink;

#[async_trait]
impl AlertSink for LoggingAlertSink {
    async fn notify(&self, local_id: i64) -> Result<(), TriageError> {
        pf_warn!("RED-tier report {local_id} committed, alerting");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn logging_sink_always_succeeds() {
        let sink = LoggingAlertSink;
        assert!(sink.notify(42).await.is_ok());
    }
}
