//! `Store` backed by a single `rusqlite::Connection` owned by a dedicated OS
//! thread, driven by channel commands. This gives true single-writer
//! serialization (one connection, one thread) without blocking the async
//! executor on synchronous SQLite calls.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::{mpsc, oneshot};

use crate::error::TriageError;
use crate::logged_err;
use crate::pf_error;
use crate::report::{ClinicalInputs, NewReport, RiskReport, Tier};
use crate::store::Store;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS risk_reports (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id         TEXT NOT NULL,
    timestamp          INTEGER NOT NULL,
    age                REAL NOT NULL,
    serum_sodium       REAL NOT NULL,
    serum_creatinine   REAL NOT NULL,
    ejection_fraction  REAL NOT NULL,
    day                INTEGER NOT NULL,
    probability        REAL NOT NULL,
    tier               TEXT NOT NULL,
    alert_sent         INTEGER NOT NULL DEFAULT 0,
    UNIQUE(patient_id, timestamp)
);
";

enum Command {
    Append {
        report: NewReport,
        reply: oneshot::Sender<Result<i64, TriageError>>,
    },
    MarkAlertSent {
        local_id: i64,
        reply: oneshot::Sender<Result<(), TriageError>>,
    },
    ListByPatient {
        patient_id: String,
        limit: usize,
        reply: oneshot::Sender<Result<Vec<RiskReport>, TriageError>>,
    },
    Snapshot {
        reply: oneshot::Sender<Result<Vec<RiskReport>, TriageError>>,
    },
    LoadSnapshot {
        reports: Vec<RiskReport>,
        reply: oneshot::Sender<Result<(), TriageError>>,
    },
    IsEmpty {
        reply: oneshot::Sender<Result<bool, TriageError>>,
    },
}

/// SQLite-backed `Store`. Cheap to clone; clones share the same background
/// writer thread via the channel.
#[derive(Clone)]
pub struct SqliteStore {
    tx: mpsc::UnboundedSender<Command>,
}

impl SqliteStore {
    /// Opens (creating if absent) the database at `path` and spawns its
    /// writer thread. `path` may be `":memory:"` for tests.
    pub fn open(path: &str) -> Result<Self, TriageError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("sqlite-store-writer".into())
            .spawn(move || Self::writer_loop(conn, rx))
            .map_err(|e| {
                pf_error!("failed to spawn sqlite writer thread: {e}");
                TriageError::Storage(format!("spawn writer thread: {e}"))
            })?;

        Ok(SqliteStore { tx })
    }

    fn writer_loop(conn: Connection, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(cmd) = rx.blocking_recv() {
            match cmd {
                Command::Append { report, reply } => {
                    let _ = reply.send(Self::do_append(&conn, report));
                }
                Command::MarkAlertSent { local_id, reply } => {
                    let _ = reply.send(Self::do_mark_alert_sent(&conn, local_id));
                }
                Command::ListByPatient {
                    patient_id,
                    limit,
                    reply,
                } => {
                    let _ = reply.send(Self::do_list_by_patient(&conn, &patient_id, limit));
                }
                Command::Snapshot { reply } => {
                    let _ = reply.send(Self::do_snapshot(&conn));
                }
                Command::LoadSnapshot { reports, reply } => {
                    let _ = reply.send(Self::do_load_snapshot(&conn, reports));
                }
                Command::IsEmpty { reply } => {
                    let _ = reply.send(Self::do_is_empty(&conn));
                }
            }
        }
    }

    fn do_append(conn: &Connection, report: NewReport) -> Result<i64, TriageError> {
        let tier = report.tier.into_tier().ok_or_else(|| {
            pf_error!("rejected append of GREEN report for {}", report.patient_id);
            TriageError::InvalidTier("GREEN reports are never stored".into())
        })?;

        if let Some(existing) = conn
            .query_row(
                "SELECT id FROM risk_reports WHERE patient_id = ?1 AND timestamp = ?2",
                params![report.patient_id, report.timestamp],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
        {
            return Ok(existing);
        }

        conn.execute(
            "INSERT INTO risk_reports
             (patient_id, timestamp, age, serum_sodium, serum_creatinine,
              ejection_fraction, day, probability, tier, alert_sent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)",
            params![
                report.patient_id,
                report.timestamp,
                report.inputs.age,
                report.inputs.serum_sodium,
                report.inputs.serum_creatinine,
                report.inputs.ejection_fraction,
                report.inputs.day,
                report.probability,
                tier.as_str(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn do_mark_alert_sent(conn: &Connection, local_id: i64) -> Result<(), TriageError> {
        conn.execute(
            "UPDATE risk_reports SET alert_sent = 1 WHERE id = ?1",
            params![local_id],
        )?;
        Ok(())
    }

    fn do_list_by_patient(
        conn: &Connection,
        patient_id: &str,
        limit: usize,
    ) -> Result<Vec<RiskReport>, TriageError> {
        let mut stmt = if limit == 0 {
            conn.prepare(
                "SELECT id, patient_id, timestamp, age, serum_sodium,
                        serum_creatinine, ejection_fraction, day,
                        probability, tier, alert_sent
                 FROM risk_reports WHERE patient_id = ?1
                 ORDER BY timestamp DESC, id DESC",
            )?
        } else {
            conn.prepare(
                "SELECT id, patient_id, timestamp, age, serum_sodium,
                        serum_creatinine, ejection_fraction, day,
                        probability, tier, alert_sent
                 FROM risk_reports WHERE patient_id = ?1
                 ORDER BY timestamp DESC, id DESC LIMIT ?2",
            )?
        };

        let rows = if limit == 0 {
            stmt.query_map(params![patient_id], row_to_report)?
        } else {
            stmt.query_map(params![patient_id, limit as i64], row_to_report)?
        };

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn do_snapshot(conn: &Connection) -> Result<Vec<RiskReport>, TriageError> {
        let mut stmt = conn.prepare(
            "SELECT id, patient_id, timestamp, age, serum_sodium,
                    serum_creatinine, ejection_fraction, day,
                    probability, tier, alert_sent
             FROM risk_reports ORDER BY id ASC",
        )?;
        let mut out = Vec::new();
        for row in stmt.query_map([], row_to_report)? {
            out.push(row?);
        }
        Ok(out)
    }

    fn do_load_snapshot(conn: &Connection, reports: Vec<RiskReport>) -> Result<(), TriageError> {
        conn.execute("DELETE FROM risk_reports", [])?;
        for r in reports {
            conn.execute(
                "INSERT INTO risk_reports
                 (id, patient_id, timestamp, age, serum_sodium, serum_creatinine,
                  ejection_fraction, day, probability, tier, alert_sent)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    r.id,
                    r.patient_id,
                    r.timestamp,
                    r.inputs.age,
                    r.inputs.serum_sodium,
                    r.inputs.serum_creatinine,
                    r.inputs.ejection_fraction,
                    r.inputs.day,
                    r.probability,
                    r.tier.as_str(),
                    r.alert_sent as i64,
                ],
            )?;
        }
        Ok(())
    }

    fn do_is_empty(conn: &Connection) -> Result<bool, TriageError> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM risk_reports", [], |row| row.get(0))?;
        Ok(count == 0)
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, TriageError>>) -> Command,
    ) -> Result<T, TriageError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(build(reply_tx)).is_err() {
            return logged_err!("sqlite-store"; "writer thread gone");
        }
        match reply_rx.await {
            Ok(result) => result,
            Err(_) => logged_err!("sqlite-store"; "writer thread dropped reply"),
        }
    }
}

fn row_to_report(row: &rusqlite::Row) -> rusqlite::Result<RiskReport> {
    let tier_str: String = row.get(9)?;
    let tier = Tier::parse(&tier_str).unwrap_or(Tier::Amber);
    Ok(RiskReport {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        timestamp: row.get(2)?,
        inputs: ClinicalInputs {
            age: row.get(3)?,
            serum_sodium: row.get(4)?,
            serum_creatinine: row.get(5)?,
            ejection_fraction: row.get(6)?,
            day: row.get(7)?,
        },
        probability: row.get(8)?,
        tier,
        alert_sent: row.get::<_, i64>(10)? != 0,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn append(&self, report: NewReport) -> Result<i64, TriageError> {
        self.call(|reply| Command::Append { report, reply }).await
    }

    async fn mark_alert_sent(&self, local_id: i64) -> Result<(), TriageError> {
        self.call(|reply| Command::MarkAlertSent { local_id, reply })
            .await
    }

    async fn list_by_patient(
        &self,
        patient_id: &str,
        limit: usize,
    ) -> Result<Vec<RiskReport>, TriageError> {
        let patient_id = patient_id.to_string();
        self.call(|reply| Command::ListByPatient {
            patient_id,
            limit,
            reply,
        })
        .await
    }

    async fn snapshot(&self) -> Result<Vec<RiskReport>, TriageError> {
        self.call(|reply| Command::Snapshot { reply }).await
    }

    async fn load_snapshot(&self, reports: Vec<RiskReport>) -> Result<(), TriageError> {
        self.call(|reply| Command::LoadSnapshot { reports, reply })
            .await
    }

    async fn is_empty(&self) -> Result<bool, TriageError> {
        self.call(|reply| Command::IsEmpty { reply }).await
    }
}
