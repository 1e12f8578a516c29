//! Crate-wide error type.

use std::fmt;
use std::net::SocketAddr;

/// Small positive integer uniquely identifying a replica; also its election
/// rank (lower wins).
pub type ReplicaId = u8;

/// Error kinds produced by this crate. Network errors are recovered locally
/// by their callers (retried or skipped); storage errors are surfaced to the
/// client; there is no variant for a programming-invariant violation because
/// those abort the process via `panic!`/`debug_assert!` instead.
#[derive(Debug, Clone, PartialEq)]
pub enum TriageError {
    /// Durable append (or other storage op) failed.
    Storage(String),
    /// Peer unreachable or the call's deadline expired.
    Transport(String),
    /// A client write landed on a non-leader replica.
    NotLeader { leader_address: Option<SocketAddr> },
    /// Report carried `tier == GREEN` or an otherwise-unacceptable tier.
    InvalidTier(String),
    /// Required field missing or malformed in a request.
    MalformedInput(String),
    /// Joiner's state-transfer attempt failed; caller should back off and
    /// retry.
    SnapshotFailed(String),
    /// Anything else recoverable only by logging and bailing.
    Internal(String),
}

impl fmt::Display for TriageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriageError::Storage(msg) => write!(f, "storage failed: {msg}"),
            TriageError::Transport(msg) => write!(f, "transport failed: {msg}"),
            TriageError::NotLeader { leader_address } => write!(
                f,
                "not leader (known leader: {})",
                leader_address
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "unknown".into())
            ),
            TriageError::InvalidTier(msg) => write!(f, "invalid tier: {msg}"),
            TriageError::MalformedInput(msg) => {
                write!(f, "malformed input: {msg}")
            }
            TriageError::SnapshotFailed(msg) => {
                write!(f, "snapshot transfer failed: {msg}")
            }
            TriageError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for TriageError {}

impl From<std::io::Error> for TriageError {
    fn from(e: std::io::Error) -> Self {
        TriageError::Transport(e.to_string())
    }
}

impl From<rusqlite::Error> for TriageError {
    fn from(e: rusqlite::Error) -> Self {
        TriageError::Storage(e.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for TriageError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        TriageError::Transport(format!("(de)serialization failed: {e}"))
    }
}

impl From<toml::de::Error> for TriageError {
    fn from(e: toml::de::Error) -> Self {
        TriageError::Internal(format!("invalid config: {e}"))
    }
}
