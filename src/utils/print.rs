//! Logging setup and the `pf_*`/`logged_err!` macro family.
//!
//! Every replica process sets [`ME`] once at startup (its `self_id`, or a
//! short role tag for non-replica binaries); the `pf_*` macros prepend it so
//! interleaved multi-replica output, whether from a real deployment or an
//! in-process integration test, stays attributable.

use std::sync::OnceLock;

/// Label of the current process, e.g. `"r1"` for replica 1 or `"c"` for a
/// bare client. Unset until [`logger_init`] runs.
pub static ME: OnceLock<String> = OnceLock::new();

/// Initializes `env_logger` and records this process's log-line prefix.
/// Safe to call more than once (e.g. from tests); only the first call wins.
pub fn logger_init(label: impl Into<String>) {
    let _ = ME.set(label.into());
    let _ = env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .try_init();
}

/// Returns the current process's label, or `"?"` if [`logger_init`] hasn't
/// run yet (e.g. a unit test that exercises a macro directly).
pub fn me() -> &'static str {
    ME.get().map(|s| s.as_str()).unwrap_or("?")
}

#[macro_export]
macro_rules! pf_error {
    ($($arg:tt)*) => {
        log::error!("{} {}", $crate::utils::me(), format!($($arg)*))
    };
}

#[macro_export]
macro_rules! pf_warn {
    ($($arg:tt)*) => {
        log::warn!("{} {}", $crate::utils::me(), format!($($arg)*))
    };
}

#[macro_export]
macro_rules! pf_info {
    ($($arg:tt)*) => {
        log::info!("{} {}", $crate::utils::me(), format!($($arg)*))
    };
}

#[macro_export]
macro_rules! pf_debug {
    ($($arg:tt)*) => {
        log::debug!("{} {}", $crate::utils::me(), format!($($arg)*))
    };
}

#[macro_export]
macro_rules! pf_trace {
    ($($arg:tt)*) => {
        log::trace!("{} {}", $crate::utils::me(), format!($($arg)*))
    };
}

/// Logs an error at the point of failure and wraps it as
/// `Err(TriageError::Internal(..))`. An optional leading `"tag";` overrides
/// the usual [`ME`] prefix, for call sites that want to name a sub-component
/// rather than the whole process.
#[macro_export]
macro_rules! logged_err {
    ($tag:expr; $($arg:tt)*) => {{
        let msg = format!($($arg)*);
        log::error!("{} {}", $tag, msg);
        Err($crate::error::TriageError::Internal(msg))
    }};
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        $crate::pf_error!("{}", msg);
        Err($crate::error::TriageError::Internal(msg))
    }};
}
