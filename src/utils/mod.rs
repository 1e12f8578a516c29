//! Helper utilities, functions, and macros.

#[macro_use]
mod print;

#[macro_use]
mod config;

mod safetcp;

pub use print::{logger_init, me, ME};

pub(crate) use safetcp::{safe_tcp_read, safe_tcp_write, tcp_bind_with_retry};
