//! Run-command extension handler
//!
//! Acquires a user script (inline, base64/gzip encoded or downloaded with a
//! SAS token and managed identity fallback), runs it at most once per
//! sequence number and describes the outcome for status reporting.

pub mod config;
pub mod extensions;
pub mod types;
pub mod utils;

pub use types::{ExecutionResult, HandlerError, InvocationOutcome, Result};
