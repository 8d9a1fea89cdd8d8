//! # Runtime
//!
//! Controller runtime wiring: the watch loop and its error policy.

pub mod error_policy;
pub mod watch_loop;

pub use watch_loop::{run_controller, ReconcileContext};
