//! # Configuration
//!
//! Process-level configuration for the operator.

mod controller;

pub use controller::ControllerConfig;
