//! # Controller
//!
//! Reconciliation of managed resource requests.

pub mod reconciler;
