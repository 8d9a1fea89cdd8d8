//! # OpenShift Providers
//!
//! Providers that satisfy requests inside the cluster itself, claiming the
//! `openshift` strategy.

mod postgres;
mod smtp;

pub use postgres::InClusterPostgresProvider;
pub use smtp::InClusterSmtpProvider;

/// Strategy name claimed by the in-cluster providers
pub const OPENSHIFT_STRATEGY: &str = "openshift";
