//! # Custom Resource Definitions
//!
//! CRD types for the managed resources handled by the operator.
//!
//! ## Module Structure
//!
//! - `spec.rs` - Shared spec types (`SecretRef`)
//! - `status.rs` - Status and phase types
//! - `resource.rs` - `ManagedResource` trait implemented by every kind
//! - `postgres.rs` - `Postgres` kind
//! - `smtp.rs` - `SmtpCredentialSet` kind

mod postgres;
mod resource;
mod smtp;
mod spec;
mod status;

// Re-export all public types
pub use postgres::{Postgres, PostgresSpec};
pub use resource::ManagedResource;
pub use smtp::{SmtpCredentialSet, SmtpCredentialSetSpec};
pub use spec::SecretRef;
pub use status::{Phase, ResourceTypeStatus};
