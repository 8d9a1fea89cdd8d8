//! # Resource Lifecycle Helpers
//!
//! Small building blocks shared by the reconciler and the providers.
//!
//! - `finalizer.rs` - add/remove finalizers, persisted only on change
//! - `password.rs` - credential generation from the OS CSPRNG
//! - `env.rs` - per-call environment overrides (reconcile interval, tag prefix)

mod env;
mod finalizer;
mod password;

pub use env::{forced_reconcile_time_or_default, organization_tag, parse_forced_reconcile_time};
pub use finalizer::{ensure_finalizer, has_finalizer, remove_finalizer};
pub use password::{generate_password, generate_password_with, PasswordError, PasswordPolicy};
