//! # Reconciler
//!
//! Core reconciliation logic shared by every managed resource kind.
//!
//! The reconciler:
//! - Guards each request with a finalizer before any cloud work happens
//! - Resolves the strategy of a request from the strategy configuration
//! - Hands the request to the first provider claiming that strategy
//! - Writes connection details to the target Secret
//! - Updates resource status with the reconciliation result
//!
//! ## Reconciliation Flow
//!
//! 1. Load the object; a missing object needs no work
//! 2. Objects pending deletion: delete the backing resource and any Secret in
//!    another namespace, then release the finalizer
//! 3. Otherwise ensure the finalizer and resolve strategy and provider
//! 4. Ask the provider to create or converge the backing resource
//! 5. Write the Secret and mark the status complete once the resource is ready

pub mod reconcile;
pub mod secret;
pub mod status;
pub mod types;

pub use secret::build_secret;
pub use types::{ObjectKey, ReconcileOutcome, Reconciler, ReconcilerError};
