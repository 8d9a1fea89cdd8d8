//! # Cloud Resource Operator
//!
//! A Kubernetes operator that provisions backing cloud resources for
//! managed resource requests.
//!
//! A request (`Postgres`, `SmtpCredentialSet`) names a deployment type and a
//! tier. The strategy ConfigMap maps that pair to a strategy, the first
//! provider claiming the strategy creates the backing resource, and the
//! connection details end up in a Secret next to the request.
//!
//! ## Modules
//!
//! - `config` - Operator configuration from the environment
//! - `constants` - Shared defaults
//! - `controller` - The reconcile state machine
//! - `crd` - Custom resource types
//! - `observability` - Prometheus metrics
//! - `provider` - Provider trait, registry and implementations
//! - `resources` - Finalizer, password and environment helpers
//! - `runtime` - Controller watch loop and error policy
//! - `server` - Metrics and probe HTTP server
//! - `store` - Object store abstraction over the Kubernetes API
//! - `strategy` - Strategy configuration

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod provider;
pub mod resources;
pub mod runtime;
pub mod server;
pub mod store;
pub mod strategy;
