//! # CRD Generator
//!
//! Generates Kubernetes CustomResourceDefinition (CRD) YAML from Rust type definitions.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/cloud-resources.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::core::CustomResourceExt;

use cloud_resource_operator::crd::{Postgres, SmtpCredentialSet};

fn main() -> Result<(), serde_yaml::Error> {
    let documents = [
        serde_yaml::to_string(&Postgres::crd())?,
        serde_yaml::to_string(&SmtpCredentialSet::crd())?,
    ];
    print!("{}", documents.join("---\n"));
    Ok(())
}
