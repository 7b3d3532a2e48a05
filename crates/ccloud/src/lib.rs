//! # ccloud
//!
//! Blocking client for the managed streaming platform.
//!
//! This crate provides:
//! - [`CloudClient`]: control-plane calls (environments, dedicated clusters,
//!   schema registries, service accounts, role bindings, API keys)
//! - [`KafkaRestClient`]: per-cluster admin calls (topics, cluster links,
//!   mirror topics)
//!
//! Every error carries an [`ErrorCategory`] so callers can tell throttling
//! and server errors apart from rejected requests.
//!
//! ## Example
//!
//! ```no_run
//! use ccloud::{CloudClient, Credentials};
//!
//! let client = CloudClient::new(Credentials::new("KEY", "SECRET"));
//! let env = client.create_environment("dr-east", "ESSENTIALS").unwrap();
//! println!("created {}", env.id);
//! ```

pub mod auth;
pub mod cloud;
pub mod error;
pub mod kafka;
pub mod types;

pub use auth::Credentials;
pub use cloud::{API_BASE, CloudClient, cluster_crn, environment_crn, registry_crn};
pub use error::{Error, ErrorCategory, Result};
pub use kafka::{ConnectionMode, KafkaRestClient, LinkSpec};
pub use types::{ClusterSpec, NewRoleBinding};
