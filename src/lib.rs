//! iomctl: manage custom IOM (indicator-of-misconfiguration) rules on the
//! CrowdStrike CSPM backend.
//!
//! Rules live as YAML documents embedding Rego policy logic. The library
//! validates them locally, reconciles a directory of them against the
//! backend by create-or-update, exports backend rules back to documents, and
//! probes which resource types the backend can evaluate.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use iomctl::api::{Credentials, FalconClient};
//! use iomctl::config::Config;
//! use iomctl::ops::{rules, Environment, Session};
//! use iomctl::workflow::FailurePolicy;
//!
//! let config = Config::default();
//! let credentials = Credentials {
//!     client_id: "client-id".into(),
//!     client_secret: "client-secret".into(),
//! };
//! let client = FalconClient::new(&config.api, credentials).unwrap();
//! let session = Session::new(&client, &config);
//! let report = rules::deploy_all(
//!     &session,
//!     Path::new("rules"),
//!     Environment::Staging,
//!     FailurePolicy::FailFast,
//! )
//! .unwrap();
//! println!("created {}", report.value.snapshot.counts.created);
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod ops;
pub mod output;
pub mod progress;
pub mod rules;
pub mod schema;
pub mod workflow;

pub use error::{IomError, Result};
