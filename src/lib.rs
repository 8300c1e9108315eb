#![allow(clippy::doc_markdown)] // Allow technical terms in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Operator Core
//!
//! Reconciliation scheduling and dependent-resource workflows for operators that
//! keep external systems in line with declared resources.
//!
//! ## Overview
//!
//! A controller receives change notifications for *primary* resources and runs a
//! user [`Reconciler`](controller::Reconciler) for each one, never more than one
//! at a time per resource. Failures are retried with exponential backoff,
//! admissions are rate limited, and idle resources are re-reconciled
//! periodically. A controller may manage a [`Workflow`](workflow::Workflow): a
//! dependency graph of *dependent* resources that is reconciled layer by layer
//! before the reconciler runs, and cleaned up in reverse before the finalizer is
//! removed.
//!
//! ## Module Organization
//!
//! - [`controller`] - Scheduler, dispatcher, reconciler contract and controls
//! - [`workflow`] - Dependent-resource graphs and their executor
//! - [`retry`], [`rate_limiter`], [`expiration`] - Scheduling policies
//! - [`cache`] - Freshness cache for the controller's own writes
//! - [`state_machine`] - Per-resource execution states
//! - [`config`] - YAML configuration with environment overlays
//! - [`error`] - Structured error handling
//! - [`logging`] - `tracing` subscriber setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use operator_core::client::InMemoryResourceClient;
//! use operator_core::config::OperatorConfig;
//! use operator_core::controller::{Context, Reconciler, UpdateControl};
//! use operator_core::resource::{ManagedResource, ResourceId};
//! use operator_core::{Operator, Result};
//! use std::sync::Arc;
//!
//! struct Greeter;
//!
//! #[async_trait::async_trait]
//! impl Reconciler for Greeter {
//!     async fn reconcile(&self, resource: ManagedResource, _context: &Context) -> Result<UpdateControl> {
//!         let status = serde_json::json!({"greeting": format!("hello {}", resource.id.name())});
//!         Ok(UpdateControl::patch_status(resource.with_status(status)))
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! operator_core::logging::init_structured_logging();
//!
//! let mut operator = Operator::new(OperatorConfig::default())?;
//! let configuration = operator
//!     .controller_configuration("greeter")
//!     .version_ordering()
//!     .build()?;
//! let client = Arc::new(InMemoryResourceClient::new());
//! let greeter = operator.register(Greeter, client.clone(), configuration)?;
//!
//! operator.start();
//! let resource = ManagedResource::new(ResourceId::namespaced("world", "default"), serde_json::json!({}));
//! client.insert(resource.clone());
//! greeter.submit_resource(resource);
//! operator.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod expectation;
pub mod expiration;
pub mod logging;
pub mod operator;
pub mod rate_limiter;
pub mod resource;
pub mod retry;
pub mod state_machine;
pub mod utils;
pub mod workflow;

pub use config::{ConfigurationManager, OperatorConfig};
pub use controller::{
    ChangeEvent, Context, ControllerConfiguration, ReconciliationScheduler, Reconciler,
    SchedulerEvent,
};
pub use error::{OperatorError, Result};
pub use operator::Operator;
pub use resource::{ManagedResource, ResourceId};
pub use workflow::{Workflow, WorkflowResult};
