//! # Controllers
//!
//! A controller pairs a [`Reconciler`] with a [`ReconciliationScheduler`]. The
//! scheduler decides *when* a resource is reconciled; the dispatcher decides
//! *what* happens in one run: finalizer handling, the managed workflow, the
//! reconciler itself, and the write it returns.
//!
//! ```rust,no_run
//! use operator_core::client::InMemoryResourceClient;
//! use operator_core::controller::{
//!     Context, ControllerConfiguration, ReconciliationScheduler, Reconciler, UpdateControl,
//! };
//! use operator_core::error::Result;
//! use operator_core::resource::{ManagedResource, ResourceId};
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl Reconciler for Echo {
//!     async fn reconcile(&self, resource: ManagedResource, _context: &Context) -> Result<UpdateControl> {
//!         let status = resource.spec.clone();
//!         Ok(UpdateControl::patch_status(resource.with_status(status)))
//!     }
//! }
//!
//! # async fn run() -> Result<()> {
//! let configuration = ControllerConfiguration::builder("echo")
//!     .version_ordering()
//!     .build()?;
//! let client = Arc::new(InMemoryResourceClient::new());
//! let scheduler = ReconciliationScheduler::new(Echo, client, configuration);
//! scheduler.start();
//! scheduler.submit_resource(ManagedResource::new(ResourceId::new("demo"), serde_json::json!({})));
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod configuration;
pub mod context;
pub mod control;
pub(crate) mod dispatcher;
pub mod event;
pub mod reconciler;
pub mod scheduler;
pub(crate) mod timer;

pub use configuration::{ControllerConfiguration, ControllerConfigurationBuilder};
pub use context::Context;
pub use control::{DeleteControl, ErrorStatusUpdateControl, UpdateAction, UpdateControl};
pub use event::{ChangeEvent, SchedulerEvent};
pub use reconciler::Reconciler;
pub use scheduler::ReconciliationScheduler;
