//! # Operator
//!
//! Owns the registered controllers and their shared lifecycle.

use crate::client::ResourceClient;
use crate::config::{ConfigurationManager, OperatorConfig};
use crate::controller::{
    ControllerConfiguration, ControllerConfigurationBuilder, ReconciliationScheduler, Reconciler,
};
use crate::error::{OperatorError, Result};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug)]
pub struct Operator {
    config: Arc<OperatorConfig>,
    controllers: Vec<ReconciliationScheduler>,
    started: bool,
}

impl Operator {
    pub fn new(config: OperatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            controllers: Vec::new(),
            started: false,
        })
    }

    pub fn from_manager(manager: &ConfigurationManager) -> Result<Self> {
        Self::new(manager.config().as_ref().clone())
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    /// Controller settings seeded from the operator configuration.
    pub fn controller_configuration(&self, name: impl Into<String>) -> ControllerConfigurationBuilder {
        ControllerConfigurationBuilder::from_config(name, &self.config)
    }

    /// Registers a controller. Registering after [`start`](Self::start) starts it immediately.
    pub fn register<R: Reconciler>(
        &mut self,
        reconciler: R,
        client: Arc<dyn ResourceClient>,
        configuration: ControllerConfiguration,
    ) -> Result<ReconciliationScheduler> {
        if self.controller(configuration.name()).is_some() {
            return Err(OperatorError::configuration(format!(
                "controller '{}' is already registered",
                configuration.name()
            )));
        }

        let scheduler = ReconciliationScheduler::new(reconciler, client, configuration);
        info!(
            controller = scheduler.name(),
            finalizer = scheduler.configuration().finalizer(),
            has_workflow = scheduler.configuration().workflow().is_some(),
            "Controller registered"
        );
        if self.started {
            scheduler.start();
        }
        self.controllers.push(scheduler.clone());
        Ok(scheduler)
    }

    pub fn controller(&self, name: &str) -> Option<&ReconciliationScheduler> {
        self.controllers
            .iter()
            .find(|controller| controller.name() == name)
    }

    pub fn controllers(&self) -> &[ReconciliationScheduler] {
        &self.controllers
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Starts every controller. Must be called from within a Tokio runtime.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.controllers.iter().for_each(ReconciliationScheduler::start);
        self.started = true;
        info!(controllers = self.controllers.len(), "🚀 Operator started");
    }

    /// Stops every controller; reports the first shutdown error after all have stopped.
    pub async fn stop(&mut self) -> Result<()> {
        let results = join_all(self.controllers.iter().map(|controller| controller.stop())).await;
        self.started = false;

        let mut first_error = None;
        for (controller, result) in self.controllers.iter().zip(results) {
            if let Err(error) = result {
                warn!(controller = controller.name(), error = %error, "Controller did not stop cleanly");
                first_error.get_or_insert(error);
            }
        }
        info!("Operator stopped");
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryResourceClient;
    use crate::controller::{Context, UpdateControl};
    use crate::resource::ManagedResource;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl Reconciler for Noop {
        async fn reconcile(&self, _resource: ManagedResource, _context: &Context) -> Result<UpdateControl> {
            Ok(UpdateControl::no_update())
        }
    }

    #[tokio::test]
    async fn test_duplicate_controller_names_rejected() {
        let mut operator = Operator::new(OperatorConfig::default()).unwrap();
        let client: Arc<dyn ResourceClient> = Arc::new(InMemoryResourceClient::new());
        let configuration = operator.controller_configuration("web").version_ordering().build().unwrap();
        operator
            .register(Noop, Arc::clone(&client), configuration.clone())
            .unwrap();

        let error = operator.register(Noop, client, configuration).unwrap_err();
        assert!(matches!(error, OperatorError::Configuration(_)));
        assert_eq!(operator.controllers().len(), 1);
    }

    #[tokio::test]
    async fn test_start_and_stop_all_controllers() {
        let mut operator = Operator::new(OperatorConfig::default()).unwrap();
        let client: Arc<dyn ResourceClient> = Arc::new(InMemoryResourceClient::new());
        for name in ["web", "db"] {
            let configuration = operator.controller_configuration(name).version_ordering().build().unwrap();
            operator.register(Noop, Arc::clone(&client), configuration).unwrap();
        }

        operator.start();
        assert!(operator.controllers().iter().all(ReconciliationScheduler::is_running));
        operator.stop().await.unwrap();
        assert!(!operator.is_started());
        assert!(operator.controllers().iter().all(|c| !c.is_running()));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = OperatorConfig::default();
        config.executor.workflow_pool_size = 0;
        assert!(Operator::new(config).is_err());
    }
}
