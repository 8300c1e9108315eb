//! Configuration loading.
//!
//! Loads [`OperatorConfig`] from YAML with `${VAR}` environment interpolation and an
//! optional `environments:` section whose entry for the active environment is
//! deep-merged over the base document.

use super::OperatorConfig;
use crate::error::{OperatorError, Result};
use regex::Regex;
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

const ENVIRONMENTS_KEY: &str = "environments";

#[derive(Debug, Clone)]
pub struct ConfigurationManager {
    config: Arc<OperatorConfig>,
    environment: String,
}

impl Default for ConfigurationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationManager {
    /// Default configuration for the detected environment.
    pub fn new() -> Self {
        Self {
            config: Arc::new(OperatorConfig::default()),
            environment: Self::detect_environment(),
        }
    }

    #[instrument]
    pub async fn load_from_file<P: AsRef<Path> + std::fmt::Debug>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {:?}", path);

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            OperatorError::configuration(format!(
                "Failed to read configuration file {path:?}: {e}"
            ))
        })?;

        Self::load_from_yaml_with_env(&content, &Self::detect_environment())
    }

    pub fn load_from_yaml(yaml_content: &str) -> Result<Self> {
        Self::load_from_yaml_with_env(yaml_content, &Self::detect_environment())
    }

    /// Loads with an explicit environment instead of reading `OPERATOR_ENV`.
    pub fn load_from_yaml_with_env(yaml_content: &str, environment: &str) -> Result<Self> {
        let interpolated = Self::interpolate_env_vars(yaml_content)?;
        let mut document: YamlValue = serde_yaml::from_str(&interpolated)?;
        if document.is_null() {
            document = YamlValue::Mapping(Default::default());
        }
        Self::apply_environment_overlay(&mut document, environment);

        let config: OperatorConfig = serde_yaml::from_value(document)?;
        config.validate()?;

        debug!(environment = %environment, "Configuration loaded successfully");
        Ok(Self {
            config: Arc::new(config),
            environment: environment.to_string(),
        })
    }

    pub fn config(&self) -> Arc<OperatorConfig> {
        Arc::clone(&self.config)
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn detect_environment() -> String {
        env::var("OPERATOR_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    /// Replaces `${VAR}` with the variable's value; unset variables are left as written.
    fn interpolate_env_vars(template: &str) -> Result<String> {
        let pattern = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| OperatorError::internal(format!("invalid interpolation pattern: {e}")))?;
        Ok(pattern
            .replace_all(template, |caps: &regex::Captures| {
                let var_name = &caps[1];
                env::var(var_name).unwrap_or_else(|_| format!("${{{var_name}}}"))
            })
            .to_string())
    }

    fn apply_environment_overlay(document: &mut YamlValue, environment: &str) {
        let Some(mapping) = document.as_mapping_mut() else {
            return;
        };
        let Some(environments) = mapping.remove(ENVIRONMENTS_KEY) else {
            return;
        };
        if let Some(overlay) = environments.get(environment) {
            debug!(environment = %environment, "Applying environment configuration overlay");
            Self::merge_yaml_values(document, overlay.clone());
        }
    }

    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value);
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
    }
}
