//! # Structured Logging
//!
//! Environment-aware `tracing` setup for operators embedding this crate.
//!
//! `RUST_LOG` wins when set; otherwise the level follows the environment detected
//! from `OPERATOR_ENV`. Output is human-readable unless `OPERATOR_LOG_FORMAT=json`.

use crate::resource::ResourceId;
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let json = std::env::var("OPERATOR_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(environment != "production")
                .with_filter(filter)
                .boxed()
        };

        // A subscriber installed by the host application takes precedence
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
            return;
        }

        tracing::info!(
            environment = %environment,
            json = json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

fn get_environment() -> String {
    std::env::var("OPERATOR_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "warn",
        _ => "debug",
    }
}

/// Log structured data for a reconciliation step.
pub fn log_reconcile_operation(
    operation: &str,
    resource: &ResourceId,
    state: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        resource = %resource,
        namespace = resource.namespace(),
        state = %state,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔁 RECONCILE_OPERATION"
    );
}
