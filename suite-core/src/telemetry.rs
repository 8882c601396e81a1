// Telemetry module for structured logging and metrics

use anyhow::Result;
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured logging with JSON formatting
///
/// `RUST_LOG` takes precedence over the configured level.
#[tracing::instrument(skip_all)]
pub fn init_logging(log_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(log_level = log_level, "Structured logging initialized");

    Ok(())
}

/// Initialize the Prometheus exporter and describe the suite's counters
#[tracing::instrument(skip_all)]
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!(
        "suite_request_attempts_total",
        "Authenticated HTTP attempts by method and response status"
    );
    describe_counter!(
        "suite_token_refresh_total",
        "Bearer tokens regenerated after an auth failure"
    );
    describe_counter!(
        "suite_trigger_polls_total",
        "Job-manager polls issued while waiting for schedule firings"
    );
    describe_counter!(
        "suite_trigger_timeouts_total",
        "Schedule waits that ended without the required firings"
    );

    tracing::info!(
        metrics_port = metrics_port,
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

#[inline]
pub fn record_request_attempt(method: &str, status: u16) {
    counter!(
        "suite_request_attempts_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

#[inline]
pub fn record_token_refresh(tenant: &str, delegated: bool) {
    counter!(
        "suite_token_refresh_total",
        "tenant" => tenant.to_string(),
        "delegated" => delegated.to_string()
    )
    .increment(1);
}

#[inline]
pub fn record_trigger_poll() {
    counter!("suite_trigger_polls_total").increment(1);
}

#[inline]
pub fn record_trigger_timeout(schedule_id: &str) {
    counter!("suite_trigger_timeouts_total", "schedule_id" => schedule_id.to_string())
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_only_once_per_process() {
        let _ = init_logging("info");
        assert!(init_logging("debug").is_err());
    }

    #[test]
    fn test_metrics_recording_without_exporter() {
        record_request_attempt("GET", 200);
        record_token_refresh("source", false);
        record_trigger_poll();
        record_trigger_timeout("42");
    }
}
