use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Safe to call more than once (integration
/// tests spawn several applications in one process); only the first call
/// installs.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            METRICS_HANDLE.set(handle).ok();
        }
        Err(err) => {
            tracing::warn!("Prometheus recorder already installed: {err}");
        }
    }
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

pub fn record_order_created(branch_code: &str, pairs: usize) {
    let labels = [("branch", branch_code.to_string())];
    counter!("orders_created_total", &labels).increment(1);
    counter!("line_items_created_total", &labels).increment(pairs as u64);
}

pub fn record_payment_applied(mode: &str) {
    let labels = [("mode", mode.to_string())];
    counter!("payments_applied_total", &labels).increment(1);
}

pub fn record_realtime_event(event: &str) {
    let labels = [("event", event.to_string())];
    counter!("realtime_events_total", &labels).increment(1);
}
