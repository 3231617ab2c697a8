use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus exporter and register all application metrics.
/// Returns a `PrometheusHandle` whose `render()` method produces the
/// text/plain Prometheus scrape payload.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // Pre-register counters so they appear even before the first increment.
    counter!("orders_created_total").absolute(0);
    counter!("orders_confirming_total").absolute(0);
    counter!("orders_completed_total").absolute(0);
    counter!("orders_failed_total").absolute(0);
    counter!("upstream_rate_limit_retries_total").absolute(0);
    counter!("pricing_fallback_total").absolute(0);
    counter!("degraded_balance_reads_total").absolute(0);

    handle
}
