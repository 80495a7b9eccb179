//! Query metrics and tracing spans
//!
//! With the `metrics` feature, [`METRICS`] records every database round-trip
//! and every façade invocation through OpenTelemetry into a Prometheus
//! registry. With the `tracing` feature, [`tracing_helpers`] provides the
//! spans wrapped around invocations and round-trips.

#[cfg(feature = "metrics")]
pub use self::prometheus_metrics::{LifeQueryMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use once_cell::sync::Lazy;
    use opentelemetry::metrics::{Counter, Histogram, MeterProvider};
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Encoder, Registry, TextEncoder};
    use std::time::Duration;

    /// Process-wide metrics; `None` if the exporter could not be set up.
    pub static METRICS: Lazy<Option<LifeQueryMetrics>> = Lazy::new(|| match LifeQueryMetrics::init() {
        Ok(metrics) => Some(metrics),
        Err(e) => {
            log::warn!(target: "lifequery", "metrics disabled: {e}");
            None
        }
    });

    pub struct LifeQueryMetrics {
        registry: Registry,
        // keeps the reader alive
        _provider: SdkMeterProvider,
        pub queries_total: Counter<u64>,
        pub query_errors_total: Counter<u64>,
        pub query_duration: Histogram<f64>,
        pub invocations_total: Counter<u64>,
    }

    impl LifeQueryMetrics {
        pub fn init() -> Result<Self, String> {
            let registry = Registry::new();
            let exporter = opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
                .map_err(|e| format!("failed to build prometheus exporter: {e}"))?;
            let provider = SdkMeterProvider::builder().with_reader(exporter).build();
            let meter = provider.meter("lifequery");

            let queries_total = meter
                .u64_counter("lifequery_queries_total")
                .with_description("Total statements sent to the database")
                .build();

            let query_errors_total = meter
                .u64_counter("lifequery_query_errors_total")
                .with_description("Statements the database failed")
                .build();

            let query_duration = meter
                .f64_histogram("lifequery_query_duration_seconds")
                .with_description("Duration of database round-trips")
                .build();

            let invocations_total = meter
                .u64_counter("lifequery_invocations_total")
                .with_description("Total query contract invocations")
                .build();

            Ok(Self {
                registry,
                _provider: provider,
                queries_total,
                query_errors_total,
                query_duration,
                invocations_total,
            })
        }

        pub fn record_query(&self, elapsed: Duration) {
            self.queries_total.add(1, &[]);
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_query_error(&self) {
            self.query_errors_total.add(1, &[]);
        }

        pub fn record_invocation(&self) {
            self.invocations_total.add(1, &[]);
        }

        /// Prometheus registry the exporter writes into.
        pub fn registry(&self) -> &Registry {
            &self.registry
        }

        /// Current metrics in the Prometheus text format.
        pub fn render(&self) -> String {
            let mut buf = Vec::new();
            if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buf) {
                log::warn!(target: "lifequery", "failed to encode metrics: {e}");
            }
            String::from_utf8_lossy(&buf).into_owned()
        }
    }

}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use crate::executor::ExecMode;
    use tracing::{info_span, Span};

    /// Span around one façade invocation.
    pub fn invoke_query_span(query: &str) -> Span {
        info_span!("invoke_query", query = %query)
    }

    /// Span around one database round-trip.
    pub fn execute_query_span(query: &str, mode: ExecMode) -> Span {
        info_span!("execute_query", query = %query, mode = ?mode)
    }
}
