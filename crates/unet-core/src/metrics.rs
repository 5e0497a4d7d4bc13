//! Prometheus-backed metrics, scraped from the `/metrics` HTTP route.

use prometheus::{Counter, CounterVec, Gauge, GaugeVec, HistogramVec, Opts, Registry};
use std::sync::Arc;
use sysinfo::{Pid, System};

/// Every counter/gauge the monitoring engine exposes, grouped behind one
/// handle so workers and the server share the same `Registry`.
#[derive(Clone)]
pub struct MetricsManager {
    registry: Registry,
    pub ping_sweeps_total: Counter,
    pub ping_probes_total: CounterVec,
    pub snmp_sweeps_total: Counter,
    pub snmp_probe_failures_total: Counter,
    pub sweep_duration_seconds: HistogramVec,
    pub active_problems: GaugeVec,
    pub timeseries_buffer_depth: Gauge,
    pub timeseries_samples_dropped_total: Counter,
    pub database_healthy: Gauge,
    pub process_cpu_usage_percent: Gauge,
    pub process_memory_usage_bytes: Gauge,
    host: Arc<std::sync::Mutex<System>>,
}

impl MetricsManager {
    /// # Errors
    /// Returns an error if a metric with a conflicting name is already
    /// registered — should only happen if this is constructed twice.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let ping_sweeps_total = Counter::new("ping_sweeps_total", "completed ping sweeps")?;
        let ping_probes_total = CounterVec::new(
            Opts::new("ping_probes_total", "ICMP probes by result"),
            &["result"],
        )?;
        let snmp_sweeps_total = Counter::new("snmp_sweeps_total", "completed SNMP sweeps")?;
        let snmp_probe_failures_total = Counter::new(
            "snmp_probe_failures_total",
            "devices that failed an entire SNMP sweep",
        )?;
        let sweep_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("sweep_duration_seconds", "sweep wall-clock duration"),
            &["sweep"],
        )?;
        let active_problems = GaugeVec::new(
            Opts::new("active_problems", "currently open active-problem rows"),
            &["severity"],
        )?;
        let timeseries_buffer_depth = Gauge::new(
            "timeseries_buffer_depth",
            "samples buffered pending delivery to the time-series store",
        )?;
        let timeseries_samples_dropped_total = Counter::new(
            "timeseries_samples_dropped_total",
            "samples dropped after the buffer filled during an outage",
        )?;
        let database_healthy = Gauge::new("database_healthy", "1 if the last health check passed")?;
        let process_cpu_usage_percent =
            Gauge::new("process_cpu_usage_percent", "CPU usage of this process, sampled at scrape time")?;
        let process_memory_usage_bytes =
            Gauge::new("process_memory_usage_bytes", "resident memory of this process, sampled at scrape time")?;

        registry.register(Box::new(ping_sweeps_total.clone()))?;
        registry.register(Box::new(ping_probes_total.clone()))?;
        registry.register(Box::new(snmp_sweeps_total.clone()))?;
        registry.register(Box::new(snmp_probe_failures_total.clone()))?;
        registry.register(Box::new(sweep_duration_seconds.clone()))?;
        registry.register(Box::new(active_problems.clone()))?;
        registry.register(Box::new(timeseries_buffer_depth.clone()))?;
        registry.register(Box::new(timeseries_samples_dropped_total.clone()))?;
        registry.register(Box::new(database_healthy.clone()))?;
        registry.register(Box::new(process_cpu_usage_percent.clone()))?;
        registry.register(Box::new(process_memory_usage_bytes.clone()))?;

        Ok(Self {
            registry,
            ping_sweeps_total,
            ping_probes_total,
            snmp_sweeps_total,
            snmp_probe_failures_total,
            sweep_duration_seconds,
            active_problems,
            timeseries_buffer_depth,
            timeseries_samples_dropped_total,
            database_healthy,
            process_cpu_usage_percent,
            process_memory_usage_bytes,
            host: Arc::new(std::sync::Mutex::new(System::new_all())),
        })
    }

    /// Refreshes host-level CPU/memory gauges and returns the render-ready
    /// exposition text for the `/metrics` route.
    pub fn render(&self) -> prometheus::Result<String> {
        if let Ok(mut host) = self.host.lock() {
            host.refresh_cpu();
            host.refresh_memory();
            let pid = Pid::from_u32(std::process::id());
            host.refresh_process(pid);
            if let Some(process) = host.process(pid) {
                self.process_cpu_usage_percent.set(f64::from(process.cpu_usage()));
                self.process_memory_usage_bytes.set(process.memory() as f64);
            }
        }
        let encoder = prometheus::TextEncoder::new();
        let families = self.registry.gather();
        encoder.encode_to_string(&families)
    }
}

impl Default for MetricsManager {
    fn default() -> Self {
        Self::new().expect("static metric definitions never collide")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_exposes_every_registered_metric_by_name() {
        let metrics = MetricsManager::new().unwrap();
        metrics.ping_sweeps_total.inc();
        metrics.active_problems.with_label_values(&["critical"]).set(2.0);

        let text = metrics.render().unwrap();

        for name in [
            "ping_sweeps_total",
            "ping_probes_total",
            "snmp_sweeps_total",
            "snmp_probe_failures_total",
            "sweep_duration_seconds",
            "active_problems",
            "timeseries_buffer_depth",
            "timeseries_samples_dropped_total",
            "database_healthy",
            "process_cpu_usage_percent",
            "process_memory_usage_bytes",
        ] {
            assert!(text.contains(name), "missing metric family: {name}");
        }
    }

    #[test]
    fn render_samples_this_process_into_the_host_gauges() {
        let metrics = MetricsManager::new().unwrap();
        let _ = metrics.render().unwrap();
        assert!(metrics.process_memory_usage_bytes.get() > 0.0);
    }

    #[test]
    fn two_managers_can_coexist_with_independent_registries() {
        let a = MetricsManager::new().unwrap();
        let b = MetricsManager::new().unwrap();
        a.ping_sweeps_total.inc();
        assert_eq!(a.ping_sweeps_total.get(), 1.0);
        assert_eq!(b.ping_sweeps_total.get(), 0.0);
    }
}
