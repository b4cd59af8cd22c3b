use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub search_latency_seconds: Histogram,
    pub active_sessions: IntGauge,
    pub events_published_total: IntCounterVec,
    pub events_dropped_total: IntCounter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new(
                "transitions_total",
                "Request lifecycle transitions by name and outcome",
            ),
            &["transition", "outcome"],
        )
        .expect("valid transitions_total metric");

        let search_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "search_latency_seconds",
            "Latency of provider searches in seconds",
        ))
        .expect("valid search_latency_seconds metric");

        let active_sessions = IntGauge::new("active_sessions", "Connected realtime sessions")
            .expect("valid active_sessions metric");

        let events_published_total = IntCounterVec::new(
            Opts::new("events_published_total", "Realtime events published by name"),
            &["event"],
        )
        .expect("valid events_published_total metric");

        let events_dropped_total = IntCounter::new(
            "events_dropped_total",
            "Realtime events dropped because a session queue was full or closed",
        )
        .expect("valid events_dropped_total metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(search_latency_seconds.clone()))
            .expect("register search_latency_seconds");
        registry
            .register(Box::new(active_sessions.clone()))
            .expect("register active_sessions");
        registry
            .register(Box::new(events_published_total.clone()))
            .expect("register events_published_total");
        registry
            .register(Box::new(events_dropped_total.clone()))
            .expect("register events_dropped_total");

        Self {
            registry,
            transitions_total,
            search_latency_seconds,
            active_sessions,
            events_published_total,
            events_dropped_total,
        }
    }

    pub fn record_transition<T, E>(&self, transition: &str, result: &Result<T, E>) {
        let outcome = if result.is_ok() { "success" } else { "error" };
        self.transitions_total
            .with_label_values(&[transition, outcome])
            .inc();
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
