use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub assignment_latency_seconds: HistogramVec,
    pub lock_busy_total: IntCounter,
    pub recheck_rejections_total: IntCounter,
    pub forced_assignments_total: IntCounter,
    pub notification_failures_total: IntCounter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Assignment attempts by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let assignment_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "assignment_latency_seconds",
                "Latency of one assignment attempt in seconds",
            ),
            &["outcome"],
        )
        .expect("valid assignment_latency_seconds metric");

        let lock_busy_total = IntCounter::new(
            "assignment_lock_busy_total",
            "Candidates skipped because another attempt held the worker lock",
        )
        .expect("valid assignment_lock_busy_total metric");

        let recheck_rejections_total = IntCounter::new(
            "assignment_recheck_rejections_total",
            "Candidates rejected by the re-check under lock",
        )
        .expect("valid assignment_recheck_rejections_total metric");

        let forced_assignments_total = IntCounter::new(
            "forced_assignments_total",
            "Operator assignments that overrode a schedule conflict",
        )
        .expect("valid forced_assignments_total metric");

        let notification_failures_total = IntCounter::new(
            "notification_failures_total",
            "Notifications that could not be enqueued",
        )
        .expect("valid notification_failures_total metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(assignment_latency_seconds.clone()))
            .expect("register assignment_latency_seconds");
        registry
            .register(Box::new(lock_busy_total.clone()))
            .expect("register assignment_lock_busy_total");
        registry
            .register(Box::new(recheck_rejections_total.clone()))
            .expect("register assignment_recheck_rejections_total");
        registry
            .register(Box::new(forced_assignments_total.clone()))
            .expect("register forced_assignments_total");
        registry
            .register(Box::new(notification_failures_total.clone()))
            .expect("register notification_failures_total");

        Self {
            registry,
            assignments_total,
            assignment_latency_seconds,
            lock_busy_total,
            recheck_rejections_total,
            forced_assignments_total,
            notification_failures_total,
        }
    }

    pub fn observe_attempt(&self, outcome: &str, elapsed_seconds: f64) {
        self.assignment_latency_seconds
            .with_label_values(&[outcome])
            .observe(elapsed_seconds);
        self.assignments_total.with_label_values(&[outcome]).inc();
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
