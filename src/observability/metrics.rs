use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub attempts_in_progress: IntGauge,
    pub llm_request_seconds: HistogramVec,
    pub llm_tokens_total: IntCounterVec,
    pub violations_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Assignment rows recorded by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let attempts_in_progress =
            IntGauge::new("attempts_in_progress", "Assignment attempts currently processing")
                .expect("valid attempts_in_progress metric");

        let llm_request_seconds = HistogramVec::new(
            HistogramOpts::new("llm_request_seconds", "Latency of LLM generate calls in seconds")
                .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
            &["outcome"],
        )
        .expect("valid llm_request_seconds metric");

        let llm_tokens_total = IntCounterVec::new(
            Opts::new("llm_tokens_total", "Tokens consumed by LLM calls"),
            &["kind"],
        )
        .expect("valid llm_tokens_total metric");

        let violations_total = IntCounterVec::new(
            Opts::new("violations_total", "Rule violations found by evaluations"),
            &["severity"],
        )
        .expect("valid violations_total metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(attempts_in_progress.clone()))
            .expect("register attempts_in_progress");
        registry
            .register(Box::new(llm_request_seconds.clone()))
            .expect("register llm_request_seconds");
        registry
            .register(Box::new(llm_tokens_total.clone()))
            .expect("register llm_tokens_total");
        registry
            .register(Box::new(violations_total.clone()))
            .expect("register violations_total");

        Self {
            registry,
            assignments_total,
            attempts_in_progress,
            llm_request_seconds,
            llm_tokens_total,
            violations_total,
        }
    }

    pub fn observe_llm_call(&self, outcome: &str, seconds: f64) {
        self.llm_request_seconds
            .with_label_values(&[outcome])
            .observe(seconds);
    }

    pub fn add_tokens(&self, prompt_tokens: u32, completion_tokens: u32) {
        self.llm_tokens_total
            .with_label_values(&["prompt"])
            .inc_by(u64::from(prompt_tokens));
        self.llm_tokens_total
            .with_label_values(&["completion"])
            .inc_by(u64::from(completion_tokens));
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
