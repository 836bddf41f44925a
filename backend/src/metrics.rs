use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref MESSAGES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ioternak_messages_total",
        "Total messages received from MQTT"
    ))
    .unwrap();
    pub static ref REGISTRATIONS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ioternak_registrations_total",
        "Total register messages applied"
    ))
    .unwrap();
    pub static ref READINGS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ioternak_readings_total",
        "Total readings accepted and stored"
    ))
    .unwrap();
    pub static ref DROPPED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ioternak_dropped_total",
        "Total messages dropped (malformed, incomplete, or store failure)"
    ))
    .unwrap();
    pub static ref ALERTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ioternak_alerts_total",
        "Total threshold breaches detected"
    ))
    .unwrap();
    pub static ref DISPATCH_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ioternak_dispatch_failures_total",
        "Total failed notification deliveries"
    ))
    .unwrap();
    pub static ref SCHEDULE_PUBLISH_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ioternak_schedule_publish_failures_total",
        "Total failed retained schedule publishes"
    ))
    .unwrap();
    pub static ref DB_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ioternak_db_failures_total",
        "Total transient database failures that triggered a retry"
    ))
    .unwrap();
    pub static ref CHANNEL_FULL_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ioternak_channel_full_total",
        "Total number of times the pipeline channel was full (backpressure events)"
    ))
    .unwrap();
    pub static ref INGEST_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "ioternak_ingest_latency_seconds",
            "Time taken to process one inbound message end to end"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ])
    )
    .unwrap();
}

pub fn init_metrics() {
    REGISTRY.register(Box::new(MESSAGES_TOTAL.clone())).unwrap();
    REGISTRY
        .register(Box::new(REGISTRATIONS_TOTAL.clone()))
        .unwrap();
    REGISTRY.register(Box::new(READINGS_TOTAL.clone())).unwrap();
    REGISTRY.register(Box::new(DROPPED_TOTAL.clone())).unwrap();
    REGISTRY.register(Box::new(ALERTS_TOTAL.clone())).unwrap();
    REGISTRY
        .register(Box::new(DISPATCH_FAILURES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(SCHEDULE_PUBLISH_FAILURES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(DB_FAILURES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(CHANNEL_FULL_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(INGEST_LATENCY_SECONDS.clone()))
        .unwrap();
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
