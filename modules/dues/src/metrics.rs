use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Instant;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    // Counters
    pub charges_generated_total: IntCounterVec,
    pub payments_recorded_total: IntCounterVec,
    pub payments_rejected_total: IntCounterVec,
    pub snapshot_refresh_total: IntCounterVec,

    // Histograms
    pub read_duration_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let charges_generated_total = IntCounterVec::new(
            Opts::new("dues_charges_generated_total", "Charges created by generation runs"),
            &["period_type"],
        )?;

        let payments_recorded_total = IntCounterVec::new(
            Opts::new("dues_payments_recorded_total", "Confirmed payments recorded"),
            &["method", "matched"], // matched: true|false
        )?;

        let payments_rejected_total = IntCounterVec::new(
            Opts::new("dues_payments_rejected_total", "Payment requests rejected"),
            &["reason"], // error code, e.g. DUPLICATE_PAYMENT
        )?;

        let snapshot_refresh_total = IntCounterVec::new(
            Opts::new("dues_snapshot_refresh_total", "KPI snapshot refreshes"),
            &["trigger", "result"], // trigger: manual|payment, result: ok|error
        )?;

        let read_duration_seconds = HistogramVec::new(
            HistogramOpts::new("dues_read_duration_seconds", "Billing read path duration seconds"),
            &["operation"], // matrix|summary|history
        )?;

        registry.register(Box::new(charges_generated_total.clone()))?;
        registry.register(Box::new(payments_recorded_total.clone()))?;
        registry.register(Box::new(payments_rejected_total.clone()))?;
        registry.register(Box::new(snapshot_refresh_total.clone()))?;
        registry.register(Box::new(read_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            charges_generated_total,
            payments_recorded_total,
            payments_rejected_total,
            snapshot_refresh_total,
            read_duration_seconds,
        })
    }

    pub fn render(&self) -> Result<String, String> {
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        let mut buf = Vec::new();
        encoder
            .encode(&mf, &mut buf)
            .map_err(|e| e.to_string())?;
        String::from_utf8(buf).map_err(|e| e.to_string())
    }

    pub fn timer() -> Instant {
        Instant::now()
    }

    pub fn observe_read(&self, operation: &str, started: Instant) {
        self.read_duration_seconds
            .with_label_values(&[operation])
            .observe(started.elapsed().as_secs_f64());
    }
}
