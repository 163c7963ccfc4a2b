use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub batch_items_total: IntCounterVec,
    pub attempts_total: IntCounterVec,
    pub cod_credited_total: IntCounter,
    pub cod_reconciled_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new(
                "transitions_total",
                "Guarded status transitions by entity and outcome",
            ),
            &["entity", "outcome"],
        )
        .expect("valid transitions_total metric");

        let batch_items_total = IntCounterVec::new(
            Opts::new("batch_items_total", "Items processed by batch operations"),
            &["operation", "outcome"],
        )
        .expect("valid batch_items_total metric");

        let attempts_total = IntCounterVec::new(
            Opts::new("attempts_total", "Recorded delivery attempts by outcome"),
            &["outcome"],
        )
        .expect("valid attempts_total metric");

        let cod_credited_total = IntCounter::new(
            "cod_credited_total",
            "COD amount credited to couriers, minor units",
        )
        .expect("valid cod_credited_total metric");

        let cod_reconciled_total = IntCounter::new(
            "cod_reconciled_total",
            "COD amount reconciled against couriers, minor units",
        )
        .expect("valid cod_reconciled_total metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(batch_items_total.clone()))
            .expect("register batch_items_total");
        registry
            .register(Box::new(attempts_total.clone()))
            .expect("register attempts_total");
        registry
            .register(Box::new(cod_credited_total.clone()))
            .expect("register cod_credited_total");
        registry
            .register(Box::new(cod_reconciled_total.clone()))
            .expect("register cod_reconciled_total");

        Self {
            registry,
            transitions_total,
            batch_items_total,
            attempts_total,
            cod_credited_total,
            cod_reconciled_total,
        }
    }

    pub fn transition(&self, entity: &str, applied: bool) {
        let outcome = if applied { "applied" } else { "not_modified" };
        self.transitions_total
            .with_label_values(&[entity, outcome])
            .inc();
    }

    pub fn batch(&self, operation: &str, succeeded: usize, failed: usize) {
        self.batch_items_total
            .with_label_values(&[operation, "succeeded"])
            .inc_by(succeeded as u64);
        self.batch_items_total
            .with_label_values(&[operation, "failed"])
            .inc_by(failed as u64);
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
