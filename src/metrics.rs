//! Prometheus exposition for collected samples.
//!
//! Every scrape builds a fresh `Registry` holding one counter family,
//! `<namespace>_counter{player, namespace, stat}`, and a constant
//! `<namespace>_exporter_build_info` gauge, then encodes it as text.
use crate::collect::MetricSample;
use prometheus::core::{Collector, Desc};
use prometheus::proto::{self, LabelPair, MetricFamily, MetricType};
use prometheus::{Encoder, IntGauge, Opts, Registry, TextEncoder};
use std::collections::HashMap;

/// `Content-Type` of the text exposition format.
pub const CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

const COUNTER_HELP: &str = "Player statistics extracted from save files.";
const LABELS: [&str; 3] = ["player", "namespace", "stat"];

/// The stat counter family for one finished cycle.
///
/// Samples are emitted exactly as collected: two samples with the same label
/// set become two series lines, they are never summed.
pub struct CycleCollector {
    desc: Desc,
    samples: Vec<MetricSample>,
}

impl CycleCollector {
    pub fn new(namespace: &str, samples: Vec<MetricSample>) -> prometheus::Result<Self> {
        let desc = Desc::new(
            format!("{namespace}_counter"),
            COUNTER_HELP.to_string(),
            LABELS.iter().map(|l| l.to_string()).collect(),
            HashMap::new(),
        )?;
        Ok(Self { desc, samples })
    }
}

impl Collector for CycleCollector {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let mut family = MetricFamily::default();
        family.set_name(self.desc.fq_name.clone());
        family.set_help(self.desc.help.clone());
        family.set_field_type(MetricType::COUNTER);

        for sample in &self.samples {
            let mut metric = proto::Metric::default();
            for (name, value) in LABELS.iter().zip([&sample.player, &sample.namespace, &sample.stat]) {
                let mut pair = LabelPair::default();
                pair.set_name(name.to_string());
                pair.set_value(value.clone());
                metric.mut_label().push(pair);
            }
            let mut counter = proto::Counter::default();
            counter.set_value(sample.value);
            metric.set_counter(counter);
            family.mut_metric().push(metric);
        }

        vec![family]
    }
}

fn build_info(namespace: &str) -> prometheus::Result<IntGauge> {
    let gauge = IntGauge::with_opts(
        Opts::new(
            format!("{namespace}_exporter_build_info"),
            "Build information about the exporter.",
        )
        .const_label("version", env!("CARGO_PKG_VERSION")),
    )?;
    gauge.set(1);
    Ok(gauge)
}

/// Full exposition for one scrape. `None` means the cycle failed and no stat
/// samples may be delivered.
pub fn render(namespace: &str, samples: Option<Vec<MetricSample>>) -> prometheus::Result<Vec<u8>> {
    let registry = Registry::new();
    if let Some(samples) = samples {
        registry.register(Box::new(CycleCollector::new(namespace, samples)?))?;
    }
    registry.register(Box::new(build_info(namespace)?))?;

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(buffer)
}
