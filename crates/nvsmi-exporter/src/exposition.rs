//! Prometheus text exposition of one scrape's samples.

use std::collections::HashMap;

use nvsmi_core::{MetricSchema, Sample};
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExpositionError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("Sample for unregistered metric: {0}")]
    UnknownMetric(String),

    #[error("Exposition is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub fn content_type() -> String {
    TextEncoder::new().format_type().to_string()
}

/// Long-lived registry for metrics about the exporter process itself.
pub fn base_registry() -> prometheus::Result<Registry> {
    let registry = Registry::new();

    #[cfg(target_os = "linux")]
    registry.register(Box::new(
        prometheus::process_collector::ProcessCollector::for_self(),
    ))?;

    Ok(registry)
}

/// Encodes `samples` together with everything in `base`.
///
/// Stands in for a `prometheus::core::Collector`, whose `collect` is synchronous
/// while `SmiRunner` is async: samples are gathered first, then encoded here.
/// Gauges live in a registry built for this call only, so nothing from a
/// previous scrape leaks into the output. Metrics without samples are left out.
pub fn render(
    schema: &MetricSchema,
    samples: &[Sample<'_>],
    base: &Registry,
) -> Result<String, ExpositionError> {
    let scrape = Registry::new();
    let mut gauges = HashMap::new();

    for definition in schema.definitions().chain(std::iter::once(schema.driver())) {
        let labels: Vec<&str> = definition.label_names.iter().map(String::as_str).collect();
        let gauge = GaugeVec::new(
            Opts::new(definition.metric_name.clone(), definition.help.clone()),
            &labels,
        )?;
        scrape.register(Box::new(gauge.clone()))?;
        gauges.insert(definition.metric_name.as_str(), gauge);
    }

    for sample in samples {
        let gauge = gauges
            .get(sample.metric_name())
            .ok_or_else(|| ExpositionError::UnknownMetric(sample.metric_name().to_string()))?;
        let values: Vec<&str> = sample.label_values.iter().map(String::as_str).collect();
        gauge.get_metric_with_label_values(&values)?.set(sample.value);
    }

    let mut families = base.gather();
    families.extend(scrape.gather());

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
