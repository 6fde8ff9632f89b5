//! Metric schema: which nvidia-smi fields are queried and how they are exposed.
//!
//! Adding a field means picking a query key listed by `nvidia-smi --help-query-gpu`,
//! a metric name nobody else uses, and a help text. Per-device metrics always carry
//! the [`DEVICE_LABELS`] pair.

use std::collections::{BTreeMap, HashMap, HashSet};

use prometheus::core::Desc;

use crate::error::{NvsmiError, Result};

/// Label names carried by every per-device metric, in this order.
pub const DEVICE_LABELS: [&str; 2] = ["uuid", "name"];

/// Label names carried by the driver info metric.
pub const DRIVER_LABELS: [&str; 1] = ["driver"];

/// Query key for the driver version.
pub const DRIVER_QUERY_KEY: &str = "driver_version";

const DRIVER_METRIC: &str = "gpu_driver";
const DRIVER_HELP: &str =
    "The version of the installed NVIDIA display driver. This is an alphanumeric string.";

/// Public identity of one telemetry field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDefinition {
    pub query_key: String,
    pub metric_name: String,
    pub help: String,
    pub label_names: Vec<String>,
}

impl MetricDefinition {
    fn new(query_key: &str, metric_name: &str, help: &str, labels: &[&str]) -> Result<Self> {
        let definition = Self {
            query_key: query_key.to_string(),
            metric_name: metric_name.to_string(),
            help: help.trim().to_string(),
            label_names: labels.iter().map(|l| l.to_string()).collect(),
        };
        definition.describe()?;
        Ok(definition)
    }

    /// Prometheus descriptor for this definition. Fails on names the exposition
    /// format rejects.
    pub fn describe(&self) -> Result<Desc> {
        Desc::new(
            self.metric_name.clone(),
            self.help.clone(),
            self.label_names.clone(),
            HashMap::new(),
        )
        .map_err(|e| NvsmiError::InvalidDefinition {
            metric: self.metric_name.clone(),
            reason: e.to_string(),
        })
    }
}

/// Immutable set of metric definitions, built once at startup.
#[derive(Debug, Clone)]
pub struct MetricSchema {
    metrics: BTreeMap<String, MetricDefinition>,
    driver: MetricDefinition,
}

impl MetricSchema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// The fields this exporter reports by default.
    pub fn nvidia() -> Result<Self> {
        Self::builder()
            .driver(DRIVER_METRIC, DRIVER_HELP)?
            .register(
                "temperature.gpu",
                "gpu_temperature",
                "Core GPU temperature. in degrees C.",
            )?
            .register(
                "temperature.memory",
                "gpu_memory_temperature",
                "HBM memory temperature. in degrees C.",
            )?
            .register(
                "utilization.gpu",
                "gpu_utilization",
                "Percent of time over the past sample period during which one or more kernels was executing on the GPU.",
            )?
            .register(
                "memory.total",
                "gpu_memory_total",
                "Total installed GPU memory. In MiB.",
            )?
            .register(
                "memory.used",
                "gpu_memory_used",
                "Total memory allocated by active contexts. In MiB.",
            )?
            .register("memory.free", "gpu_memory_free", "Total free memory. In MiB.")?
            .register(
                "fan.speed",
                "gpu_fan_speed",
                "The fan speed value is the percent of the product's maximum noise tolerance fan speed that the device's fan is currently intended to run at.",
            )?
            .register(
                "power.draw",
                "gpu_power_draw",
                "The last measured power draw for the entire board, in watts. Only available if power management is supported. This reading is accurate to within +/- 5 watts.",
            )?
            .register(
                "clocks.current.graphics",
                "gpu_graphics_clock_speed",
                "Current frequency of graphics (shader) clock. In megahertz",
            )?
            .register(
                "clocks.current.sm",
                "gpu_sm_clock_speed",
                "Current frequency of SM (Streaming Multiprocessor) clock. In megahertz",
            )?
            .register(
                "clocks.current.memory",
                "gpu_memory_clock_speed",
                "Current frequency of memory clock. In megahertz",
            )?
            .register(
                "clocks.current.video",
                "gpu_video_clock_speed",
                "Current frequency of video encoder/decoder clock. In megahertz",
            )?
            .build()
    }

    /// Query keys in a stable order.
    pub fn query_keys(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }

    pub fn get(&self, query_key: &str) -> Option<&MetricDefinition> {
        self.metrics.get(query_key)
    }

    /// Per-device definitions, ordered by query key.
    pub fn definitions(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.metrics.values()
    }

    pub fn driver(&self) -> &MetricDefinition {
        &self.driver
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    metrics: BTreeMap<String, MetricDefinition>,
    driver: Option<MetricDefinition>,
    names: HashSet<String>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a per-device metric labelled with [`DEVICE_LABELS`].
    pub fn register(mut self, query_key: &str, metric_name: &str, help: &str) -> Result<Self> {
        if self.metrics.contains_key(query_key) {
            return Err(NvsmiError::DuplicateQueryKey(query_key.to_string()));
        }
        let definition = MetricDefinition::new(query_key, metric_name, help, &DEVICE_LABELS)?;
        self.claim_name(metric_name)?;
        self.metrics.insert(query_key.to_string(), definition);
        Ok(self)
    }

    /// Names the driver info metric. Without it, `build` falls back to `gpu_driver`.
    pub fn driver(mut self, metric_name: &str, help: &str) -> Result<Self> {
        if let Some(previous) = self.driver.take() {
            self.names.remove(&previous.metric_name);
        }
        let definition = MetricDefinition::new(DRIVER_QUERY_KEY, metric_name, help, &DRIVER_LABELS)?;
        self.claim_name(metric_name)?;
        self.driver = Some(definition);
        Ok(self)
    }

    pub fn build(self) -> Result<MetricSchema> {
        let driver = match self.driver {
            Some(driver) => driver,
            None => {
                if self.names.contains(DRIVER_METRIC) {
                    return Err(NvsmiError::DuplicateMetricName(DRIVER_METRIC.to_string()));
                }
                MetricDefinition::new(DRIVER_QUERY_KEY, DRIVER_METRIC, DRIVER_HELP, &DRIVER_LABELS)?
            }
        };

        Ok(MetricSchema {
            metrics: self.metrics,
            driver,
        })
    }

    fn claim_name(&mut self, metric_name: &str) -> Result<()> {
        if !self.names.insert(metric_name.to_string()) {
            return Err(NvsmiError::DuplicateMetricName(metric_name.to_string()));
        }
        Ok(())
    }
}
