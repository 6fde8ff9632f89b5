use std::sync::Arc;

use nvsmi_core::{MetricSchema, Sample};
use tracing::{debug, error, instrument, warn};

use crate::parse::{parse_records, DeviceRow, FieldValue, QueryPlan};
use crate::smi::SmiRunner;

/// Turns nvidia-smi output into samples, once per scrape.
///
/// Every call runs the tool twice, driver version first, and keeps nothing
/// between calls. Failures are logged and only drop the samples they affect.
pub struct GpuCollector {
    schema: Arc<MetricSchema>,
    runner: Arc<dyn SmiRunner>,
}

impl GpuCollector {
    pub fn new(schema: Arc<MetricSchema>, runner: Arc<dyn SmiRunner>) -> Self {
        Self { schema, runner }
    }

    pub fn schema(&self) -> &MetricSchema {
        &self.schema
    }

    pub async fn collect(&self) -> Vec<Sample<'_>> {
        let mut samples = Vec::new();
        self.collect_driver_version(&mut samples).await;
        self.collect_devices(&mut samples).await;
        samples
    }

    #[instrument(skip_all)]
    async fn collect_driver_version<'a>(&'a self, samples: &mut Vec<Sample<'a>>) {
        let driver = self.schema.driver();

        let output = match self.runner.query(&[driver.query_key.as_str()]).await {
            Ok(output) => output,
            Err(e) => {
                error!("Driver version query failed: {}", e);
                return;
            }
        };

        let records = match parse_records(&output) {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to parse driver version output: {}", e);
                return;
            }
        };

        // Every GPU reports the same driver, and a second sample with the
        // same label value would be rejected by the encoder.
        if let Some(version) = records.first().and_then(|r| r.get(0)) {
            samples.push(Sample::new(driver, 1.0, vec![version.to_string()]));
        }
    }

    #[instrument(skip_all)]
    async fn collect_devices<'a>(&'a self, samples: &mut Vec<Sample<'a>>) {
        let plan = QueryPlan::new(&self.schema);

        let output = match self.runner.query(&plan.fields()).await {
            Ok(output) => output,
            Err(e) => {
                error!("Device metrics query failed: {}", e);
                return;
            }
        };

        let records = match parse_records(&output) {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to parse device metrics output: {}", e);
                return;
            }
        };

        debug!(devices = records.len(), "Parsed nvidia-smi output");

        for (index, record) in records.iter().enumerate() {
            match plan.bind(record) {
                Ok(row) => handle_row(&row, samples),
                Err(e) => warn!(row = index, "Skipping device row: {}", e),
            }
        }
    }
}

fn handle_row<'a>(row: &DeviceRow<'a>, samples: &mut Vec<Sample<'a>>) {
    for &(definition, ref raw) in &row.values {
        match FieldValue::parse(raw) {
            FieldValue::NotApplicable => continue,
            FieldValue::Invalid(e) => {
                warn!(
                    "error with {} with value {}: {}",
                    definition.query_key, raw, e
                );
            }
            FieldValue::Value(value) => samples.push(Sample::new(
                definition,
                value,
                vec![row.uuid.clone(), row.name.clone()],
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use nvsmi_core::DRIVER_QUERY_KEY;

    use crate::smi::SmiError;

    enum Devices {
        Table(Vec<HashMap<&'static str, &'static str>>),
        Raw(&'static str),
        Fail,
    }

    /// Renders CSV in whatever field order it is asked for. Fields missing from
    /// a device come back as `[N/A]`.
    struct FakeRunner {
        driver: Option<&'static str>,
        devices: Devices,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl FakeRunner {
        fn new(driver: Option<&'static str>, devices: Devices) -> Arc<Self> {
            Arc::new(Self {
                driver,
                devices,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    fn failed() -> SmiError {
        SmiError::Failed {
            status: "exit status: 9".to_string(),
            output: "NVIDIA-SMI has failed".to_string(),
        }
    }

    #[async_trait]
    impl SmiRunner for FakeRunner {
        async fn query(&self, fields: &[&str]) -> Result<String, SmiError> {
            self.calls
                .lock()
                .unwrap()
                .push(fields.iter().map(|f| f.to_string()).collect());

            if fields == [DRIVER_QUERY_KEY] {
                return self.driver.map(String::from).ok_or_else(failed);
            }

            match &self.devices {
                Devices::Table(devices) => Ok(devices
                    .iter()
                    .map(|device| {
                        fields
                            .iter()
                            .map(|f| device.get(f).copied().unwrap_or("[N/A]"))
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .collect::<Vec<_>>()
                    .join("\n")),
                Devices::Raw(output) => Ok(output.to_string()),
                Devices::Fail => Err(failed()),
            }
        }
    }

    fn device(
        name: &'static str,
        uuid: &'static str,
        values: &[(&'static str, &'static str)],
    ) -> HashMap<&'static str, &'static str> {
        let mut device: HashMap<_, _> = values.iter().copied().collect();
        device.insert("name", name);
        device.insert("uuid", uuid);
        device
    }

    fn full_device(name: &'static str, uuid: &'static str) -> HashMap<&'static str, &'static str> {
        device(
            name,
            uuid,
            &[
                ("temperature.gpu", "61"),
                ("temperature.memory", "70"),
                ("utilization.gpu", "87"),
                ("memory.total", "15360"),
                ("memory.used", "10240"),
                ("memory.free", "5120"),
                ("fan.speed", "40"),
                ("power.draw", "68.25"),
                ("clocks.current.graphics", "1590"),
                ("clocks.current.sm", "1590"),
                ("clocks.current.memory", "5000"),
                ("clocks.current.video", "1470"),
            ],
        )
    }

    fn collector(runner: Arc<FakeRunner>) -> GpuCollector {
        GpuCollector::new(Arc::new(MetricSchema::nvidia().unwrap()), runner)
    }

    #[tokio::test]
    async fn test_single_field_sample() {
        let runner = FakeRunner::new(
            Some("550.54.15\n"),
            Devices::Table(vec![device(
                "Tesla T4",
                "GPU-abc",
                &[("temperature.gpu", "123.45")],
            )]),
        );
        let collector = collector(runner);

        let samples = collector.collect().await;
        let device_samples: Vec<_> = samples
            .iter()
            .filter(|s| s.metric_name() != "gpu_driver")
            .collect();

        assert_eq!(device_samples.len(), 1);
        let sample = device_samples[0];
        assert_eq!(sample.metric_name(), "gpu_temperature");
        assert_eq!(sample.value, 123.45);
        assert_eq!(sample.label_values, vec!["GPU-abc", "Tesla T4"]);
    }

    #[tokio::test]
    async fn test_driver_version_emitted_once() {
        let runner = FakeRunner::new(
            Some("550.54.15\n550.54.15\n"),
            Devices::Table(Vec::new()),
        );
        let collector = collector(runner);

        let samples = collector.collect().await;

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].metric_name(), "gpu_driver");
        assert_eq!(samples[0].value, 1.0);
        assert_eq!(samples[0].label_values, vec!["550.54.15"]);
    }

    #[tokio::test]
    async fn test_driver_survives_device_failure() {
        let collector = collector(FakeRunner::new(Some("550.54.15\n"), Devices::Fail));

        let samples = collector.collect().await;

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].label("driver"), Some("550.54.15"));
    }

    #[tokio::test]
    async fn test_devices_survive_driver_failure() {
        let collector = collector(FakeRunner::new(
            None,
            Devices::Table(vec![full_device("Tesla T4", "GPU-abc")]),
        ));

        let samples = collector.collect().await;

        assert_eq!(samples.len(), 12);
        assert!(samples.iter().all(|s| s.metric_name() != "gpu_driver"));
    }

    #[tokio::test]
    async fn test_one_sample_per_metric_and_device() {
        let collector = collector(FakeRunner::new(
            Some("550.54.15\n550.54.15\n"),
            Devices::Table(vec![
                full_device("Tesla T4", "GPU-abc"),
                full_device("Tesla T4", "GPU-def"),
            ]),
        ));

        let samples = collector.collect().await;

        assert_eq!(samples.len(), 2 * 12 + 1);
        for uuid in ["GPU-abc", "GPU-def"] {
            let per_device: Vec<_> = samples
                .iter()
                .filter(|s| s.label("uuid") == Some(uuid))
                .collect();
            assert_eq!(per_device.len(), 12);
        }

        let power = samples
            .iter()
            .find(|s| s.metric_name() == "gpu_power_draw" && s.label("uuid") == Some("GPU-def"))
            .unwrap();
        assert_eq!(power.value, 68.25);
        assert_eq!(power.label("name"), Some("Tesla T4"));
    }

    #[tokio::test]
    async fn test_bad_fields_only_drop_themselves() {
        let collector = collector(FakeRunner::new(
            None,
            Devices::Table(vec![device(
                "Tesla T4",
                "GPU-abc",
                &[
                    ("temperature.gpu", "61"),
                    ("fan.speed", "[Unknown Error]"),
                    ("power.draw", "N/A"),
                    ("memory.used", "1024"),
                ],
            )]),
        ));

        let samples = collector.collect().await;
        let mut names: Vec<_> = samples.iter().map(|s| s.metric_name()).collect();
        names.sort();

        assert_eq!(names, vec!["gpu_memory_used", "gpu_temperature"]);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_only_unparsable_fields_warn() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let collector = collector(FakeRunner::new(
            Some("550.54.15\n"),
            Devices::Table(vec![device(
                "Tesla T4",
                "GPU-abc",
                &[
                    ("temperature.gpu", "[N/A]"),
                    ("power.draw", "N/A"),
                    ("fan.speed", "bad"),
                    ("memory.used", "1024"),
                ],
            )]),
        ));

        let samples = collector.collect().await;
        assert_eq!(samples.len(), 2);

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let warnings: Vec<_> = output.lines().filter(|l| l.contains("WARN")).collect();
        assert_eq!(warnings.len(), 1, "unexpected log output: {}", output);
        assert!(warnings[0].contains("fan.speed"));
        assert!(warnings[0].contains("bad"));
    }

    #[tokio::test]
    async fn test_malformed_output_yields_no_device_samples() {
        let collector = collector(FakeRunner::new(
            Some("550.54.15\n"),
            Devices::Raw("Tesla T4, GPU-abc, 1\nTesla T4\n"),
        ));

        let samples = collector.collect().await;

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].metric_name(), "gpu_driver");
    }

    #[tokio::test]
    async fn test_wrong_column_count_skips_rows() {
        let collector = collector(FakeRunner::new(
            None,
            Devices::Raw("Tesla T4, GPU-abc, 61\nTesla T4, GPU-def, 62\n"),
        ));

        assert!(collector.collect().await.is_empty());
    }

    #[tokio::test]
    async fn test_requested_fields() {
        let runner = FakeRunner::new(Some("550.54.15\n"), Devices::Table(Vec::new()));
        let collector = collector(runner.clone());

        collector.collect().await;

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], vec!["driver_version"]);
        assert_eq!(calls[1][..2], ["name", "uuid"]);

        let keys: Vec<_> = collector.schema().query_keys().collect();
        assert_eq!(calls[1][2..], keys[..]);
    }

    #[tokio::test]
    async fn test_repeated_collection_is_identical() {
        let collector = collector(FakeRunner::new(
            Some("550.54.15\n"),
            Devices::Table(vec![
                full_device("Tesla T4", "GPU-abc"),
                device("Tesla V100", "GPU-def", &[("utilization.gpu", "12")]),
            ]),
        ));

        let first = collector.collect().await;
        let second = collector.collect().await;

        assert!(!first.is_empty());
        assert_eq!(first, second);
    }
}
