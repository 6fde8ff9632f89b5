use nvsmi_collector::GpuCollector;
use prometheus::Registry;

use crate::exposition;

pub struct AppState {
    pub collector: GpuCollector,
    pub registry: Registry,
}

impl AppState {
    pub fn new(collector: GpuCollector) -> prometheus::Result<Self> {
        Ok(Self {
            collector,
            registry: exposition::base_registry()?,
        })
    }
}
