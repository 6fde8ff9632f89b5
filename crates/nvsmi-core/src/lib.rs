// Domain modules
pub mod config;
pub mod error;
pub mod sample;
pub mod schema;

pub use config::{ExporterConfig, SmiConfig};
pub use error::{NvsmiError, Result};
pub use sample::Sample;
pub use schema::{
    MetricDefinition, MetricSchema, SchemaBuilder, DEVICE_LABELS, DRIVER_LABELS, DRIVER_QUERY_KEY,
};
