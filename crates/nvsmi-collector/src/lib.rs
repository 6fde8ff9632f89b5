pub mod collector;
pub mod parse;
pub mod smi;

pub use collector::GpuCollector;
pub use parse::{DeviceRow, FieldValue, QueryPlan, RowError};
pub use smi::{NvidiaSmi, SmiError, SmiRunner};
