//! Parsing of `--format=csv,noheader,nounits` output.

use std::num::ParseFloatError;

use csv::{ReaderBuilder, StringRecord, Trim};
use nvsmi_core::{MetricDefinition, MetricSchema};
use thiserror::Error;

pub const NAME_FIELD: &str = "name";
pub const UUID_FIELD: &str = "uuid";

/// Marker nvidia-smi prints for fields a device does not support. It shows up
/// both bare and bracketed, so matching is by substring.
pub const NOT_APPLICABLE: &str = "N/A";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RowError {
    #[error("expected {expected} columns, found {found}")]
    ColumnCount { expected: usize, found: usize },
}

/// Splits tool output into records. Leading padding after each comma is trimmed
/// and every record must have the same number of fields. Trailing whitespace is
/// trimmed as well, so `"61 "` parses as a value instead of failing.
pub fn parse_records(output: &str) -> Result<Vec<StringRecord>, csv::Error> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .trim(Trim::Fields)
        .from_reader(output.as_bytes());

    reader.records().collect()
}

/// Columns requested from nvidia-smi for a device query, each paired with the
/// definition it feeds. `name` and `uuid` always come first.
#[derive(Debug, Clone)]
pub struct QueryPlan<'a> {
    columns: Vec<&'a MetricDefinition>,
}

impl<'a> QueryPlan<'a> {
    pub fn new(schema: &'a MetricSchema) -> Self {
        Self {
            columns: schema.definitions().collect(),
        }
    }

    /// Field list to pass to `--query-gpu`, in column order.
    pub fn fields(&self) -> Vec<&'a str> {
        let mut fields = Vec::with_capacity(self.width());
        fields.push(NAME_FIELD);
        fields.push(UUID_FIELD);
        fields.extend(self.columns.iter().map(|d| d.query_key.as_str()));
        fields
    }

    pub fn width(&self) -> usize {
        self.columns.len() + 2
    }

    pub fn bind(&self, record: &StringRecord) -> Result<DeviceRow<'a>, RowError> {
        if record.len() != self.width() {
            return Err(RowError::ColumnCount {
                expected: self.width(),
                found: record.len(),
            });
        }

        let name = record.get(0).unwrap_or_default().to_string();
        let uuid = record.get(1).unwrap_or_default().to_string();
        let values = self
            .columns
            .iter()
            .copied()
            .zip(record.iter().skip(2))
            .map(|(definition, raw)| (definition, raw.to_string()))
            .collect();

        Ok(DeviceRow { name, uuid, values })
    }
}

/// One device as reported in a single scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRow<'a> {
    pub name: String,
    pub uuid: String,
    pub values: Vec<(&'a MetricDefinition, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    NotApplicable,
    Value(f64),
    Invalid(ParseFloatError),
}

impl FieldValue {
    pub fn parse(raw: &str) -> Self {
        if raw.contains(NOT_APPLICABLE) {
            return Self::NotApplicable;
        }
        match raw.parse::<f64>() {
            Ok(value) => Self::Value(value),
            Err(e) => Self::Invalid(e),
        }
    }
}
