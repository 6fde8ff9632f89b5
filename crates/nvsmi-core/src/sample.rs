use crate::schema::MetricDefinition;

/// One observation for a single scrape cycle. `label_values` line up with
/// `definition.label_names` by position.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<'a> {
    pub definition: &'a MetricDefinition,
    pub value: f64,
    pub label_values: Vec<String>,
}

impl<'a> Sample<'a> {
    pub fn new(definition: &'a MetricDefinition, value: f64, label_values: Vec<String>) -> Self {
        Self {
            definition,
            value,
            label_values,
        }
    }

    pub fn metric_name(&self) -> &str {
        &self.definition.metric_name
    }

    /// Value of the label called `name`, if the definition has one.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.definition
            .label_names
            .iter()
            .position(|l| l == name)
            .and_then(|i| self.label_values.get(i))
            .map(String::as_str)
    }
}
