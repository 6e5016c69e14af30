use serde::{Deserialize, Serialize};

/// A column of the success output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Required columns must be present and non-blank for a fetch to count as a success.
    pub required: bool,
}

/// Fixed, ordered column layout of the success output.
///
/// The first column is the key column and always carries the item id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(key: &str) -> Self {
        Schema {
            columns: vec![Column {
                name: key.to_string(),
                required: true,
            }],
        }
    }

    pub fn required(mut self, name: &str) -> Self {
        self.columns.push(Column {
            name: name.to_string(),
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: &str) -> Self {
        self.columns.push(Column {
            name: name.to_string(),
            required: false,
        });
        self
    }

    pub fn key(&self) -> &str {
        &self.columns[0].name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn header(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}
