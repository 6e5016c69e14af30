use crate::{
    core::{
        identifiers::ItemId,
        value::{FieldValue, Value},
    },
    records::schema::Schema,
};
use serde::{Deserialize, Serialize};

/// One resolved output row, keyed by the id of the work item it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: ItemId,
    pub fields: Vec<FieldValue>,
}

impl Record {
    pub fn new(id: ItemId) -> Self {
        Record {
            id,
            fields: Vec::new(),
        }
    }

    /// Sets `name` to `value`, replacing an earlier value of the same field.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => field.value = value,
            None => self.fields.push(FieldValue {
                name: name.to_string(),
                value,
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Names of required schema columns that are missing or blank.
    /// The key column is satisfied by the record id.
    pub fn missing_required<'a>(&self, schema: &'a Schema) -> Vec<&'a str> {
        schema
            .columns()
            .iter()
            .skip(1)
            .filter(|c| c.required)
            .filter(|c| self.get(&c.name).is_none_or(Value::is_blank))
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Values laid out in schema order; unknown fields are dropped, absent ones are empty.
    pub fn to_row(&self, schema: &Schema) -> Vec<String> {
        let mut row = Vec::with_capacity(schema.columns().len());
        row.push(self.id.to_string());
        for column in schema.columns().iter().skip(1) {
            row.push(self.get(&column.name).map(Value::to_string).unwrap_or_default());
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new("conference_id")
            .required("title")
            .optional("year")
            .required("paper_count")
    }

    #[test]
    fn row_follows_schema_order() {
        let record = Record::new(ItemId::from("42"))
            .with("paper_count", 3_i64)
            .with("extra", "ignored")
            .with("title", "Civil Engineering");

        assert_eq!(
            record.to_row(&schema()),
            vec!["42", "Civil Engineering", "", "3"]
        );
    }

    #[test]
    fn blank_required_fields_are_reported() {
        let record = Record::new(ItemId::from("42"))
            .with("title", "   ")
            .with("year", Value::Null);

        assert_eq!(record.missing_required(&schema()), vec!["title", "paper_count"]);
    }

    #[test]
    fn set_replaces_existing_field() {
        let mut record = Record::new(ItemId::from("1")).with("title", "a");
        record.set("title", "b");
        assert_eq!(record.fields.len(), 1);
        assert_eq!(record.get("title"), Some(&Value::from("b")));
    }
}
