use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::item::Item;

/// Single-level column -> scalar mapping. Columns keep first-seen order.
pub type Row = Map<String, Value>;

/// Column used when the item itself is not a mapping.
const VALUE_COLUMN: &str = "value";

/// Flatten one nested value into a row.
///
/// - a mapping under `k` with child `c` becomes column `k_c`, recursively;
/// - a sequence becomes one column holding its JSON text, in original order;
/// - scalars are copied as they are.
///
/// Column names are joined with a literal underscore and no collision
/// avoidance: `{"a_b": 1, "a": {"b": 2}}` yields a single `a_b` column holding
/// the value written last (`2`), at the position where `a_b` first appeared.
/// Empty nested mappings emit no column.
pub fn flatten_value(value: &Value) -> Row {
    let mut row = Row::new();
    match value {
        Value::Object(fields) => {
            for (name, child) in fields {
                flatten_into(&mut row, name.clone(), child);
            }
        }
        other => flatten_into(&mut row, VALUE_COLUMN.to_string(), other),
    }
    row
}

fn flatten_into(row: &mut Row, column: String, value: &Value) {
    match value {
        Value::Object(fields) => {
            for (name, child) in fields {
                flatten_into(row, format!("{column}_{name}"), child);
            }
        }
        Value::Array(_) => {
            row.insert(column, Value::String(value.to_string()));
        }
        scalar => {
            row.insert(column, scalar.clone());
        }
    }
}

/// Turns items into rows and tracks the union of columns across everything it
/// has flattened, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct Flattener {
    context: Row,
    columns: Vec<String>,
    known: HashSet<String>,
}

impl Flattener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every row starts with these columns (e.g. the category a batch came from).
    /// Item fields with the same name overwrite the context value in place.
    pub fn with_context(context: Row) -> Self {
        let mut flattener = Self::default();
        for name in context.keys() {
            flattener.note_column(name);
        }
        flattener.context = context;
        flattener
    }

    pub fn flatten(&mut self, item: &Item) -> Row {
        let mut row = self.context.clone();
        for (name, value) in flatten_value(&item.record) {
            row.insert(name, value);
        }
        for name in row.keys() {
            self.note_column(name);
        }
        row
    }

    pub fn flatten_all(&mut self, items: &[Item]) -> Vec<Row> {
        items.iter().map(|item| self.flatten(item)).collect()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn note_column(&mut self, name: &str) {
        if self.known.insert(name.to_string()) {
            self.columns.push(name.to_string());
        }
    }
}

/// Positional record for tabular sinks; missing columns become `null`.
pub fn align(row: &Row, columns: &[String]) -> Vec<Value> {
    columns
        .iter()
        .map(|name| row.get(name).cloned().unwrap_or(Value::Null))
        .collect()
}
