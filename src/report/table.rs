use std::fmt;

use rust_decimal::Decimal;

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Int(i64),
    Decimal(Decimal),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(text) => write!(f, "{}", text),
            Value::Int(i) => write!(f, "{}", i),
            Value::Decimal(d) => write!(f, "{}", d),
        }
    }
}

/// Column-named rows handed from the aggregator to the report renderers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: &[&str]) -> Table {
        Table {
            columns: columns.iter().map(|column| column.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// A row shorter than the header leaves its trailing cells empty.
    pub fn push_row(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Positions of `names`, or a `SchemaError` listing every absent one.
    pub fn require(&self, names: &[&str]) -> Result<Vec<usize>, PipelineError> {
        let missing: Vec<&str> = names
            .iter()
            .copied()
            .filter(|name| self.column_index(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::Schema(format!("missing columns: {}", missing.join(", "))));
        }

        Ok(names.iter().filter_map(|name| self.column_index(name)).collect())
    }

    pub fn without_column(&self, name: &str) -> Table {
        let Some(at) = self.column_index(name) else {
            return self.clone();
        };

        let mut columns = self.columns.clone();
        columns.remove(at);
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                if at < row.len() {
                    row.remove(at);
                }
                row
            })
            .collect();

        Table { columns, rows }
    }
}
