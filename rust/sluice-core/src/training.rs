//! Row-oriented training data.
//!
//! Plugins agree out of band on column names: one may read a column of raw
//! ASR alternatives and write a merged-feature column that a downstream
//! classifier reads.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Row = IndexMap<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrainingSet {
    rows: Vec<Row>,
}

impl TrainingSet {
    pub fn new(rows: Vec<Row>) -> Self {
        TrainingSet { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Values of `column` in row order; rows lacking it yield `None`.
    pub fn column<'a>(&'a self, column: &'a str) -> impl Iterator<Item = Option<&'a Value>> + 'a {
        self.rows.iter().map(move |row| row.get(column))
    }
}

impl FromIterator<Row> for TrainingSet {
    fn from_iter<I: IntoIterator<Item = Row>>(rows: I) -> Self {
        TrainingSet::new(rows.into_iter().collect())
    }
}
