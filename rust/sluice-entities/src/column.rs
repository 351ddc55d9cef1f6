//! Training-table helpers shared by the extractor plugins.

use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;
use sluice_core::{Entity, NluError, Row, utterance};
use tracing::warn;

/// Which columns an extractor reads and writes when transforming training
/// data. Transforming is off unless `output_column` is set.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TransformColumns {
    pub input_column: String,
    pub output_column: Option<String>,
    pub reference_time_column: String,
}

impl Default for TransformColumns {
    fn default() -> Self {
        TransformColumns {
            input_column: "alternatives".into(),
            output_column: None,
            reference_time_column: "reftime".into(),
        }
    }
}

/// Reference time of a training row in unix milliseconds.
///
/// Accepts an integer timestamp or an ISO 8601 datetime string. A missing
/// or null cell means the row has none.
pub fn reference_time(row: &Row, column: &str) -> Result<Option<i64>, NluError> {
    match row.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number.as_i64().map(Some).ok_or_else(|| {
            NluError::InputShape(format!("reference time {number} is not an integer"))
        }),
        Some(Value::String(text)) => DateTime::parse_from_rfc3339(text)
            .map(|parsed| Some(parsed.timestamp_millis()))
            .map_err(|error| {
                NluError::InputShape(format!("reference time '{text}' is not a datetime: {error}"))
            }),
        Some(other) => Err(NluError::InputShape(format!(
            "reference time {other} should be a unix timestamp or an ISO 8601 string"
        ))),
    }
}

/// Transcripts held in `column`. A missing cell means there are none.
pub fn transcripts(row: &Row, column: &str) -> Result<Vec<String>, NluError> {
    row.get(column)
        .map_or_else(|| Ok(Vec::new()), utterance::normalize_cell)
}

pub fn report_dropped(plugin: &str, dropped: usize) {
    if dropped > 0 {
        warn!(plugin, dropped, "discarded training rows that could not be read");
    }
}

/// Add `entities` to the list already in `column`, creating it if needed.
pub fn append_entities(row: &mut Row, column: &str, entities: &[Entity]) -> Result<(), NluError> {
    let encoded = serde_json::to_value(entities)?;
    let Value::Array(mut incoming) = encoded else {
        return Err(NluError::InputShape("entities did not encode as a list".into()));
    };

    match row.get_mut(column) {
        Some(Value::Array(existing)) => existing.append(&mut incoming),
        _ => {
            row.insert(column.to_owned(), Value::Array(incoming));
        }
    }
    Ok(())
}
