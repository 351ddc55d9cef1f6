//! ASR hypotheses and the shapes they arrive in.
//!
//! Speech recognisers report each spoken utterance as a ranked list of
//! alternative transcriptions. A turn may contain several utterances, so the
//! full input is a list of lists. Plugins mostly want flat transcripts: one
//! string per way of reading the whole turn. [`transcripts`] builds those
//! as the cross product of alternatives, in rank order.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::NluError;

/// One candidate transcription of an utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub transcript: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Hypothesis {
    pub fn new(transcript: impl Into<String>) -> Self {
        Hypothesis {
            transcript: transcript.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Ordered utterances, each an ordered list of alternatives.
pub type Utterances = Vec<Vec<Hypothesis>>;

/// Flatten utterances into whole-turn transcripts.
///
/// Every combination of one alternative per utterance is joined with a
/// single space. The first utterance varies slowest.
pub fn transcripts(utterances: &[Vec<Hypothesis>]) -> Vec<String> {
    if utterances.is_empty() {
        return Vec::new();
    }

    utterances
        .iter()
        .map(|alternatives| alternatives.iter().map(|h| h.transcript.as_str()))
        .multi_cartesian_product()
        .map(|combination| combination.join(" "))
        .collect()
}

/// Read utterances out of any recognised ASR output shape.
///
/// Accepted shapes:
///
/// - `[[{"transcript": ..}, ..], ..]` several utterances
/// - `[{"transcript": ..}, ..]` one utterance
/// - `["..", ..]` one utterance of bare strings
/// - `".."` a single transcript
/// - `null`, `""` or `[]` nothing was heard
pub fn parse_utterances(value: &Value) -> Result<Utterances, NluError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(text) if text.is_empty() => Ok(Vec::new()),
        Value::String(text) => Ok(vec![vec![Hypothesis::new(text.clone())]]),
        Value::Array(items) if items.is_empty() => Ok(Vec::new()),
        Value::Array(items) => match &items[0] {
            Value::Array(_) => items.iter().map(parse_alternatives).collect(),
            Value::Object(_) | Value::String(_) => Ok(vec![parse_alternatives(value)?]),
            other => Err(unrecognised(other)),
        },
        other => Err(unrecognised(other)),
    }
}

/// Normalize ASR output of any recognised shape into flat transcripts.
pub fn normalize(value: &Value) -> Result<Vec<String>, NluError> {
    Ok(transcripts(&parse_utterances(value)?))
}

/// Read transcripts out of a training cell.
///
/// Cells hold ASR output either as JSON or as a JSON-encoded string. A
/// string that does not decode to a recognised shape is a transcript.
pub fn normalize_cell(cell: &Value) -> Result<Vec<String>, NluError> {
    if let Value::String(text) = cell {
        if let Ok(decoded) = serde_json::from_str::<Value>(text) {
            if let Ok(transcripts) = normalize(&decoded) {
                return Ok(transcripts);
            }
        }
    }
    normalize(cell)
}

fn parse_alternatives(value: &Value) -> Result<Vec<Hypothesis>, NluError> {
    let Value::Array(items) = value else {
        return Err(unrecognised(value));
    };

    items
        .iter()
        .map(|item| match item {
            Value::String(text) => Ok(Hypothesis::new(text.clone())),
            Value::Object(fields) if fields.contains_key("transcript") => {
                Ok(serde_json::from_value(item.clone())?)
            }
            other => Err(unrecognised(other)),
        })
        .collect()
}

fn unrecognised(value: &Value) -> NluError {
    NluError::InputShape(format!("unrecognised utterance shape: {value}"))
}
