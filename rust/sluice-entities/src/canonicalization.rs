//! Mask entity spans in transcripts with the entity's type, turning
//! `"fly to bombay"` into `"fly to <city>"` for classifiers.
//!
//! Each entity scoring at least `threshold` rewrites the transcript it was
//! found in, and that rewrite is copied to every hypothesis that agreed on
//! it. Words matching a `mask_tokens` pattern are then replaced by `mask`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use serde_json::Value;
use sluice_core::{
    Destination, Entity, Guard, NluError, OutputKind, Plugin, PluginOutput, RequestState,
    ResponseState, Row, TrainingSet, Wiring, WritePolicy,
};
use tracing::debug;

use crate::column;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CanonicalizationConfig {
    pub name: String,
    pub mask: String,
    /// Whole-word patterns, matched case-insensitively.
    pub mask_tokens: Vec<String>,
    pub threshold: f64,
    pub input_column: String,
    /// Column of encoded entities for each training row.
    pub entity_column: String,
    /// Transforming is off unless this is set.
    pub output_column: Option<String>,
}

impl Default for CanonicalizationConfig {
    fn default() -> Self {
        CanonicalizationConfig {
            name: "canonicalization".into(),
            mask: "MASK".into(),
            mask_tokens: Vec::new(),
            threshold: 0.0,
            input_column: "alternatives".into(),
            entity_column: "entities".into(),
            output_column: None,
        }
    }
}

/// The parts of an entity masking needs, read from a live [`Entity`] or
/// from its encoded form in a training row.
#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Mention {
    entity_type: String,
    range: Range,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    alternative_index: Option<usize>,
    #[serde(default)]
    alternative_indices: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
struct Range {
    start: usize,
    end: usize,
}

impl From<&Entity> for Mention {
    fn from(entity: &Entity) -> Self {
        Mention {
            entity_type: entity.entity_type().to_owned(),
            range: Range {
                start: entity.range().start,
                end: entity.range().end,
            },
            score: entity.score(),
            alternative_index: entity.alternative_index(),
            alternative_indices: entity.alternative_indices().to_vec(),
        }
    }
}

pub struct CanonicalizationPlugin {
    config: CanonicalizationConfig,
    patterns: Vec<Regex>,
    wiring: Wiring,
}

impl CanonicalizationPlugin {
    pub fn new(config: CanonicalizationConfig, wiring: Wiring) -> Result<Self, NluError> {
        let patterns = config
            .mask_tokens
            .iter()
            .map(|token| {
                RegexBuilder::new(&format!(r"\b{token}\b"))
                    .case_insensitive(true)
                    .build()
                    .map_err(|error| {
                        NluError::Configuration(format!("mask token '{token}' is invalid: {error}"))
                    })
            })
            .collect::<Result<_, _>>()?;

        Ok(CanonicalizationPlugin {
            config,
            patterns,
            wiring,
        })
    }

    /// Canonical forms of `transcripts` given the entities found in them.
    pub fn canonicalize(&self, entities: &[Entity], transcripts: &[String]) -> Vec<String> {
        let mentions: Vec<Mention> = entities.iter().map(Mention::from).collect();
        self.mask(&mentions, transcripts)
    }

    fn mask(&self, mentions: &[Mention], transcripts: &[String]) -> Vec<String> {
        let usable: Vec<&Mention> = mentions
            .iter()
            .filter(|mention| mention.score.is_none_or(|score| score >= self.config.threshold))
            .filter(|mention| !mention.alternative_indices.is_empty())
            .collect();

        // Every mention found in a transcript is masked in one rewrite of it.
        let mut by_source: BTreeMap<usize, Vec<&Mention>> = BTreeMap::new();
        for &mention in &usable {
            if let Some(index) = mention.alternative_index {
                by_source.entry(index).or_default().push(mention);
            }
        }
        let rewrites: BTreeMap<usize, String> = by_source
            .into_iter()
            .filter_map(|(index, mentions)| {
                let transcript = transcripts.get(index)?;
                Some((index, replace_spans(transcript, mentions)))
            })
            .collect();

        let mut canonical = transcripts.to_vec();
        for mention in &usable {
            let Some(rewrite) = mention.alternative_index.and_then(|index| rewrites.get(&index))
            else {
                continue;
            };
            for &index in &mention.alternative_indices {
                if let Some(slot) = canonical.get_mut(index) {
                    slot.clone_from(rewrite);
                }
            }
        }

        for transcript in canonical.iter_mut() {
            for pattern in &self.patterns {
                *transcript = pattern
                    .replace_all(transcript, self.config.mask.as_str())
                    .into_owned();
            }
        }
        canonical
    }

    fn canonicalize_row(&self, row: &Row) -> Result<Vec<String>, NluError> {
        let transcripts = column::transcripts(row, &self.config.input_column)?;
        let mentions: Vec<Mention> = match row.get(&self.config.entity_column) {
            None | Some(Value::Null) => Vec::new(),
            Some(cell) => serde_json::from_value(cell.clone())?,
        };
        Ok(self.mask(&mentions, &transcripts))
    }
}

/// Replace each character span with `<entity_type>`. Spans that overlap
/// an earlier one or fall outside the transcript are skipped.
fn replace_spans(transcript: &str, mut mentions: Vec<&Mention>) -> String {
    mentions.sort_by_key(|mention| (mention.range.start, mention.range.end));
    let chars: Vec<char> = transcript.chars().collect();

    let mut rewritten = String::with_capacity(transcript.len());
    let mut cursor = 0;
    for mention in mentions {
        let Range { start, end } = mention.range;
        if start < cursor || start > end || end > chars.len() {
            continue;
        }
        rewritten.extend(&chars[cursor..start]);
        rewritten.push('<');
        rewritten.push_str(&mention.entity_type);
        rewritten.push('>');
        cursor = end;
    }
    rewritten.extend(&chars[cursor..]);
    rewritten
}

#[async_trait]
impl Plugin for CanonicalizationPlugin {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn apply(
        &self,
        request: &RequestState,
        response: &ResponseState,
    ) -> Result<Option<PluginOutput>, NluError> {
        if request.transcripts().is_empty() {
            return Ok(None);
        }
        Ok(Some(PluginOutput::Texts(
            self.canonicalize(response.entities(), request.transcripts()),
        )))
    }

    fn guards(&self) -> &[Guard] {
        &self.wiring.guards
    }

    fn destination(&self) -> Option<Destination> {
        self.wiring.destination
    }

    fn write_policy(&self) -> WritePolicy {
        self.wiring.policy
    }

    fn produces(&self) -> Option<OutputKind> {
        Some(OutputKind::Texts)
    }

    /// Rows whose transcripts or entities cannot be read are dropped.
    async fn transform(&self, data: TrainingSet) -> Result<TrainingSet, NluError> {
        let Some(output_column) = self.config.output_column.as_deref() else {
            return Ok(data);
        };

        let total = data.len();
        let mut kept = Vec::with_capacity(total);
        for (position, mut row) in data.into_rows().into_iter().enumerate() {
            match self.canonicalize_row(&row) {
                Ok(canonical) => {
                    row.insert(output_column.to_owned(), serde_json::to_value(canonical)?);
                    kept.push(row);
                }
                Err(reason) => debug!(row = position, %reason, "dropping training row"),
            }
        }

        column::report_dropped(&self.config.name, total - kept.len());
        Ok(TrainingSet::new(kept))
    }
}
