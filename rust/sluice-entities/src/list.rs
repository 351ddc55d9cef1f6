//! Keyword entities from a table of surface patterns.
//!
//! The candidate table maps an entity type to canonical values, and each
//! value to the patterns that mention it:
//!
//! ```json
//! { "city": { "bengaluru": ["bangalore", "bengaluru"], "mumbai": ["bombay", "mumbai"] } }
//! ```
//!
//! Patterns are regular expressions matched case-insensitively. Each
//! pattern contributes at most its first match per transcript.

use async_trait::async_trait;
use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use sluice_core::{
    Destination, Entity, Guard, NluError, OutputKind, Plugin, PluginOutput, RequestState,
    ResponseState, Span, TrainingSet, Wiring, WritePolicy,
};
use tracing::debug;

use crate::Scoring;
use crate::column::{self, TransformColumns};

pub type CandidateTable = IndexMap<String, IndexMap<String, Vec<String>>>;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListEntityConfig {
    pub name: String,
    pub candidates: CandidateTable,
    #[serde(flatten)]
    pub scoring: Scoring,
    #[serde(flatten)]
    pub columns: TransformColumns,
}

impl Default for ListEntityConfig {
    fn default() -> Self {
        ListEntityConfig {
            name: "list_entity".into(),
            candidates: CandidateTable::new(),
            scoring: Scoring::default(),
            columns: TransformColumns::default(),
        }
    }
}

#[derive(Debug)]
struct Pattern {
    entity_type: String,
    value: String,
    regex: Regex,
}

pub struct ListEntityPlugin {
    name: String,
    patterns: Vec<Pattern>,
    scoring: Scoring,
    columns: TransformColumns,
    wiring: Wiring,
}

impl ListEntityPlugin {
    /// Compile the candidate table. An empty table or a pattern that is not
    /// a valid regular expression is rejected.
    pub fn new(config: ListEntityConfig, wiring: Wiring) -> Result<Self, NluError> {
        if config.candidates.values().all(IndexMap::is_empty) {
            return Err(NluError::Configuration(format!(
                "'{}' was given no candidates",
                config.name
            )));
        }

        let mut patterns = Vec::new();
        for (entity_type, values) in &config.candidates {
            for (value, surfaces) in values {
                for surface in surfaces {
                    let regex = RegexBuilder::new(surface)
                        .case_insensitive(true)
                        .build()
                        .map_err(|error| {
                            NluError::Configuration(format!(
                                "pattern '{surface}' for {entity_type}/{value} is invalid: {error}"
                            ))
                        })?;
                    patterns.push(Pattern {
                        entity_type: entity_type.clone(),
                        value: value.clone(),
                        regex,
                    });
                }
            }
        }

        Ok(ListEntityPlugin {
            name: config.name,
            patterns,
            scoring: config.scoring,
            columns: config.columns,
            wiring,
        })
    }

    /// Match every transcript and reconcile what was found.
    pub fn extract(
        &self,
        transcripts: &[String],
        reference_time: Option<i64>,
    ) -> Result<Vec<Entity>, NluError> {
        let mut entities = Vec::new();
        for (index, transcript) in transcripts.iter().enumerate() {
            for pattern in &self.patterns {
                let Some(found) = pattern.regex.find(transcript) else {
                    continue;
                };
                let start = transcript[..found.start()].chars().count();
                let end = start + found.as_str().chars().count();

                entities.push(
                    Entity::keyword(
                        &pattern.entity_type,
                        &pattern.value,
                        found.as_str(),
                        Span::new(start, end),
                    )
                    .with_dim(&pattern.entity_type)
                    .with_alternative_index(Some(index))
                    .with_parser(&self.name),
                );
            }
        }

        self.scoring
            .reconcile(entities, transcripts.len(), None, reference_time)
    }
}

#[async_trait]
impl Plugin for ListEntityPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(
        &self,
        request: &RequestState,
        _response: &ResponseState,
    ) -> Result<Option<PluginOutput>, NluError> {
        let entities = self.extract(request.transcripts(), request.reference_time())?;
        Ok(Some(PluginOutput::Entities(entities)))
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
        Some(OutputKind::Entities)
    }

    /// Rows whose alternatives cannot be read are dropped.
    async fn transform(&self, data: TrainingSet) -> Result<TrainingSet, NluError> {
        let Some(output_column) = self.columns.output_column.as_deref() else {
            return Ok(data);
        };

        let total = data.len();
        let mut kept = Vec::with_capacity(total);
        for (position, mut row) in data.into_rows().into_iter().enumerate() {
            let transcripts = match column::transcripts(&row, &self.columns.input_column) {
                Ok(transcripts) => transcripts,
                Err(reason) => {
                    debug!(row = position, %reason, "dropping training row");
                    continue;
                }
            };
            let entities = self.extract(&transcripts, None)?;
            column::append_entities(&mut row, output_column, &entities)?;
            kept.push(row);
        }

        column::report_dropped(&self.name, total - kept.len());
        Ok(TrainingSet::new(kept))
    }
}
