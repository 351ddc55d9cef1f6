//! An entity extractor backed by an [`EntityService`].
//!
//! Every transcript of the turn is parsed independently, a bounded number
//! at a time. Answers are reassembled in hypothesis order before decoding,
//! so each entity's `alternative_index` is the position of the transcript
//! it was found in. The per-hypothesis entities are then reconciled with
//! [`Scoring::reconcile`].

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt, stream};
use indexmap::IndexMap;
use serde::Deserialize;
use sluice_core::{
    Comparison, Destination, Entity, Guard, NluError, OutputKind, Plugin, PluginOutput,
    RequestState, ResponseState, TrainingSet, Wiring, WritePolicy,
};
use tracing::debug;

use crate::column::{self, TransformColumns};
use crate::{EntityService, ParseQuery, Scoring, decode};

/// Most hypotheses parsed at once.
pub const MAX_IN_FLIGHT: usize = 10;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceEntityConfig {
    pub name: String,
    pub dimensions: Vec<String>,
    #[serde(flatten)]
    pub scoring: Scoring,
    /// Temporal filter to apply when the top intent has this name.
    pub temporal_intents: IndexMap<String, Comparison>,
    /// Locale and timezone for training rows, which carry neither.
    pub locale: String,
    pub timezone: String,
    #[serde(flatten)]
    pub columns: TransformColumns,
}

impl Default for ServiceEntityConfig {
    fn default() -> Self {
        ServiceEntityConfig {
            name: "duckling".into(),
            dimensions: Vec::new(),
            scoring: Scoring::default(),
            temporal_intents: IndexMap::new(),
            locale: "en_IN".into(),
            timezone: "UTC".into(),
            columns: TransformColumns::default(),
        }
    }
}

/// Context shared by every hypothesis of one extraction.
struct Context<'a> {
    locale: &'a str,
    timezone: &'a str,
    reference_time: Option<i64>,
    latent: bool,
    temporal: Option<Comparison>,
}

pub struct ServiceEntityPlugin<S> {
    service: S,
    config: ServiceEntityConfig,
    wiring: Wiring,
}

impl<S: EntityService> ServiceEntityPlugin<S> {
    pub fn new(service: S, config: ServiceEntityConfig, wiring: Wiring) -> Result<Self, NluError> {
        if config.dimensions.is_empty() {
            return Err(NluError::Configuration(format!(
                "'{}' needs at least one dimension",
                config.name
            )));
        }
        Ok(ServiceEntityPlugin {
            service,
            config,
            wiring,
        })
    }

    /// Extract, type and reconcile entities from `transcripts`.
    async fn extract(
        &self,
        transcripts: &[String],
        context: Context<'_>,
    ) -> Result<Vec<Entity>, NluError> {
        let queries: Vec<ParseQuery> = transcripts
            .iter()
            .map(|text| ParseQuery {
                text: text.clone(),
                locale: context.locale.to_owned(),
                timezone: context.timezone.to_owned(),
                reference_time: context.reference_time,
                dimensions: self.config.dimensions.clone(),
                latent: context.latent,
            })
            .collect();

        let in_flight = transcripts.len().clamp(1, MAX_IN_FLIGHT);
        let pending: Vec<_> = queries.iter().map(|query| self.service.parse(query)).collect();
        let answers: Vec<_> = stream::iter(pending)
            .buffered(in_flight)
            .try_collect()
            .await?;

        let mut entities = Vec::new();
        for (index, raw_entities) in answers.into_iter().enumerate() {
            for raw in raw_entities {
                entities.push(decode(raw, index)?.with_parser(&self.config.name));
            }
        }
        debug!(
            plugin = %self.config.name,
            hypotheses = transcripts.len(),
            found = entities.len(),
            "parsed hypotheses"
        );

        self.config.scoring.reconcile(
            entities,
            transcripts.len(),
            context.temporal,
            context.reference_time,
        )
    }

    /// Temporal filter chosen by the top intent. Only the top intent counts.
    fn temporal_for(&self, response: &ResponseState) -> Option<Comparison> {
        response
            .top_intent()
            .and_then(|intent| self.config.temporal_intents.get(intent.name()))
            .copied()
    }
}

#[async_trait]
impl<S: EntityService> Plugin for ServiceEntityPlugin<S> {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn apply(
        &self,
        request: &RequestState,
        response: &ResponseState,
    ) -> Result<Option<PluginOutput>, NluError> {
        let context = Context {
            locale: request.locale(),
            timezone: request.timezone(),
            reference_time: request.reference_time(),
            latent: request.latent_entities(),
            temporal: self.temporal_for(response),
        };
        let entities = self.extract(request.transcripts(), context).await?;
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

    /// Write extracted entities into the output column. Rows without a
    /// reference time are kept as they are; rows whose alternatives or
    /// reference time cannot be read are dropped.
    async fn transform(&self, data: TrainingSet) -> Result<TrainingSet, NluError> {
        let columns = &self.config.columns;
        let Some(output_column) = columns.output_column.as_deref() else {
            return Ok(data);
        };

        let total = data.len();
        let mut kept = Vec::with_capacity(total);
        for (position, mut row) in data.into_rows().into_iter().enumerate() {
            let cells = column::reference_time(&row, &columns.reference_time_column).and_then(
                |reference_time| {
                    Ok((reference_time, column::transcripts(&row, &columns.input_column)?))
                },
            );
            let (reference_time, transcripts) = match cells {
                Ok(cells) => cells,
                Err(reason) => {
                    debug!(row = position, %reason, "dropping training row");
                    continue;
                }
            };

            if let Some(reference_time) = reference_time {
                let context = Context {
                    locale: &self.config.locale,
                    timezone: &self.config.timezone,
                    reference_time: Some(reference_time),
                    latent: false,
                    temporal: None,
                };
                let entities = self.extract(&transcripts, context).await?;
                column::append_entities(&mut row, output_column, &entities)?;
            }
            kept.push(row);
        }

        column::report_dropped(&self.config.name, total - kept.len());
        Ok(TrainingSet::new(kept))
    }
}
