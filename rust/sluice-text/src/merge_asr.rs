//! Merge n-best ASR transcripts into one classifier feature.
//!
//! Each transcript is wrapped in sentence markers and the results are joined
//! with a single space:
//!
//! ```text
//! ["hello world", "jello world"]  =>  "<s> hello world </s> <s> jello world </s>"
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use sluice_core::{
    Destination, Guard, NluError, OutputKind, Plugin, PluginOutput, RequestState, ResponseState,
    Row, TrainingSet, Wiring, WritePolicy, utterance,
};
use tracing::{debug, warn};

const START: &str = "<s>";
const END: &str = "</s>";
const BETWEEN: &str = " </s> <s> ";

/// Join transcripts into a single marked-up string, returned as a one-item
/// list so it can be written to `request.clf_feature` directly.
pub fn merge_asr_output<S: AsRef<str>>(transcripts: &[S]) -> Vec<String> {
    let body = transcripts
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(BETWEEN);
    vec![format!("{START} {body} {END}")]
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MergeAsrConfig {
    pub name: String,
    /// Column holding ASR alternatives, as JSON or a JSON-encoded string.
    pub input_column: String,
    /// Column the merged feature is written to.
    pub output_column: String,
}

impl Default for MergeAsrConfig {
    fn default() -> Self {
        MergeAsrConfig {
            name: "merge_asr_output".into(),
            input_column: "alternatives".into(),
            output_column: "data".into(),
        }
    }
}

pub struct MergeAsrPlugin {
    config: MergeAsrConfig,
    wiring: Wiring,
}

impl MergeAsrPlugin {
    pub fn new(config: MergeAsrConfig, wiring: Wiring) -> Self {
        MergeAsrPlugin { config, wiring }
    }

    pub fn config(&self) -> &MergeAsrConfig {
        &self.config
    }

    /// Merged feature for one training row, if its alternatives are usable.
    fn merge_row(&self, row: &Row) -> Result<String, NluError> {
        let cell = row.get(&self.config.input_column).ok_or_else(|| {
            NluError::InputShape(format!("column '{}' is missing", self.config.input_column))
        })?;

        let transcripts = match cell {
            Value::String(encoded) => utterance::normalize(&serde_json::from_str(encoded)?)?,
            other => utterance::normalize(other)?,
        };

        if transcripts.is_empty() {
            return Err(NluError::InputShape("no alternatives".into()));
        }
        Ok(merge_asr_output(&transcripts).concat())
    }
}

impl Default for MergeAsrPlugin {
    fn default() -> Self {
        MergeAsrPlugin::new(
            MergeAsrConfig::default(),
            Wiring::to(Destination::RequestClfFeature),
        )
    }
}

#[async_trait]
impl Plugin for MergeAsrPlugin {
    fn name(&self) -> &str {
        &self.config.name
    }

    /// Nothing is written for a turn without transcripts.
    async fn apply(
        &self,
        request: &RequestState,
        _response: &ResponseState,
    ) -> Result<Option<PluginOutput>, NluError> {
        if request.transcripts().is_empty() {
            return Ok(None);
        }
        Ok(Some(PluginOutput::Texts(merge_asr_output(
            request.transcripts(),
        ))))
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

    /// Rows whose alternatives are missing, empty or unreadable are dropped.
    async fn transform(&self, data: TrainingSet) -> Result<TrainingSet, NluError> {
        let total = data.len();
        let mut kept = Vec::with_capacity(total);

        for (position, mut row) in data.into_rows().into_iter().enumerate() {
            match self.merge_row(&row) {
                Ok(merged) => {
                    row.insert(self.config.output_column.clone(), Value::String(merged));
                    kept.push(row);
                }
                Err(reason) => debug!(row = position, %reason, "dropping training row"),
            }
        }

        let dropped = total - kept.len();
        if dropped > 0 {
            warn!(
                plugin = %self.config.name,
                dropped,
                "discarded rows whose alternatives could not be parsed"
            );
        }
        Ok(TrainingSet::new(kept))
    }
}
