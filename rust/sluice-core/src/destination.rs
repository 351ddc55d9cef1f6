//! Where plugin output lands.
//!
//! A plugin names its target field with a dotted path such as
//! `response.entities`. Paths are parsed into a [`Destination`] when the
//! plugin is configured, so a typo fails construction instead of a turn.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::{Entity, Intent, NluError, RequestState, ResponseState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Destination {
    RequestTranscripts,
    RequestClfFeature,
    ResponseIntents,
    ResponseEntities,
}

impl Destination {
    pub fn path(&self) -> &'static str {
        match self {
            Destination::RequestTranscripts => "request.transcripts",
            Destination::RequestClfFeature => "request.clf_feature",
            Destination::ResponseIntents => "response.intents",
            Destination::ResponseEntities => "response.entities",
        }
    }

    /// The kind of value this field holds.
    pub fn accepts(&self) -> OutputKind {
        match self {
            Destination::RequestTranscripts | Destination::RequestClfFeature => OutputKind::Texts,
            Destination::ResponseIntents => OutputKind::Intents,
            Destination::ResponseEntities => OutputKind::Entities,
        }
    }

    /// Write `output` into this field under `policy`, returning the new pair.
    ///
    /// Only the record that owns the field changes; the other is returned
    /// as it was. Request fields are always replaced, the policy only
    /// governs the ranked response fields.
    pub fn write(
        &self,
        plugin: &str,
        output: PluginOutput,
        policy: WritePolicy,
        request: RequestState,
        response: ResponseState,
    ) -> Result<(RequestState, ResponseState), NluError> {
        match (self, output) {
            (Destination::RequestTranscripts, PluginOutput::Texts(texts)) => {
                Ok((request.with_transcripts(texts), response))
            }
            (Destination::RequestClfFeature, PluginOutput::Texts(texts)) => {
                Ok((request.with_clf_feature(texts), response))
            }
            (Destination::ResponseIntents, PluginOutput::Intents(intents)) => {
                let intents = policy.merge_ranked(response.intents(), intents, |intent: &Intent| {
                    Some(intent.score())
                });
                Ok((request, response.with_intents(intents)))
            }
            (Destination::ResponseEntities, PluginOutput::Entities(entities)) => {
                let entities = policy.merge_ranked(response.entities(), entities, Entity::score);
                Ok((request, response.with_entities(entities)))
            }
            (destination, output) => Err(NluError::DestinationMismatch {
                plugin: plugin.to_owned(),
                produced: output.kind().to_string(),
                destination: destination.path().to_owned(),
            }),
        }
    }
}

impl FromStr for Destination {
    type Err = NluError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        match path {
            "request.transcripts" => Ok(Destination::RequestTranscripts),
            "request.clf_feature" => Ok(Destination::RequestClfFeature),
            "response.intents" => Ok(Destination::ResponseIntents),
            "response.entities" => Ok(Destination::ResponseEntities),
            other => Err(NluError::InvalidDestination {
                path: other.to_owned(),
            }),
        }
    }
}

impl TryFrom<String> for Destination {
    type Error = NluError;

    fn try_from(path: String) -> Result<Self, Self::Error> {
        path.parse()
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// What a plugin hands back from `apply`.
#[derive(Debug, Clone, PartialEq)]
pub enum PluginOutput {
    Texts(Vec<String>),
    Intents(Vec<Intent>),
    Entities(Vec<Entity>),
}

impl PluginOutput {
    pub fn kind(&self) -> OutputKind {
        match self {
            PluginOutput::Texts(_) => OutputKind::Texts,
            PluginOutput::Intents(_) => OutputKind::Intents,
            PluginOutput::Entities(_) => OutputKind::Entities,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Texts,
    Intents,
    Entities,
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputKind::Texts => f.write_str("texts"),
            OutputKind::Intents => f.write_str("intents"),
            OutputKind::Entities => f.write_str("entities"),
        }
    }
}

/// How a plugin's output combines with what the field already holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// Keep the old items and add the new ones, then re-sort by score,
    /// highest first. Unscored items rank as zero.
    #[default]
    Append,
    /// Discard what the field held. Meant for plugins that rewrite the
    /// whole field from what is already there.
    Replace,
}

impl WritePolicy {
    fn merge_ranked<T, F>(&self, existing: &[T], incoming: Vec<T>, score: F) -> Vec<T>
    where
        T: Clone,
        F: Fn(&T) -> Option<f64>,
    {
        match self {
            WritePolicy::Replace => incoming,
            WritePolicy::Append => {
                let mut merged: Vec<T> = existing.iter().cloned().chain(incoming).collect();
                merged.sort_by(|a, b| {
                    let a = score(a).unwrap_or(0.0);
                    let b = score(b).unwrap_or(0.0);
                    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
                });
                merged
            }
        }
    }
}
