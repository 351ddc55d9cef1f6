//! The immutable input of a single turn.

use chrono::DateTime;
use itertools::Itertools;
use serde::Serialize;
use serde_json::Value;

use crate::{Hypothesis, NluError, Utterances, utterance};

pub const DEFAULT_LANG: &str = "en";
pub const DEFAULT_LOCALE: &str = "en_IN";
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Everything a plugin may read about the current turn.
///
/// Built once with [`RequestState::builder`]. Plugins that need a changed
/// request get a new value from one of the `with_*` methods; the original
/// is never touched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestState {
    utterances: Utterances,
    transcripts: Vec<String>,
    best_transcript: String,
    clf_feature: Vec<String>,
    lang: String,
    locale: String,
    timezone: String,
    reference_time: Option<i64>,
    latent_entities: bool,
    current_state: Option<String>,
    nls_label: Option<String>,
    expected_slots: Vec<String>,
    previous_intent: Option<String>,
    slot_tracker: Option<Vec<Value>>,
    history: Vec<Value>,
}

impl RequestState {
    pub fn builder() -> RequestStateBuilder {
        RequestStateBuilder::default()
    }

    pub fn utterances(&self) -> &[Vec<Hypothesis>] {
        &self.utterances
    }

    /// Whole-turn transcripts, one per combination of alternatives.
    pub fn transcripts(&self) -> &[String] {
        &self.transcripts
    }

    pub fn best_transcript(&self) -> &str {
        &self.best_transcript
    }

    pub fn clf_feature(&self) -> &[String] {
        &self.clf_feature
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    /// Unix milliseconds the turn is anchored to, if any.
    pub fn reference_time(&self) -> Option<i64> {
        self.reference_time
    }

    pub fn latent_entities(&self) -> bool {
        self.latent_entities
    }

    pub fn current_state(&self) -> Option<&str> {
        self.current_state.as_deref()
    }

    pub fn nls_label(&self) -> Option<&str> {
        self.nls_label.as_deref()
    }

    pub fn expected_slots(&self) -> &[String] {
        &self.expected_slots
    }

    pub fn previous_intent(&self) -> Option<&str> {
        self.previous_intent.as_deref()
    }

    pub fn slot_tracker(&self) -> Option<&[Value]> {
        self.slot_tracker.as_deref()
    }

    pub fn history(&self) -> &[Value] {
        &self.history
    }

    pub fn with_transcripts(&self, transcripts: Vec<String>) -> Self {
        RequestState {
            best_transcript: transcripts.first().cloned().unwrap_or_default(),
            transcripts,
            ..self.clone()
        }
    }

    pub fn with_clf_feature(&self, clf_feature: Vec<String>) -> Self {
        RequestState {
            clf_feature,
            ..self.clone()
        }
    }

    pub fn with_current_state(&self, state: Option<String>) -> Self {
        RequestState {
            current_state: state,
            ..self.clone()
        }
    }

    pub fn with_previous_intent(&self, intent: Option<String>) -> Self {
        RequestState {
            previous_intent: intent,
            ..self.clone()
        }
    }

    pub fn with_reference_time(&self, reference_time: Option<i64>) -> Result<Self, NluError> {
        Ok(RequestState {
            reference_time: validate_reference_time(reference_time)?,
            ..self.clone()
        })
    }
}

#[derive(Debug, Default)]
pub struct RequestStateBuilder {
    utterances: Utterances,
    clf_feature: Vec<String>,
    lang: Option<String>,
    locale: Option<String>,
    timezone: Option<String>,
    reference_time: Option<i64>,
    latent_entities: bool,
    current_state: Option<String>,
    nls_label: Option<String>,
    expected_slots: Vec<String>,
    previous_intent: Option<String>,
    slot_tracker: Option<Vec<Value>>,
    history: Vec<Value>,
}

impl RequestStateBuilder {
    pub fn utterances(mut self, utterances: Utterances) -> Self {
        self.utterances = utterances;
        self
    }

    /// Shorthand for a single utterance with the given alternatives.
    pub fn alternatives<I, S>(self, alternatives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.utterances(vec![
            alternatives.into_iter().map(Hypothesis::new).collect(),
        ])
    }

    pub fn clf_feature(mut self, clf_feature: Vec<String>) -> Self {
        self.clf_feature = clf_feature;
        self
    }

    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn reference_time(mut self, reference_time: i64) -> Self {
        self.reference_time = Some(reference_time);
        self
    }

    pub fn latent_entities(mut self, latent: bool) -> Self {
        self.latent_entities = latent;
        self
    }

    pub fn current_state(mut self, state: impl Into<String>) -> Self {
        self.current_state = Some(state.into());
        self
    }

    pub fn nls_label(mut self, label: impl Into<String>) -> Self {
        self.nls_label = Some(label.into());
        self
    }

    pub fn expected_slots(mut self, slots: Vec<String>) -> Self {
        self.expected_slots = slots;
        self
    }

    pub fn previous_intent(mut self, intent: impl Into<String>) -> Self {
        self.previous_intent = Some(intent.into());
        self
    }

    pub fn slot_tracker(mut self, tracker: Vec<Value>) -> Self {
        self.slot_tracker = Some(tracker);
        self
    }

    pub fn history(mut self, history: Vec<Value>) -> Self {
        self.history = history;
        self
    }

    pub fn build(self) -> Result<RequestState, NluError> {
        let transcripts = utterance::transcripts(&self.utterances);

        Ok(RequestState {
            best_transcript: transcripts.first().cloned().unwrap_or_default(),
            transcripts,
            utterances: self.utterances,
            clf_feature: self.clf_feature,
            lang: self.lang.unwrap_or_else(|| DEFAULT_LANG.into()),
            locale: self.locale.unwrap_or_else(|| DEFAULT_LOCALE.into()),
            timezone: self.timezone.unwrap_or_else(|| DEFAULT_TIMEZONE.into()),
            reference_time: validate_reference_time(self.reference_time)?,
            latent_entities: self.latent_entities,
            current_state: self.current_state,
            nls_label: self.nls_label,
            expected_slots: self.expected_slots.into_iter().unique().collect(),
            previous_intent: self.previous_intent,
            slot_tracker: self.slot_tracker,
            history: self.history,
        })
    }
}

/// Zero means "not provided"; anything else must be a representable instant.
fn validate_reference_time(reference_time: Option<i64>) -> Result<Option<i64>, NluError> {
    match reference_time {
        None | Some(0) => Ok(None),
        Some(ms) => match DateTime::from_timestamp_millis(ms) {
            Some(_) => Ok(Some(ms)),
            None => Err(NluError::InvalidReferenceTime(ms)),
        },
    }
}
