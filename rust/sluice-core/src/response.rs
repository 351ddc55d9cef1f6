//! The immutable output accumulated over a turn.

use serde::Serialize;

use crate::{Entity, Intent};

/// Ranked intents (highest score first) and extracted entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResponseState {
    intents: Vec<Intent>,
    entities: Vec<Entity>,
}

impl ResponseState {
    pub fn new(intents: Vec<Intent>, entities: Vec<Entity>) -> Self {
        ResponseState { intents, entities }
    }

    pub fn intents(&self) -> &[Intent] {
        &self.intents
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// The best-ranked intent, if any classifier has run.
    pub fn top_intent(&self) -> Option<&Intent> {
        self.intents.first()
    }

    pub fn with_intents(&self, intents: Vec<Intent>) -> Self {
        ResponseState {
            intents,
            entities: self.entities.clone(),
        }
    }

    pub fn with_entities(&self, entities: Vec<Entity>) -> Self {
        ResponseState {
            intents: self.intents.clone(),
            entities,
        }
    }
}
