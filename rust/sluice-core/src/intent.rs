//! Classified intents and the slots they carry.

use indexmap::IndexMap;
use serde::Serialize;

use crate::{Entity, NluError};

/// A named place in an intent that entities of given types can fill.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slot {
    pub name: String,
    pub types: Vec<String>,
    pub values: Vec<Entity>,
}

impl Slot {
    pub fn new(name: impl Into<String>, types: Vec<String>) -> Self {
        Slot {
            name: name.into(),
            types,
            values: Vec::new(),
        }
    }

    pub fn accepts(&self, entity: &Entity) -> bool {
        self.types.iter().any(|t| t == entity.entity_type())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Intent {
    name: String,
    score: f64,
    alternative_index: Option<usize>,
    parsers: Vec<String>,
    slots: IndexMap<String, Slot>,
}

impl Intent {
    /// Create an intent; the name must be non-empty and the score in `[0, 1]`.
    pub fn new(name: impl Into<String>, score: f64) -> Result<Self, NluError> {
        let name = name.into();
        if name.is_empty() {
            return Err(NluError::InvalidIntent("name is empty".into()));
        }
        if !(0.0..=1.0).contains(&score) {
            return Err(NluError::InvalidIntent(format!(
                "score {score} for '{name}' is outside [0, 1]"
            )));
        }

        Ok(Intent {
            name,
            score,
            alternative_index: None,
            parsers: Vec::new(),
            slots: IndexMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn alternative_index(&self) -> Option<usize> {
        self.alternative_index
    }

    pub fn parsers(&self) -> &[String] {
        &self.parsers
    }

    pub fn slots(&self) -> &IndexMap<String, Slot> {
        &self.slots
    }

    pub fn with_alternative_index(mut self, index: Option<usize>) -> Self {
        self.alternative_index = index;
        self
    }

    pub fn with_parser(mut self, parser: impl Into<String>) -> Self {
        self.parsers.push(parser.into());
        self
    }

    pub fn with_slot(mut self, slot: Slot) -> Self {
        self.slots.insert(slot.name.clone(), slot);
        self
    }
}
