//! Extracted entities.
//!
//! An [`Entity`] is a typed span of the input with one or more candidate
//! values. Values are always stored in list form; [`Entity::value`] reads
//! the first. Time-like values may be single instants or `from`/`to`
//! intervals, see [`EntityValue`].

use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use serde_json::Value;

use crate::NluError;

pub const DATE: &str = "date";
pub const TIME: &str = "time";
pub const DATETIME: &str = "datetime";

const DATE_GRAINS: [&str; 5] = ["day", "week", "month", "quarter", "year"];
const TIME_GRAINS: [&str; 3] = ["hour", "minute", "second"];

/// Half-open character range `[start, end)` in the source transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }
}

/// One candidate value of an entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntityValue {
    Interval {
        #[serde(skip_serializing_if = "Option::is_none")]
        from: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<Value>,
    },
    Single(Value),
}

impl EntityValue {
    /// The scalar that identifies this value: itself, or the interval's
    /// start (falling back to its end).
    pub fn anchor(&self) -> Option<&Value> {
        match self {
            EntityValue::Single(value) => Some(value),
            EntityValue::Interval { from, to } => from.as_ref().or(to.as_ref()),
        }
    }
}

impl From<Value> for EntityValue {
    fn from(value: Value) -> Self {
        EntityValue::Single(value)
    }
}

/// Domain-specific shape of an entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityKind {
    Time {
        grain: Option<String>,
    },
    TimeInterval {
        grain: Option<String>,
    },
    Numerical,
    People {
        unit: Option<String>,
    },
    Currency {
        unit: Option<String>,
    },
    Duration {
        unit: Option<String>,
        normalized: Option<Value>,
    },
    Keyword,
}

impl EntityKind {
    pub fn is_temporal(&self) -> bool {
        matches!(self, EntityKind::Time { .. } | EntityKind::TimeInterval { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    range: Span,
    body: String,
    entity_type: String,
    dim: Option<String>,
    kind: EntityKind,
    values: Vec<EntityValue>,
    score: Option<f64>,
    alternative_index: Option<usize>,
    alternative_indices: Vec<usize>,
    latent: bool,
    parsers: Vec<String>,
}

impl Entity {
    pub fn new(
        kind: EntityKind,
        entity_type: impl Into<String>,
        body: impl Into<String>,
        range: Span,
        values: Vec<EntityValue>,
    ) -> Self {
        Entity {
            range,
            body: body.into(),
            entity_type: entity_type.into(),
            dim: None,
            kind,
            values,
            score: None,
            alternative_index: None,
            alternative_indices: Vec::new(),
            latent: false,
            parsers: Vec::new(),
        }
    }

    /// A keyword entity carrying a single canonical value.
    pub fn keyword(
        entity_type: impl Into<String>,
        value: impl Into<String>,
        body: impl Into<String>,
        range: Span,
    ) -> Self {
        Entity::new(
            EntityKind::Keyword,
            entity_type,
            body,
            range,
            vec![EntityValue::Single(Value::String(value.into()))],
        )
    }

    /// A time entity whose type is derived from its grain and values.
    pub fn time(
        grain: Option<String>,
        body: impl Into<String>,
        range: Span,
        values: Vec<EntityValue>,
    ) -> Self {
        let entity_type = time_entity_type(grain.as_deref(), &values);
        Entity::new(EntityKind::Time { grain }, entity_type, body, range, values)
    }

    pub fn range(&self) -> Span {
        self.range
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn dim(&self) -> Option<&str> {
        self.dim.as_deref()
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    pub fn values(&self) -> &[EntityValue] {
        &self.values
    }

    /// The primary value, derived from the first entry of [`Entity::values`].
    pub fn value(&self) -> Option<&EntityValue> {
        self.values.first()
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn alternative_index(&self) -> Option<usize> {
        self.alternative_index
    }

    pub fn alternative_indices(&self) -> &[usize] {
        &self.alternative_indices
    }

    pub fn latent(&self) -> bool {
        self.latent
    }

    pub fn parsers(&self) -> &[String] {
        &self.parsers
    }

    pub fn is_temporal(&self) -> bool {
        self.kind.is_temporal()
    }

    /// Identity of the primary value, used to decide whether two entities
    /// describe the same thing.
    pub fn normalized_value(&self) -> String {
        match self.value() {
            Some(value) => serde_json::to_string(value).unwrap_or_default(),
            None => String::new(),
        }
    }

    /// Resolve a temporal entity to an instant in unix milliseconds.
    pub fn instant_ms(&self) -> Result<i64, NluError> {
        let anchor = self.value().and_then(EntityValue::anchor).ok_or_else(|| {
            NluError::InputShape(format!(
                "{} entity '{}' has no value to resolve",
                self.entity_type, self.body
            ))
        })?;
        instant_of(anchor)
    }

    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = entity_type.into();
        self
    }

    pub fn with_dim(mut self, dim: impl Into<String>) -> Self {
        self.dim = Some(dim.into());
        self
    }

    pub fn with_values(mut self, values: Vec<EntityValue>) -> Self {
        self.values = values;
        self
    }

    pub fn with_score(mut self, score: Option<f64>) -> Self {
        self.score = score;
        self
    }

    pub fn with_alternative_index(mut self, index: Option<usize>) -> Self {
        self.alternative_index = index;
        self
    }

    pub fn with_alternative_indices(mut self, indices: Vec<usize>) -> Self {
        self.alternative_indices = indices;
        self
    }

    pub fn with_latent(mut self, latent: bool) -> Self {
        self.latent = latent;
        self
    }

    /// Record that `parser` touched this entity.
    pub fn with_parser(mut self, parser: impl Into<String>) -> Self {
        self.parsers.push(parser.into());
        self
    }
}

/// Pick `date`, `datetime` or `time` for a time entity.
///
/// Day-or-coarser grains are dates. A finer grain with a single value, a
/// single repeated instant, or instants a whole number of weeks apart (a
/// named weekday) pins down a datetime. Anything else is a bare time of day.
pub fn time_entity_type(grain: Option<&str>, values: &[EntityValue]) -> &'static str {
    if grain.is_some_and(|grain| DATE_GRAINS.contains(&grain)) {
        return DATE;
    }
    if grain.is_some_and(|grain| TIME_GRAINS.contains(&grain)) && values.len() == 1 {
        return DATETIME;
    }

    let Some(instants) = values
        .iter()
        .map(|value| value.anchor().and_then(calendar_date))
        .collect::<Option<Vec<_>>>()
    else {
        return TIME;
    };
    if instants.is_empty() {
        return TIME;
    }

    let unique = instants.windows(2).all(|pair| pair[0] == pair[1]);
    let weekly = instants
        .windows(2)
        .all(|pair| (pair[1].1 - pair[0].1).num_days() % 7 == 0);

    if unique || weekly { DATETIME } else { TIME }
}

fn calendar_date(value: &Value) -> Option<(i64, NaiveDate)> {
    let text = value.as_str()?;
    let parsed = DateTime::parse_from_rfc3339(text).ok()?;
    Some((parsed.timestamp_millis(), parsed.date_naive()))
}

fn instant_of(value: &Value) -> Result<i64, NluError> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .ok_or_else(|| NluError::InputShape(format!("'{number}' is not a timestamp"))),
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|parsed| parsed.timestamp_millis())
            .map_err(|error| NluError::InputShape(format!("'{text}' is not a datetime: {error}"))),
        Value::Object(fields) => match fields.get("value") {
            Some(inner) => instant_of(inner),
            None => Err(NluError::InputShape(format!(
                "time value {value} has no 'value' field"
            ))),
        },
        other => Err(NluError::InputShape(format!("{other} is not a datetime"))),
    }
}
