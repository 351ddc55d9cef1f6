//! The boundary to an external temporal/numeric parsing service.
//!
//! A service takes one transcript and answers with raw entity descriptors.
//! [`decode`] turns a descriptor into a typed [`Entity`], tagging it with
//! the hypothesis it came from.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sluice_core::{Entity, EntityKind, EntityValue, NluError, Span, time_entity_type};

pub const TIME: &str = "time";
pub const NUMBER: &str = "number";
pub const PEOPLE: &str = "people";
pub const AMOUNT_OF_MONEY: &str = "amount-of-money";
pub const DURATION: &str = "duration";

/// One parse request: a transcript and the context needed to read it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseQuery {
    pub text: String,
    pub locale: String,
    pub timezone: String,
    pub reference_time: Option<i64>,
    pub dimensions: Vec<String>,
    pub latent: bool,
}

/// An entity as the service reports it, before typing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawEntity {
    pub body: String,
    pub start: usize,
    pub end: usize,
    pub dim: String,
    #[serde(default)]
    pub latent: bool,
    pub value: Value,
}

#[async_trait]
pub trait EntityService: Send + Sync {
    /// Parse one transcript.
    ///
    /// Returning an empty list is a valid answer. Errors abort the turn
    /// unless the implementation documents otherwise.
    async fn parse(&self, query: &ParseQuery) -> Result<Vec<RawEntity>, NluError>;
}

/// Type a raw descriptor produced from hypothesis `alternative_index`.
pub fn decode(raw: RawEntity, alternative_index: usize) -> Result<Entity, NluError> {
    let range = Span::new(raw.start, raw.end);
    let value = &raw.value;

    let entity = match raw.dim.as_str() {
        TIME if value.get("type").and_then(Value::as_str) == Some("interval") => {
            let values = interval_values(value)?;
            let grain = value
                .get("from")
                .or_else(|| value.get("to"))
                .and_then(|bound| bound.get("grain"))
                .and_then(Value::as_str)
                .map(str::to_owned);
            let entity_type = time_entity_type(grain.as_deref(), &values);
            Entity::new(
                EntityKind::TimeInterval { grain },
                entity_type,
                &raw.body,
                range,
                values,
            )
        }
        TIME => {
            let alternatives = required(value, "values")?
                .as_array()
                .ok_or_else(|| shape(&raw.dim, "'values' is not a list"))?;
            let grain = alternatives
                .first()
                .and_then(|first| first.get("grain"))
                .or_else(|| value.get("grain"))
                .and_then(Value::as_str)
                .map(str::to_owned);
            let values = alternatives
                .iter()
                .map(|alternative| -> Result<EntityValue, NluError> {
                    Ok(EntityValue::Single(required(alternative, "value")?.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Entity::time(grain, &raw.body, range, values)
        }
        NUMBER => Entity::new(
            EntityKind::Numerical,
            NUMBER,
            &raw.body,
            range,
            vec![EntityValue::Single(required(value, "value")?.clone())],
        ),
        PEOPLE => Entity::new(
            EntityKind::People { unit: unit(value) },
            PEOPLE,
            &raw.body,
            range,
            vec![EntityValue::Single(required(value, "value")?.clone())],
        ),
        AMOUNT_OF_MONEY => Entity::new(
            EntityKind::Currency { unit: unit(value) },
            AMOUNT_OF_MONEY,
            &raw.body,
            range,
            vec![EntityValue::Single(required(value, "value")?.clone())],
        ),
        DURATION => {
            let normalized = required(value, "normalized")?;
            Entity::new(
                EntityKind::Duration {
                    unit: unit(value),
                    normalized: Some(normalized.clone()),
                },
                DURATION,
                &raw.body,
                range,
                vec![EntityValue::Single(required(normalized, "value")?.clone())],
            )
        }
        other => {
            return Err(NluError::InputShape(format!(
                "unsupported dimension '{other}' for '{}'",
                raw.body
            )));
        }
    };

    Ok(entity
        .with_dim(raw.dim)
        .with_latent(raw.latent)
        .with_alternative_index(Some(alternative_index)))
}

fn interval_values(value: &Value) -> Result<Vec<EntityValue>, NluError> {
    let bounds = |interval: &Value| EntityValue::Interval {
        from: interval.get("from").and_then(|bound| bound.get("value")).cloned(),
        to: interval.get("to").and_then(|bound| bound.get("value")).cloned(),
    };

    let values: Vec<_> = match value.get("values").and_then(Value::as_array) {
        Some(alternatives) if !alternatives.is_empty() => alternatives.iter().map(bounds).collect(),
        _ => vec![bounds(value)],
    };

    if values.iter().any(|value| value.anchor().is_none()) {
        return Err(shape(TIME, "interval has neither 'from' nor 'to'"));
    }
    Ok(values)
}

fn required<'a>(value: &'a Value, key: &str) -> Result<&'a Value, NluError> {
    value
        .get(key)
        .ok_or_else(|| NluError::InputShape(format!("entity value {value} is missing '{key}'")))
}

fn unit(value: &Value) -> Option<String> {
    value.get("unit").and_then(Value::as_str).map(str::to_owned)
}

fn shape(dim: &str, reason: &str) -> NluError {
    NluError::InputShape(format!("malformed {dim} entity: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sluice_core::{DATE, DATETIME};

    fn raw(value: Value) -> RawEntity {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn it_decodes_instants() {
        let entity = decode(
            raw(json!({
                "body": "tomorrow",
                "start": 7,
                "end": 15,
                "dim": "time",
                "latent": false,
                "value": {
                    "type": "value",
                    "value": "2021-01-28T00:00:00.000+05:30",
                    "grain": "day",
                    "values": [
                        {"type": "value", "value": "2021-01-28T00:00:00.000+05:30", "grain": "day"}
                    ]
                }
            })),
            2,
        )
        .unwrap();

        assert_eq!(entity.entity_type(), DATE);
        assert_eq!(entity.range(), Span::new(7, 15));
        assert_eq!(entity.alternative_index(), Some(2));
        assert_eq!(entity.dim(), Some("time"));
        assert!(entity.is_temporal());
    }

    #[test]
    fn it_decodes_intervals() {
        let entity = decode(
            raw(json!({
                "body": "after 4pm",
                "start": 0,
                "end": 9,
                "dim": "time",
                "latent": false,
                "value": {
                    "type": "interval",
                    "from": {"value": "2021-01-27T16:00:00.000+00:00", "grain": "hour"},
                    "values": [
                        {"type": "interval", "from": {"value": "2021-01-27T16:00:00.000+00:00", "grain": "hour"}}
                    ]
                }
            })),
            0,
        )
        .unwrap();

        assert!(matches!(entity.kind(), EntityKind::TimeInterval { grain: Some(g) } if g == "hour"));
        assert_eq!(entity.entity_type(), DATETIME);
        assert_eq!(entity.instant_ms().unwrap(), 1_611_763_200_000);
    }

    #[test]
    fn it_reads_durations_in_normalized_units() {
        let entity = decode(
            raw(json!({
                "body": "2 hours",
                "start": 0,
                "end": 7,
                "dim": "duration",
                "latent": false,
                "value": {
                    "type": "value",
                    "value": 2,
                    "unit": "hour",
                    "normalized": {"value": 7200, "unit": "second"}
                }
            })),
            0,
        )
        .unwrap();

        assert_eq!(entity.value(), Some(&EntityValue::Single(json!(7200))));
        assert_eq!(entity.entity_type(), DURATION);
    }

    #[test]
    fn it_rejects_unknown_dimensions_and_missing_fields() {
        let unknown = raw(json!({
            "body": "x", "start": 0, "end": 1, "dim": "color", "latent": false, "value": {}
        }));
        assert!(matches!(decode(unknown, 0), Err(NluError::InputShape(_))));

        let valueless = raw(json!({
            "body": "4", "start": 0, "end": 1, "dim": "people", "latent": false,
            "value": {"unit": "person"}
        }));
        assert!(matches!(decode(valueless, 0), Err(NluError::InputShape(_))));
    }
}
