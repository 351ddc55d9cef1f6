//! Complete a date or a time with the half given on an earlier turn.
//!
//! A caller asked "which day?" and then "what time?" hears the two halves
//! on separate turns. The earlier half comes back in the request's slot
//! tracker:
//!
//! ```json
//! [{"name": "_callback_", "slots": [{"name": "callback_datetime", "values": [
//!     {"body": "friday", "grain": "day", "value": "2021-10-15T00:00:00+05:30"}
//! ]}]}]
//! ```
//!
//! When one of the trigger intents is tracked, its first slot's first value
//! is joined with every date or time entity of the current turn. The result
//! replaces the turn's entity list, so this plugin is wired with
//! [`WritePolicy::Replace`] by default.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, TimeZone};
use serde::Deserialize;
use serde_json::Value;
use sluice_core::{
    DATE, DATETIME, Destination, Entity, EntityValue, Guard, NluError, OutputKind, Plugin,
    PluginOutput, RequestState, ResponseState, TIME, Wiring, WritePolicy, time_entity_type,
};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CombineDateTimeConfig {
    pub name: String,
    /// Tracked intents whose slots may hold the earlier half.
    pub trigger_intents: Vec<String>,
}

impl Default for CombineDateTimeConfig {
    fn default() -> Self {
        CombineDateTimeConfig {
            name: "combine_date_time".into(),
            trigger_intents: Vec::new(),
        }
    }
}

/// The earlier turn's date or time.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Tracked {
    is_date: bool,
    instant: DateTime<FixedOffset>,
}

pub struct CombineDateTimePlugin {
    config: CombineDateTimeConfig,
    wiring: Wiring,
}

impl CombineDateTimePlugin {
    pub fn new(config: CombineDateTimeConfig, wiring: Wiring) -> Self {
        CombineDateTimePlugin { config, wiring }
    }

    /// First value of the first slot of the first tracked trigger intent.
    fn tracked(&self, tracker: &[Value]) -> Result<Option<Tracked>, NluError> {
        let Some(intent) = tracker.iter().find(|intent| {
            intent
                .get("name")
                .and_then(Value::as_str)
                .is_some_and(|name| self.config.trigger_intents.iter().any(|t| t == name))
        }) else {
            return Ok(None);
        };

        let Some(metadata) = intent
            .pointer("/slots/0/values/0")
            .filter(|metadata| metadata.is_object())
        else {
            return Ok(None);
        };

        let value = metadata.get("value").ok_or_else(|| {
            NluError::InputShape(format!("tracked slot value {metadata} has no 'value'"))
        })?;
        let instant = instant(value).ok_or_else(|| {
            NluError::InputShape(format!("tracked slot value {value} is not a datetime"))
        })?;
        let grain = metadata.get("grain").and_then(Value::as_str);
        let entity_type = time_entity_type(grain, &[EntityValue::Single(value.clone())]);

        Ok(Some(Tracked {
            is_date: entity_type == DATE,
            instant,
        }))
    }

    /// Fill in the half `entity` is missing, if `tracked` has it.
    fn join(&self, entity: &Entity, tracked: Tracked) -> Option<Entity> {
        let current_is_date = entity.entity_type() == DATE;
        let current_has_time = matches!(entity.entity_type(), TIME | DATETIME);
        let tracked_has_time = !tracked.is_date;

        let current = entity
            .value()
            .and_then(EntityValue::anchor)
            .and_then(instant)?;

        let naive = if current_is_date && tracked_has_time {
            current.date_naive().and_time(tracked.instant.time())
        } else if tracked.is_date && current_has_time {
            tracked.instant.date_naive().and_time(current.time())
        } else {
            return None;
        };
        let combined = local(current.offset(), naive)?;

        Some(
            entity
                .clone()
                .with_entity_type(DATETIME)
                .with_values(vec![EntityValue::Single(Value::String(
                    combined.to_rfc3339_opts(SecondsFormat::Millis, false),
                ))])
                .with_parser(&self.config.name),
        )
    }
}

impl Default for CombineDateTimePlugin {
    fn default() -> Self {
        CombineDateTimePlugin::new(
            CombineDateTimeConfig::default(),
            Wiring::to(Destination::ResponseEntities).with_policy(WritePolicy::Replace),
        )
    }
}

fn instant(value: &Value) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value.as_str()?).ok()
}

fn local(offset: &FixedOffset, naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
    offset.from_local_datetime(&naive).single()
}

#[async_trait]
impl Plugin for CombineDateTimePlugin {
    fn name(&self) -> &str {
        &self.config.name
    }

    /// Nothing is written without trigger intents or a matching tracked slot.
    async fn apply(
        &self,
        request: &RequestState,
        response: &ResponseState,
    ) -> Result<Option<PluginOutput>, NluError> {
        if self.config.trigger_intents.is_empty() {
            return Ok(None);
        }
        let Some(tracker) = request.slot_tracker() else {
            return Ok(None);
        };
        let Some(tracked) = self.tracked(tracker)? else {
            debug!(plugin = %self.config.name, "no tracked date or time to combine with");
            return Ok(None);
        };

        let entities = response
            .entities()
            .iter()
            .map(|entity| self.join(entity, tracked).unwrap_or_else(|| entity.clone()))
            .collect();
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use sluice_core::Span;
    use testresult::TestResult;

    fn plugin() -> CombineDateTimePlugin {
        CombineDateTimePlugin::new(
            CombineDateTimeConfig {
                trigger_intents: vec!["_callback_".into()],
                ..CombineDateTimeConfig::default()
            },
            Wiring::to(Destination::ResponseEntities).with_policy(WritePolicy::Replace),
        )
    }

    fn tracker(grain: &str, value: &str) -> Vec<Value> {
        vec![
            json!({"name": "_greet_", "slots": []}),
            json!({"name": "_callback_", "slots": [{
                "name": "callback_datetime",
                "type": ["date", "time", "datetime"],
                "values": [{"body": "earlier", "grain": grain, "value": value}]
            }]}),
        ]
    }

    fn time_entity(grain: &str, value: &str) -> Entity {
        Entity::time(
            Some(grain.into()),
            "it",
            Span::new(0, 2),
            vec![EntityValue::Single(json!(value))],
        )
    }

    async fn combine(
        request: RequestState,
        entities: Vec<Entity>,
    ) -> TestResult<Option<Vec<Entity>>> {
        let response = ResponseState::new(vec![], entities);
        Ok(match plugin().apply(&request, &response).await? {
            Some(PluginOutput::Entities(entities)) => Some(entities),
            None => None,
            other => panic!("expected entities, got {other:?}"),
        })
    }

    fn values(entities: &[Entity]) -> Vec<Value> {
        entities
            .iter()
            .filter_map(|entity| entity.value().and_then(EntityValue::anchor).cloned())
            .collect()
    }

    #[tokio::test]
    async fn it_puts_this_turns_time_on_the_tracked_date() -> TestResult {
        let request = RequestState::builder()
            .slot_tracker(tracker("day", "2021-10-15T00:00:00.000+05:30"))
            .build()?;
        let three_pm = time_entity("hour", "2021-10-13T15:00:00.000+05:30");

        let combined = combine(request, vec![three_pm]).await?.unwrap_or_default();

        assert_eq!(values(&combined), vec![json!("2021-10-15T15:00:00.000+05:30")]);
        assert_eq!(combined[0].entity_type(), DATETIME);
        assert_eq!(combined[0].parsers(), ["combine_date_time"]);
        Ok(())
    }

    #[tokio::test]
    async fn it_puts_the_tracked_time_on_this_turns_date() -> TestResult {
        let request = RequestState::builder()
            .slot_tracker(tracker("hour", "2021-10-13T18:30:00.000+05:30"))
            .build()?;
        let friday = time_entity("day", "2021-10-15T00:00:00.000+05:30");
        let city = Entity::keyword("city", "delhi", "delhi", Span::new(10, 15));

        let combined = combine(request, vec![friday, city.clone()]).await?.unwrap_or_default();

        assert_eq!(
            values(&combined),
            vec![json!("2021-10-15T18:30:00.000+05:30"), json!("delhi")]
        );
        assert_eq!(combined[1], city);
        Ok(())
    }

    #[tokio::test]
    async fn it_leaves_two_dates_alone() -> TestResult {
        let request = RequestState::builder()
            .slot_tracker(tracker("day", "2021-10-15T00:00:00.000+05:30"))
            .build()?;
        let monday = time_entity("day", "2021-10-18T00:00:00.000+05:30");

        let combined = combine(request, vec![monday.clone()]).await?;

        assert_eq!(combined, Some(vec![monday]));
        Ok(())
    }

    #[tokio::test]
    async fn it_writes_nothing_without_a_tracked_trigger_intent() -> TestResult {
        let untracked = RequestState::builder().build()?;
        assert_eq!(combine(untracked, vec![]).await?, None);

        let other_intent = RequestState::builder()
            .slot_tracker(vec![json!({"name": "_greet_", "slots": []})])
            .build()?;
        assert_eq!(combine(other_intent, vec![]).await?, None);

        let no_triggers = CombineDateTimePlugin::default();
        let request = RequestState::builder()
            .slot_tracker(tracker("day", "2021-10-15T00:00:00.000+05:30"))
            .build()?;
        let output = no_triggers.apply(&request, &ResponseState::default()).await?;
        assert_eq!(output, None);
        Ok(())
    }

    #[tokio::test]
    async fn it_rejects_tracked_values_that_are_not_datetimes() -> TestResult {
        let request = RequestState::builder()
            .slot_tracker(tracker("day", "the fifteenth"))
            .build()?;
        let response = ResponseState::default();

        let result = plugin().apply(&request, &response).await;

        assert!(matches!(result, Err(NluError::InputShape(_))));
        Ok(())
    }
}
