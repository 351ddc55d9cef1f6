//! Service-backed extraction across hypotheses, inside and outside a workflow.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use sluice_core::{
    Destination, Entity, Intent, NluError, OutputKind, Plugin, PluginOutput, RequestState,
    ResponseState, TrainingSet, Wiring, Workflow,
};
use sluice_entities::{
    EntityService, ParseQuery, RawEntity, ServiceEntityConfig, ServiceEntityPlugin,
};
use testresult::TestResult;

const REFERENCE_TIME: i64 = 1_611_705_600_000;

/// Answers from a fixed table. Earlier hypotheses are answered more slowly
/// so responses complete out of order.
struct Scripted {
    answers: HashMap<String, Vec<Value>>,
}

impl Scripted {
    fn new(answers: impl IntoIterator<Item = (&'static str, Vec<Value>)>) -> Self {
        Scripted {
            answers: answers
                .into_iter()
                .map(|(text, entities)| (text.to_owned(), entities))
                .collect(),
        }
    }
}

#[async_trait]
impl EntityService for Scripted {
    async fn parse(&self, query: &ParseQuery) -> Result<Vec<RawEntity>, NluError> {
        let delay = query.text.len() as u64 * 2;
        tokio::time::sleep(Duration::from_millis(delay)).await;

        self.answers
            .get(&query.text)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|raw| Ok(serde_json::from_value(raw)?))
            .collect()
    }
}

fn people(count: u64, start: usize) -> Value {
    json!({
        "body": format!("{count} people"), "start": start, "end": start + 8, "dim": "people",
        "value": {"type": "value", "value": count, "unit": "person"}
    })
}

fn day(body: &str, instant: &str) -> Value {
    json!({
        "body": body, "start": 10, "end": 10 + body.len(), "dim": "time",
        "value": {
            "type": "value", "grain": "day", "value": instant,
            "values": [{"type": "value", "grain": "day", "value": instant}]
        }
    })
}

fn extractor(service: Scripted, config: Value) -> TestResult<ServiceEntityPlugin<Scripted>> {
    let config: ServiceEntityConfig = serde_json::from_value(config)?;
    Ok(ServiceEntityPlugin::new(
        service,
        config,
        Wiring::to(Destination::ResponseEntities),
    )?)
}

fn entities(output: Option<PluginOutput>) -> Vec<Entity> {
    match output {
        Some(PluginOutput::Entities(entities)) => entities,
        other => panic!("expected entities, got {other:?}"),
    }
}

#[tokio::test]
async fn it_indexes_entities_by_hypothesis_despite_out_of_order_answers() -> TestResult {
    let service = Scripted::new([
        ("a table for 4 people", vec![people(4, 12)]),
        ("table for 5 people", vec![people(5, 10)]),
        ("for 4 people", vec![people(4, 4)]),
    ]);
    let plugin = extractor(service, json!({"dimensions": ["people"]}))?;
    let request = RequestState::builder()
        .alternatives(["a table for 4 people", "table for 5 people", "for 4 people"])
        .build()?;

    let found = entities(plugin.apply(&request, &ResponseState::default()).await?);

    assert_eq!(found.len(), 2);
    assert_eq!(found[0].body(), "4 people");
    assert_eq!(found[0].alternative_index(), Some(0));
    assert_eq!(found[0].alternative_indices(), [0, 2]);
    assert_eq!(found[0].score(), Some(2.0 / 3.0));
    assert_eq!(found[1].body(), "5 people");
    assert_eq!(found[1].alternative_index(), Some(1));
    assert_eq!(found[1].parsers(), ["duckling"]);
    Ok(())
}

#[tokio::test]
async fn it_drops_entities_below_the_threshold() -> TestResult {
    let service = Scripted::new([
        ("a table for 4 people", vec![people(4, 12)]),
        ("table for 5 people", vec![people(5, 10)]),
        ("for 4 people", vec![people(4, 4)]),
    ]);
    let plugin = extractor(service, json!({"dimensions": ["people"], "threshold": 0.5}))?;
    let request = RequestState::builder()
        .alternatives(["a table for 4 people", "table for 5 people", "for 4 people"])
        .build()?;

    let found = entities(plugin.apply(&request, &ResponseState::default()).await?);

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].body(), "4 people");
    Ok(())
}

/// Classifies every turn as one fixed intent.
struct Classifier(&'static str);

#[async_trait]
impl Plugin for Classifier {
    fn name(&self) -> &str {
        "classifier"
    }

    async fn apply(
        &self,
        _request: &RequestState,
        _response: &ResponseState,
    ) -> Result<Option<PluginOutput>, NluError> {
        Ok(Some(PluginOutput::Intents(vec![Intent::new(self.0, 0.9)?])))
    }

    fn destination(&self) -> Option<Destination> {
        Some(Destination::ResponseIntents)
    }

    fn produces(&self) -> Option<OutputKind> {
        Some(OutputKind::Intents)
    }
}

fn dated_service() -> Scripted {
    Scripted::new([
        (
            "book it for tomorrow",
            vec![day("tomorrow", "2021-01-28T00:00:00.000+00:00")],
        ),
        (
            "book it for yesterday",
            vec![day("yesterday", "2021-01-26T00:00:00.000+00:00")],
        ),
    ])
}

fn dated_request() -> TestResult<RequestState> {
    Ok(RequestState::builder()
        .alternatives(["book it for tomorrow", "book it for yesterday"])
        .reference_time(REFERENCE_TIME)
        .build()?)
}

#[test_log::test(tokio::test)]
async fn it_filters_by_the_top_intents_temporal_direction() -> TestResult {
    let plugin = extractor(
        dated_service(),
        json!({
            "dimensions": ["time"],
            "threshold": 0.9,
            "temporal_intents": {"future_booking": "future", "report_loss": "past"}
        }),
    )?;
    let workflow = Workflow::new(vec![Box::new(Classifier("future_booking")), Box::new(plugin)])?;

    let (_, response) = workflow.run(dated_request()?, None).await?;

    assert_eq!(response.top_intent().map(Intent::name), Some("future_booking"));
    assert_eq!(response.entities().len(), 1);
    assert_eq!(response.entities()[0].body(), "tomorrow");
    assert_eq!(response.entities()[0].entity_type(), "date");
    assert_eq!(response.entities()[0].score(), Some(0.5));
    Ok(())
}

#[tokio::test]
async fn it_ignores_temporal_entries_for_other_intents() -> TestResult {
    let plugin = extractor(
        dated_service(),
        json!({"dimensions": ["time"], "temporal_intents": {"__any__": "past"}}),
    )?;
    let workflow = Workflow::new(vec![Box::new(Classifier("chitchat")), Box::new(plugin)])?;

    let (_, response) = workflow.run(dated_request()?, None).await?;

    let bodies: Vec<_> = response.entities().iter().map(Entity::body).collect();
    assert_eq!(bodies, vec!["tomorrow", "yesterday"]);
    Ok(())
}

#[tokio::test]
async fn it_fails_the_turn_when_a_temporal_filter_has_no_reference_time() -> TestResult {
    let plugin = extractor(
        dated_service(),
        json!({"dimensions": ["time"], "temporal_intents": {"future_booking": "future"}}),
    )?;
    let workflow = Workflow::new(vec![Box::new(Classifier("future_booking")), Box::new(plugin)])?;
    let request = RequestState::builder()
        .alternatives(["book it for tomorrow", "book it for yesterday"])
        .build()?;

    let result = workflow.run(request, None).await;

    assert!(matches!(result, Err(NluError::InputShape(_))));
    Ok(())
}

#[tokio::test]
async fn it_annotates_only_rows_with_a_reference_time() -> TestResult {
    let plugin = extractor(
        Scripted::new([("for 4 people", vec![people(4, 4)])]),
        json!({"dimensions": ["people"], "output_column": "entities"}),
    )?;
    let data: TrainingSet = serde_json::from_value(json!([
        {"alternatives": r#"[[{"transcript": "for 4 people"}]]"#, "reftime": REFERENCE_TIME},
        {"alternatives": r#"[[{"transcript": "for 4 people"}]]"#, "reftime": null},
        {"alternatives": "for 4 people", "reftime": "2021-01-27T00:00:00+00:00"}
    ]))?;

    let transformed = plugin.transform(data).await?;

    let rows = transformed.rows();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["entities"][0]["body"], json!("4 people"));
    assert!(!rows[1].contains_key("entities"));
    assert_eq!(rows[2]["entities"][0]["alternative_index"], json!(0));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn it_drops_rows_with_unreadable_cells() -> TestResult {
    let plugin = extractor(
        Scripted::new([("for 4 people", vec![people(4, 4)])]),
        json!({"dimensions": ["people"], "output_column": "entities"}),
    )?;
    let data: TrainingSet = serde_json::from_value(json!([
        {"alternatives": 42, "reftime": REFERENCE_TIME},
        {"alternatives": "for 4 people", "reftime": "last tuesday"},
        {"alternatives": "for 4 people", "reftime": [REFERENCE_TIME]},
        {"alternatives": "for 4 people", "reftime": REFERENCE_TIME}
    ]))?;

    let transformed = plugin.transform(data).await?;

    let rows = transformed.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["entities"][0]["body"], json!("4 people"));
    Ok(())
}

#[tokio::test]
async fn it_leaves_training_data_alone_without_an_output_column() -> TestResult {
    let plugin = extractor(
        Scripted::new([("for 4 people", vec![people(4, 4)])]),
        json!({"dimensions": ["people"]}),
    )?;
    let data: TrainingSet = serde_json::from_value(json!([
        {"alternatives": "for 4 people", "reftime": REFERENCE_TIME}
    ]))?;

    let transformed = plugin.transform(data.clone()).await?;

    assert_eq!(transformed, data);
    Ok(())
}

#[test]
fn it_requires_a_dimension() {
    let result = ServiceEntityPlugin::new(
        Scripted::new([]),
        ServiceEntityConfig::default(),
        Wiring::default(),
    );
    assert!(matches!(result, Err(NluError::Configuration(_))));
}
