//! Consensus and scoring of entities found across ASR hypotheses.
//!
//! Extractors run once per transcript, so the same entity usually shows up
//! several times, once for every hypothesis that contains it. [`consensus`]
//! folds those sightings into one entity per `(type, value)` and scores it
//! by how many of the hypotheses agreed:
//!
//! ```text
//! score = distinct hypotheses that produced the entity / hypotheses
//! ```
//!
//! An extractor then applies exactly one post-filter: a confidence
//! threshold or a temporal constraint. See [`Scoring::reconcile`].

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::Deserialize;
use sluice_core::{Comparison, Entity, NluError};
use tracing::warn;

/// Fold sightings of the same entity into one scored representative.
///
/// Entities are the same when their type and primary value match; span,
/// body and origin are ignored. Each group is represented by its member
/// with the lowest hypothesis index (first seen on ties, or simply the first
/// member when none carry an index). The representative gets the group's
/// lowest index, the sorted distinct indices that produced it, and a score
/// of `distinct / hypothesis_count`. Sightings without an index do not count
/// toward the score. Output follows the order groups were first seen in.
pub fn consensus(entities: Vec<Entity>, hypothesis_count: usize) -> Vec<Entity> {
    if hypothesis_count == 0 && !entities.is_empty() {
        warn!(
            entities = entities.len(),
            "scoring entities against zero hypotheses"
        );
    }

    let mut groups: IndexMap<(String, String), Vec<Entity>> = IndexMap::new();
    for entity in entities {
        let key = (entity.entity_type().to_owned(), entity.normalized_value());
        groups.entry(key).or_default().push(entity);
    }

    groups
        .into_values()
        .filter_map(|members| represent(members, hypothesis_count))
        .collect()
}

fn represent(members: Vec<Entity>, hypothesis_count: usize) -> Option<Entity> {
    let indices: BTreeSet<usize> = members
        .iter()
        .filter_map(Entity::alternative_index)
        .collect();
    let lowest = indices.first().copied();

    let position = members
        .iter()
        .position(|member| member.alternative_index() == lowest)
        .unwrap_or(0);
    let representative = members.into_iter().nth(position)?;

    let score = if hypothesis_count == 0 {
        0.0
    } else {
        indices.len() as f64 / hypothesis_count as f64
    };

    Some(
        representative
            .with_alternative_index(lowest)
            .with_alternative_indices(indices.into_iter().collect())
            .with_score(Some(score)),
    )
}

/// Keep entities scoring strictly above `threshold`.
///
/// Unscored entities always pass, and no threshold passes everything.
pub fn threshold_filter(entities: Vec<Entity>, threshold: Option<f64>) -> Vec<Entity> {
    let Some(threshold) = threshold else {
        return entities;
    };

    entities
        .into_iter()
        .filter(|entity| entity.score().is_none_or(|score| score > threshold))
        .collect()
}

/// Keep temporal entities whose instant satisfies
/// `instant <comparison> reference_ms`; pass everything else through.
///
/// Surviving temporal entities come first, followed by the rest.
pub fn temporal_filter(
    entities: Vec<Entity>,
    comparison: Comparison,
    reference_ms: i64,
) -> Result<Vec<Entity>, NluError> {
    let (temporal, other): (Vec<_>, Vec<_>) =
        entities.into_iter().partition(Entity::is_temporal);

    let mut kept = Vec::with_capacity(temporal.len() + other.len());
    for entity in temporal {
        if comparison.holds(&entity.instant_ms()?, &reference_ms) {
            kept.push(entity);
        }
    }
    kept.extend(other);
    Ok(kept)
}

/// Post-filter settings shared by every extractor.
///
/// When both are configured the temporal constraint wins and the threshold
/// is ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Scoring {
    pub threshold: Option<f64>,
    #[serde(rename = "datetime_filter")]
    pub temporal: Option<Comparison>,
}

impl Scoring {
    pub fn with_threshold(threshold: f64) -> Self {
        Scoring {
            threshold: Some(threshold),
            temporal: None,
        }
    }

    pub fn with_temporal(comparison: Comparison) -> Self {
        Scoring {
            threshold: None,
            temporal: Some(comparison),
        }
    }

    /// Run consensus and then the configured post-filter.
    ///
    /// `temporal` overrides the configured comparison for this call. A
    /// temporal filter cannot run without a reference time, so that
    /// combination is an input error.
    pub fn reconcile(
        &self,
        entities: Vec<Entity>,
        hypothesis_count: usize,
        temporal: Option<Comparison>,
        reference_ms: Option<i64>,
    ) -> Result<Vec<Entity>, NluError> {
        let entities = consensus(entities, hypothesis_count);

        match (temporal.or(self.temporal), reference_ms) {
            (Some(comparison), Some(reference_ms)) => {
                temporal_filter(entities, comparison, reference_ms)
            }
            (Some(comparison), None) => Err(NluError::InputShape(format!(
                "filtering for {comparison:?} instants needs a reference time"
            ))),
            (None, _) => Ok(threshold_filter(entities, self.threshold)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use sluice_core::{EntityKind, EntityValue, Span};

    fn date(value: &str, index: Option<usize>) -> Entity {
        Entity::new(
            EntityKind::Time {
                grain: Some("day".into()),
            },
            "date",
            value,
            Span::new(0, value.len()),
            vec![EntityValue::Single(json!(value))],
        )
        .with_alternative_index(index)
    }

    fn people(count: i64, index: usize) -> Entity {
        Entity::new(
            EntityKind::People { unit: None },
            "people",
            count.to_string(),
            Span::new(0, 1),
            vec![EntityValue::Single(json!(count))],
        )
        .with_alternative_index(Some(index))
    }

    const JAN_27: &str = "2021-01-27T00:00:00.000+00:00";
    const FEB_01: &str = "2021-02-01T00:00:00.000+00:00";

    fn three_hypotheses() -> Vec<Entity> {
        vec![
            date(JAN_27, Some(0)),
            date(JAN_27, Some(1)),
            date(FEB_01, Some(1)),
            date(JAN_27, Some(2)),
        ]
    }

    #[test]
    fn it_scores_entities_by_agreement() {
        let reconciled = consensus(three_hypotheses(), 3);

        assert_eq!(reconciled.len(), 2);
        assert_eq!(reconciled[0].body(), JAN_27);
        assert_eq!(reconciled[0].score(), Some(1.0));
        assert_eq!(reconciled[0].alternative_index(), Some(0));
        assert_eq!(reconciled[0].alternative_indices(), [0, 1, 2]);
        assert_eq!(reconciled[1].body(), FEB_01);
        assert_eq!(reconciled[1].score(), Some(1.0 / 3.0));
        assert_eq!(reconciled[1].alternative_index(), Some(1));
    }

    #[test]
    fn it_drops_entities_at_or_below_the_threshold() {
        let kept = threshold_filter(consensus(three_hypotheses(), 3), Some(0.5));

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].body(), JAN_27);
    }

    #[test]
    fn it_keeps_unscored_entities_and_ignores_a_missing_threshold() {
        let unscored = vec![date(JAN_27, Some(0))];
        assert_eq!(threshold_filter(unscored.clone(), Some(0.9)), unscored);

        let scored = consensus(three_hypotheses(), 3);
        assert_eq!(threshold_filter(scored.clone(), None), scored);
    }

    #[test]
    fn it_selects_future_instants_and_keeps_non_temporal_entities() {
        let reference = 1_611_705_600_000 + 1; // just after 2021-01-27T00:00Z
        let entities = vec![
            date("2021-01-20T00:00:00.000+00:00", Some(0)),
            date("2021-02-03T00:00:00.000+00:00", Some(0)),
            people(4, 0),
        ];

        let kept = temporal_filter(entities, Comparison::Ge, reference).unwrap();

        let bodies: Vec<_> = kept.iter().map(Entity::body).collect();
        assert_eq!(bodies, vec!["2021-02-03T00:00:00.000+00:00", "4"]);
    }

    #[test]
    fn it_scores_nothing_against_zero_hypotheses() {
        assert!(consensus(vec![], 0).is_empty());

        let reconciled = consensus(vec![date(JAN_27, Some(0))], 0);
        assert_eq!(reconciled[0].score(), Some(0.0));
    }

    #[test]
    fn it_excludes_unindexed_sightings_from_the_score() {
        let reconciled = consensus(
            vec![date(JAN_27, None), date(JAN_27, Some(1)), date(JAN_27, None)],
            2,
        );
        assert_eq!(reconciled.len(), 1);
        assert_eq!(reconciled[0].score(), Some(0.5));
        assert_eq!(reconciled[0].alternative_index(), Some(1));

        let orphans = consensus(vec![date(JAN_27, None)], 2);
        assert_eq!(orphans[0].score(), Some(0.0));
        assert_eq!(orphans[0].alternative_index(), None);
        assert!(orphans[0].alternative_indices().is_empty());
    }

    #[test]
    fn it_counts_each_hypothesis_once() {
        let reconciled = consensus(vec![people(2, 0), people(2, 0), people(2, 1)], 4);
        assert_eq!(reconciled[0].score(), Some(0.5));
    }

    #[test]
    fn it_lets_the_temporal_filter_supersede_the_threshold() {
        let scoring = Scoring {
            threshold: Some(0.99),
            temporal: Some(Comparison::Ge),
        };
        let entities = vec![date(JAN_27, Some(0)), people(2, 1)];

        let kept = scoring
            .reconcile(entities, 3, None, Some(1_600_000_000_000))
            .unwrap();
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn it_refuses_to_filter_by_time_without_a_reference() {
        let scoring = Scoring {
            threshold: Some(0.9),
            temporal: Some(Comparison::Ge),
        };
        assert!(matches!(
            scoring.reconcile(three_hypotheses(), 3, None, None),
            Err(NluError::InputShape(_))
        ));

        let by_intent = Scoring::with_threshold(0.5);
        assert!(matches!(
            by_intent.reconcile(three_hypotheses(), 3, Some(Comparison::Le), None),
            Err(NluError::InputShape(_))
        ));
        assert_eq!(by_intent.reconcile(three_hypotheses(), 3, None, None).unwrap().len(), 1);
    }

    #[test]
    fn it_reads_scoring_from_configuration() {
        let scoring: Scoring =
            serde_json::from_value(json!({"threshold": 0.2, "datetime_filter": "future"}))
                .unwrap();
        assert_eq!(scoring.temporal, Some(Comparison::Ge));

        assert!(serde_json::from_value::<Scoring>(json!({"datetime_filter": "soonish"})).is_err());
    }

    fn arbitrary_entities() -> impl Strategy<Value = (Vec<Entity>, usize)> {
        (1usize..6).prop_flat_map(|hypotheses| {
            let sighting = (0..4i64, 0..hypotheses, any::<bool>()).prop_map(
                |(value, index, indexed)| {
                    let entity = people(value, index);
                    if indexed {
                        entity
                    } else {
                        entity.with_alternative_index(None)
                    }
                },
            );
            (prop::collection::vec(sighting, 0..24), Just(hypotheses))
        })
    }

    proptest! {
        #[test]
        fn consensus_yields_one_entity_per_type_and_value((entities, hypotheses) in arbitrary_entities()) {
            let distinct: BTreeSet<_> = entities
                .iter()
                .map(|entity| (entity.entity_type().to_owned(), entity.normalized_value()))
                .collect();

            let reconciled = consensus(entities, hypotheses);
            prop_assert_eq!(reconciled.len(), distinct.len());
        }

        #[test]
        fn score_is_distinct_indices_over_hypotheses((entities, hypotheses) in arbitrary_entities()) {
            for entity in consensus(entities.clone(), hypotheses) {
                let distinct: BTreeSet<_> = entities
                    .iter()
                    .filter(|other| other.normalized_value() == entity.normalized_value())
                    .filter_map(Entity::alternative_index)
                    .collect();
                prop_assert_eq!(entity.score(), Some(distinct.len() as f64 / hypotheses as f64));
            }
        }

        #[test]
        fn raising_the_threshold_never_keeps_more(
            (entities, hypotheses) in arbitrary_entities(),
            low in 0.0f64..1.0,
            delta in 0.0f64..1.0,
        ) {
            let scored = consensus(entities, hypotheses);
            let loose = threshold_filter(scored.clone(), Some(low));
            let strict = threshold_filter(scored, Some(low + delta));

            prop_assert!(strict.iter().all(|entity| loose.contains(entity)));
        }
    }
}
