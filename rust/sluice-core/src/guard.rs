//! Guards veto a plugin for the current turn.
//!
//! Most guards are plain data: a [`Condition`] names a field of the turn, an
//! [`Operator`] and an operand, and is evaluated by [`Condition::holds`].
//! Conditions deserialize from configuration such as
//!
//! ```json
//! { "field": "current_state", "op": "in", "value": ["COF", "PAYMENT"] }
//! ```
//!
//! For anything the closed set cannot express there is [`Guard::custom`].

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::{Comparison, NluError, RequestState, ResponseState};

/// A field of the turn a condition can inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    CurrentState,
    PreviousIntent,
    NlsLabel,
    Lang,
    Locale,
    Timezone,
    BestTranscript,
    ReferenceTime,
    TopIntent,
    TopIntentScore,
    EntityCount,
}

impl Field {
    fn resolve(&self, request: &RequestState, response: &ResponseState) -> Option<Value> {
        match self {
            Field::CurrentState => request.current_state().map(Value::from),
            Field::PreviousIntent => request.previous_intent().map(Value::from),
            Field::NlsLabel => request.nls_label().map(Value::from),
            Field::Lang => Some(Value::from(request.lang())),
            Field::Locale => Some(Value::from(request.locale())),
            Field::Timezone => Some(Value::from(request.timezone())),
            Field::BestTranscript => Some(Value::from(request.best_transcript())),
            Field::ReferenceTime => request.reference_time().map(Value::from),
            Field::TopIntent => response.top_intent().map(|intent| Value::from(intent.name())),
            Field::TopIntentScore => response.top_intent().map(|intent| Value::from(intent.score())),
            Field::EntityCount => Some(Value::from(response.entities().len())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Operator {
    Compare(Comparison),
    In,
    NotIn,
    Exists,
    Missing,
}

impl TryFrom<String> for Operator {
    type Error = NluError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        match name.as_str() {
            "in" => Ok(Operator::In),
            "not_in" => Ok(Operator::NotIn),
            "exists" => Ok(Operator::Exists),
            "missing" => Ok(Operator::Missing),
            other => Ok(Operator::Compare(other.parse()?)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawCondition")]
pub struct Condition {
    field: Field,
    operator: Operator,
    operand: Value,
}

#[derive(Deserialize)]
struct RawCondition {
    field: Field,
    op: Operator,
    #[serde(default)]
    value: Value,
}

impl TryFrom<RawCondition> for Condition {
    type Error = NluError;

    fn try_from(raw: RawCondition) -> Result<Self, Self::Error> {
        Condition::new(raw.field, raw.op, raw.value)
    }
}

impl Condition {
    /// Build a condition, checking that the operand suits the operator.
    pub fn new(field: Field, operator: Operator, operand: Value) -> Result<Self, NluError> {
        match operator {
            Operator::In | Operator::NotIn if !operand.is_array() => {
                return Err(NluError::Configuration(format!(
                    "{operator:?} on {field:?} needs a list operand, got {operand}"
                )));
            }
            Operator::Compare(_) if operand.is_array() || operand.is_object() => {
                return Err(NluError::Configuration(format!(
                    "comparison on {field:?} needs a scalar operand, got {operand}"
                )));
            }
            _ => {}
        }

        Ok(Condition {
            field,
            operator,
            operand,
        })
    }

    /// Shorthand for `field == value`.
    pub fn equals(field: Field, value: impl Into<Value>) -> Self {
        Condition {
            field,
            operator: Operator::Compare(Comparison::Eq),
            operand: value.into(),
        }
    }

    pub fn holds(&self, request: &RequestState, response: &ResponseState) -> bool {
        let actual = self.field.resolve(request, response);

        match (&self.operator, actual) {
            (Operator::Exists, actual) => actual.is_some(),
            (Operator::Missing, actual) => actual.is_none(),
            (_, None) => false,
            (Operator::In, Some(actual)) => self.members().any(|member| *member == actual),
            (Operator::NotIn, Some(actual)) => !self.members().any(|member| *member == actual),
            (Operator::Compare(comparison), Some(actual)) => {
                match order(&actual, &self.operand) {
                    Some(ordering) => comparison.holds(&ordering, &Ordering::Equal),
                    None => matches!(comparison, Comparison::Ne),
                }
            }
        }
    }

    fn members(&self) -> impl Iterator<Item = &Value> {
        self.operand.as_array().into_iter().flatten()
    }
}

/// Order two scalars of the same kind; mixed kinds are unordered.
fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        (Value::Number(left), Value::Number(right)) => left.as_f64()?.partial_cmp(&right.as_f64()?),
        (Value::Bool(left), Value::Bool(right)) => Some(left.cmp(right)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

type Predicate = dyn Fn(&RequestState, &ResponseState) -> bool + Send + Sync;

/// A predicate that, when true, skips its plugin.
#[derive(Clone, Deserialize)]
#[serde(from = "Condition")]
pub enum Guard {
    Condition(Condition),
    Custom(Arc<Predicate>),
}

impl Guard {
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&RequestState, &ResponseState) -> bool + Send + Sync + 'static,
    {
        Guard::Custom(Arc::new(predicate))
    }

    pub fn holds(&self, request: &RequestState, response: &ResponseState) -> bool {
        match self {
            Guard::Condition(condition) => condition.holds(request, response),
            Guard::Custom(predicate) => predicate(request, response),
        }
    }
}

impl From<Condition> for Guard {
    fn from(condition: Condition) -> Self {
        Guard::Condition(condition)
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::Condition(condition) => f.debug_tuple("Condition").field(condition).finish(),
            Guard::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// True when any guard holds. Stops at the first that does.
pub fn any_holds(guards: &[Guard], request: &RequestState, response: &ResponseState) -> bool {
    guards.iter().any(|guard| guard.holds(request, response))
}
