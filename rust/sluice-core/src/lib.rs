//! Core of the Sluice NLU toolkit.
//!
//! A turn of conversation enters as a [`RequestState`] holding ASR
//! hypotheses and conversation context. A [`Workflow`] passes it through an
//! ordered list of [`Plugin`]s. Each plugin reads the request and the
//! [`ResponseState`] built so far, and may return a value. The workflow
//! writes that value to the plugin's [`Destination`]. Records are never
//! edited in place; every write produces new values.
//!
//! ```rust,ignore
//! let workflow = Workflow::new(vec![Box::new(extractor), Box::new(classifier)])?;
//! let request = RequestState::builder()
//!     .alternatives(["book a table for two", "book a table for too"])
//!     .build()?;
//! let (_, response) = workflow.run(request, None).await?;
//! ```
//!
//! The same workflow also drives training: [`Workflow::train`] hands a
//! [`TrainingSet`] to each plugin's `train` and `transform` hooks in turn.

mod compare;
mod destination;
mod entity;
mod error;
mod guard;
mod intent;
mod plugin;
mod request;
mod response;
mod training;
pub mod utterance;
mod workflow;

pub use compare::Comparison;
pub use destination::{Destination, OutputKind, PluginOutput, WritePolicy};
pub use entity::{DATE, DATETIME, Entity, EntityKind, EntityValue, Span, TIME, time_entity_type};
pub use error::NluError;
pub use guard::{Condition, Field, Guard, Operator, any_holds};
pub use intent::{Intent, Slot};
pub use plugin::{Plugin, Wiring};
pub use request::{RequestState, RequestStateBuilder};
pub use response::ResponseState;
pub use training::{Row, TrainingSet};
pub use utterance::{Hypothesis, Utterances};
pub use workflow::{Invocation, Workflow};
