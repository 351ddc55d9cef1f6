//! The contract every pipeline stage implements.

use async_trait::async_trait;

use crate::{
    Destination, Guard, NluError, OutputKind, PluginOutput, RequestState, ResponseState,
    TrainingSet, WritePolicy, guard,
};

/// A unit of computation a [`crate::Workflow`] can drive.
///
/// Only [`Plugin::name`] and [`Plugin::apply`] are required. A plugin that
/// returns a value from `apply` must also name a [`Plugin::destination`]
/// and say what it [`Plugin::produces`] so the workflow can check the two
/// agree before any turn runs.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Identifier used in logs and entity provenance trails.
    fn name(&self) -> &str;

    /// Compute this plugin's contribution to the turn.
    ///
    /// Inputs are read only; the only way to change the turn is the
    /// returned value, which the workflow writes to [`Plugin::destination`].
    async fn apply(
        &self,
        request: &RequestState,
        response: &ResponseState,
    ) -> Result<Option<PluginOutput>, NluError>;

    fn guards(&self) -> &[Guard] {
        &[]
    }

    fn destination(&self) -> Option<Destination> {
        None
    }

    fn write_policy(&self) -> WritePolicy {
        WritePolicy::default()
    }

    fn produces(&self) -> Option<OutputKind> {
        None
    }

    fn should_skip(&self, request: &RequestState, response: &ResponseState) -> bool {
        guard::any_holds(self.guards(), request, response)
    }

    /// Fit any model the plugin owns on `data`.
    async fn train(&mut self, _data: &TrainingSet) -> Result<(), NluError> {
        Ok(())
    }

    /// Rewrite the training table for downstream plugins.
    ///
    /// May add or change columns and may drop rows it cannot use, but must
    /// never add rows.
    async fn transform(&self, data: TrainingSet) -> Result<TrainingSet, NluError> {
        Ok(data)
    }
}

/// The placement settings most plugins share.
#[derive(Debug, Clone, Default)]
pub struct Wiring {
    pub destination: Option<Destination>,
    pub guards: Vec<Guard>,
    pub policy: WritePolicy,
}

impl Wiring {
    pub fn to(destination: Destination) -> Self {
        Wiring {
            destination: Some(destination),
            ..Wiring::default()
        }
    }

    pub fn with_guard(mut self, guard: impl Into<Guard>) -> Self {
        self.guards.push(guard.into());
        self
    }

    pub fn with_policy(mut self, policy: WritePolicy) -> Self {
        self.policy = policy;
        self
    }
}
