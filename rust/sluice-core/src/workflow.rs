//! The execution engine.
//!
//! A [`Workflow`] owns an ordered list of plugins and drives them one after
//! another, either over a single turn ([`Workflow::run`]) or over a training
//! table ([`Workflow::train`]). It performs no recovery: the first plugin
//! error ends the turn and is returned exactly as the plugin produced it.

use std::fmt;
use std::time::Instant;

use tracing::{debug, warn};

use crate::{NluError, Plugin, RequestState, ResponseState, TrainingSet};

/// What happened to a plugin during one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    /// A guard vetoed the plugin; `apply` was never called.
    Skipped,
    /// The plugin returned a value and it was written.
    Written,
    /// The plugin ran and had nothing to say.
    NoOp,
}

pub struct Workflow {
    plugins: Vec<Box<dyn Plugin>>,
}

impl Workflow {
    /// Assemble a workflow, checking every plugin's output against its
    /// destination up front.
    pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Result<Self, NluError> {
        for plugin in &plugins {
            check_wiring(plugin.as_ref())?;
        }
        Ok(Workflow { plugins })
    }

    pub fn plugin_names(&self) -> impl Iterator<Item = &str> {
        self.plugins.iter().map(|plugin| plugin.name())
    }

    /// Process one turn.
    ///
    /// Plugins run in declared order and each sees every write committed
    /// before it. With no `response`, the turn starts from an empty one.
    pub async fn run(
        &self,
        request: RequestState,
        response: Option<ResponseState>,
    ) -> Result<(RequestState, ResponseState), NluError> {
        let mut request = request;
        let mut response = response.unwrap_or_default();

        for plugin in &self.plugins {
            let started = Instant::now();
            let (invocation, next_request, next_response) =
                invoke(plugin.as_ref(), request, response).await?;
            request = next_request;
            response = next_response;

            debug!(
                plugin = plugin.name(),
                outcome = ?invocation,
                elapsed_us = started.elapsed().as_micros() as u64,
                intents = response.intents().len(),
                entities = response.entities().len(),
                "plugin finished"
            );
        }

        Ok((request, response))
    }

    /// Run one training epoch.
    ///
    /// Each plugin first trains on the current table and then transforms it;
    /// the transformed table is what the next plugin sees. Returns the table
    /// after the last transform.
    pub async fn train(&mut self, data: TrainingSet) -> Result<TrainingSet, NluError> {
        let mut data = data;

        for plugin in &mut self.plugins {
            let started = Instant::now();
            plugin.train(&data).await?;

            let before = data.len();
            data = plugin.transform(data).await?;
            let after = data.len();

            if after > before {
                return Err(NluError::TransformAddedRows {
                    plugin: plugin.name().to_owned(),
                    before,
                    after,
                });
            }
            if after < before {
                warn!(
                    plugin = plugin.name(),
                    dropped = before - after,
                    remaining = after,
                    "transform dropped training rows"
                );
            }

            debug!(
                plugin = plugin.name(),
                rows = after,
                elapsed_us = started.elapsed().as_micros() as u64,
                "plugin trained"
            );
        }

        Ok(data)
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.plugin_names()).finish()
    }
}

async fn invoke(
    plugin: &dyn Plugin,
    request: RequestState,
    response: ResponseState,
) -> Result<(Invocation, RequestState, ResponseState), NluError> {
    if plugin.should_skip(&request, &response) {
        return Ok((Invocation::Skipped, request, response));
    }

    let Some(output) = plugin.apply(&request, &response).await? else {
        return Ok((Invocation::NoOp, request, response));
    };

    let destination = plugin
        .destination()
        .ok_or_else(|| NluError::MissingDestination {
            plugin: plugin.name().to_owned(),
        })?;

    let (request, response) =
        destination.write(plugin.name(), output, plugin.write_policy(), request, response)?;
    Ok((Invocation::Written, request, response))
}

fn check_wiring(plugin: &dyn Plugin) -> Result<(), NluError> {
    let Some(produced) = plugin.produces() else {
        return Ok(());
    };

    match plugin.destination() {
        None => Err(NluError::MissingDestination {
            plugin: plugin.name().to_owned(),
        }),
        Some(destination) if destination.accepts() != produced => {
            Err(NluError::DestinationMismatch {
                plugin: plugin.name().to_owned(),
                produced: produced.to_string(),
                destination: destination.path().to_owned(),
            })
        }
        Some(_) => Ok(()),
    }
}
