// SPDX-License-Identifier: MIT

//! Resolver execution: the only asynchronous stage of a tick.
//!
//! Resolvers are named computations that may perform I/O or read host
//! state. They run concurrently within one tick's batch, bounded by the
//! tick deadline; one resolver's failure fails every item that declared it
//! but does not cancel its peers. Outputs are plain `StateValue`s so they
//! can be recorded and substituted verbatim during replay.

use crate::definition::LandDefinition;
use async_trait::async_trait;
use land_core::{Clock, LandId, Snapshot, StateValue};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Read-only context a resolver computes from.
pub struct ResolverCtx {
    pub land_id: LandId,
    pub tick_id: u64,
    /// State at the start of the tick. Resolvers never see mid-tick writes.
    pub snapshot: Snapshot,
    /// Cancelled at the tick deadline or on keeper shutdown.
    pub cancel: CancellationToken,
}

/// Resolver failure, surfaced to every dependent item.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolverError {
    #[error("{0}")]
    Failed(String),

    #[error("cancelled at tick deadline")]
    Cancelled,
}

impl ResolverError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// A named asynchronous computation whose output handlers consume.
#[async_trait]
pub trait Resolver: Send + Sync {
    fn name(&self) -> &str;

    async fn resolve(&self, ctx: &ResolverCtx) -> Result<StateValue, ResolverError>;
}

/// Typed-access map of one tick's resolver outputs.
///
/// Internally results are stored as `(name, Result)` so failures propagate
/// per dependent handler; the map is discarded after the tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolverOutputs {
    outputs: BTreeMap<String, Result<StateValue, String>>,
}

/// Failure to read a resolver output from a handler.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("resolver {0:?} was not declared by this handler")]
    NotDeclared(String),

    #[error("resolver {name:?} failed: {message}")]
    Failed { name: String, message: String },

    #[error("resolver {name:?} output does not deserialize: {message}")]
    Shape { name: String, message: String },
}

impl ResolverOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, result: Result<StateValue, String>) {
        self.outputs.insert(name.into(), result);
    }

    pub fn get(&self, name: &str) -> Option<&Result<StateValue, String>> {
        self.outputs.get(name)
    }

    /// First failed resolver among `names`, if any.
    pub fn first_failure<'a, 'b>(&'a self, names: &'b [String]) -> Option<(&'b str, &'a str)> {
        for name in names {
            match self.outputs.get(name.as_str()) {
                Some(Err(message)) => return Some((name, message)),
                Some(Ok(_)) => {}
                None => return Some((name, "resolver did not run")),
            }
        }
        None
    }

    /// Deserialize one output into a handler-chosen type.
    pub fn value<T: DeserializeOwned>(&self, name: &str) -> Result<T, OutputError> {
        match self.outputs.get(name) {
            None => Err(OutputError::NotDeclared(name.to_string())),
            Some(Err(message)) => Err(OutputError::Failed {
                name: name.to_string(),
                message: message.clone(),
            }),
            Some(Ok(value)) => {
                let json = serde_json::to_value(value).map_err(|e| OutputError::Shape {
                    name: name.to_string(),
                    message: e.to_string(),
                })?;
                serde_json::from_value(json).map_err(|e| OutputError::Shape {
                    name: name.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Result<StateValue, String>)> {
        self.outputs.iter().map(|(name, result)| (name.as_str(), result))
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// Run the named resolvers concurrently against one tick's snapshot.
///
/// Outstanding resolvers are cancelled at `deadline` and report as failed;
/// completed peers keep their outputs.
pub async fn run_resolvers(
    definition: &LandDefinition,
    names: &BTreeSet<String>,
    ctx: &ResolverCtx,
    deadline: Duration,
) -> ResolverOutputs {
    let mut outputs = ResolverOutputs::new();
    if names.is_empty() {
        return outputs;
    }

    let timer = ctx.cancel.clone();
    let deadline_guard = tokio::spawn(async move {
        tokio::time::sleep(deadline).await;
        timer.cancel();
    });

    let futures = names.iter().map(|name| {
        let resolver = definition.resolver(name).cloned();
        async move {
            let result = match resolver {
                None => Err(ResolverError::failed(format!("unknown resolver {name:?}"))),
                Some(resolver) => {
                    tokio::select! {
                        result = resolver.resolve(ctx) => result,
                        () = ctx.cancel.cancelled() => Err(ResolverError::Cancelled),
                    }
                }
            };
            (name.clone(), result)
        }
    });

    for (name, result) in futures_util::future::join_all(futures).await {
        match &result {
            Ok(_) => tracing::debug!(resolver = %name, "resolver ok"),
            Err(e) => tracing::warn!(resolver = %name, error = %e, "resolver failed"),
        }
        outputs.insert(name, result.map_err(|e| e.to_string()));
    }

    deadline_guard.abort();
    outputs
}

/// Deterministic timestamp resolver: hands handlers the tick's wall-clock
/// reading. In replay the recorded value is substituted, so handlers stay
/// oblivious to the mode.
#[derive(Clone)]
pub struct TickClockResolver<C: Clock> {
    clock: C,
}

impl<C: Clock> TickClockResolver<C> {
    pub const NAME: &'static str = "tick_clock";

    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl<C: Clock + 'static> Resolver for TickClockResolver<C> {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn resolve(&self, _ctx: &ResolverCtx) -> Result<StateValue, ResolverError> {
        Ok(StateValue::Int(self.clock.epoch_ms() as i64))
    }
}

/// Per-Land seeded RNG resolver. Draws are recorded like any resolver
/// output, so replay never re-rolls.
pub struct LandRngResolver {
    rng: parking_lot::Mutex<StdRng>,
}

impl LandRngResolver {
    pub const NAME: &'static str = "land_rng";

    /// Seed derived from the land id and a caller salt, stable across
    /// processes.
    pub fn seeded(land_id: &LandId, salt: u64) -> Self {
        let digest = Sha256::digest(format!("{land_id}:{salt}").as_bytes());
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest);
        Self { rng: parking_lot::Mutex::new(StdRng::from_seed(seed)) }
    }
}

#[async_trait]
impl Resolver for LandRngResolver {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn resolve(&self, _ctx: &ResolverCtx) -> Result<StateValue, ResolverError> {
        let draw: i64 = self.rng.lock().gen();
        Ok(StateValue::Int(draw))
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
