// SPDX-License-Identifier: MIT

//! Land definitions: the rule set behind one land type.
//!
//! A definition carries the state schema, the initial-state factory, the
//! type-erased handler registries (actions, client events, lifecycle, tick)
//! with their declared resolver dependencies, and the per-land
//! configuration. Definitions are built once at startup and shared
//! read-only between every keeper of that type.

use crate::resolver::{Resolver, ResolverOutputs};
use land_core::{
    ClientError, ClientIdentity, LandConfig, LandId, NodeSchema, PlayerId, SchemaError,
    ServerEvent, SessionId, StateDraft, StateValue,
};
use land_wire::{PathTable, PathTableError};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// A join reaching the engine, after identity resolution.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub request_id: u64,
    pub land_id: LandId,
    pub identity: ClientIdentity,
    pub metadata: StateValue,
}

/// Failure of one handler invocation. Fails the current input only.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Typed error the handler wants the client to see.
    #[error("{0}")]
    Rejected(ClientError),

    /// Untyped failure; surfaced as `HANDLER_FAILED`.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// The client-facing error for this failure.
    pub fn to_client_error(&self) -> ClientError {
        match self {
            Self::Rejected(error) => error.clone(),
            Self::Failed(message) => {
                ClientError::new(land_core::codes::HANDLER_FAILED, message.clone())
            }
        }
    }
}

impl From<ClientError> for HandlerError {
    fn from(error: ClientError) -> Self {
        Self::Rejected(error)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::Failed(message.to_string())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::Failed(message)
    }
}

/// Execution context handed to every handler.
///
/// Carries the identity of the originating input, the tick's resolver
/// outputs, and the per-item event buffer. Handlers are synchronous; the
/// context never exposes host state.
pub struct HandlerCtx<'a> {
    pub tick_id: u64,
    pub land_id: &'a LandId,
    pub session_id: Option<&'a SessionId>,
    pub player_id: Option<&'a PlayerId>,
    resolved: &'a ResolverOutputs,
    events: Vec<ServerEvent>,
}

impl<'a> HandlerCtx<'a> {
    pub(crate) fn new(
        tick_id: u64,
        land_id: &'a LandId,
        session_id: Option<&'a SessionId>,
        player_id: Option<&'a PlayerId>,
        resolved: &'a ResolverOutputs,
    ) -> Self {
        Self { tick_id, land_id, session_id, player_id, resolved, events: Vec::new() }
    }

    /// Emit a domain event. Buffered per item; discarded when the handler
    /// fails, flushed with the tick otherwise.
    pub fn emit(&mut self, event: ServerEvent) {
        self.events.push(event);
    }

    /// Typed access to a resolver output this handler declared.
    pub fn resolved<T: DeserializeOwned>(&self, name: &str) -> Result<T, HandlerError> {
        self.resolved.value(name).map_err(|e| HandlerError::Failed(e.to_string()))
    }

    pub(crate) fn take_events(self) -> Vec<ServerEvent> {
        self.events
    }
}

/// Action handler: mutates the draft, returns the response payload.
pub type ActionFn = Arc<
    dyn Fn(&mut StateDraft, &StateValue, &mut HandlerCtx<'_>) -> Result<StateValue, HandlerError>
        + Send
        + Sync,
>;

/// Client event / lifecycle / tick handler: mutates the draft.
pub type EventFn = Arc<
    dyn Fn(&mut StateDraft, &StateValue, &mut HandlerCtx<'_>) -> Result<(), HandlerError>
        + Send
        + Sync,
>;

/// Join gate: inspect the request against the current state.
pub type CanJoinFn =
    Arc<dyn Fn(&JoinRequest, &StateValue) -> Result<(), ClientError> + Send + Sync>;

/// Finalize hook: observes the last state before the keeper is destroyed.
pub type FinalizeFn = Arc<dyn Fn(&StateValue) + Send + Sync>;

/// A handler together with the resolvers it depends on.
#[derive(Clone)]
pub struct HandlerSpec<F> {
    pub resolvers: Vec<String>,
    pub run: F,
}

/// Errors from building a definition.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    PathTable(#[from] PathTableError),

    #[error("handler {handler:?} declares unknown resolver {resolver:?}")]
    UnknownResolver { handler: String, resolver: String },
}

/// The complete rule set for one land type.
pub struct LandDefinition {
    land_type: String,
    schema: Arc<NodeSchema>,
    path_table: Arc<PathTable>,
    config: LandConfig,
    initial_state: Arc<dyn Fn(&LandId) -> StateValue + Send + Sync>,
    actions: HashMap<String, HandlerSpec<ActionFn>>,
    events: HashMap<String, HandlerSpec<EventFn>>,
    on_tick: Option<HandlerSpec<EventFn>>,
    on_join: Option<HandlerSpec<EventFn>>,
    on_leave: Option<HandlerSpec<EventFn>>,
    on_init: Option<HandlerSpec<EventFn>>,
    on_finalize: Option<FinalizeFn>,
    can_join: Option<CanJoinFn>,
    resolvers: HashMap<String, Arc<dyn Resolver>>,
}

impl LandDefinition {
    pub fn builder(land_type: impl Into<String>) -> LandDefinitionBuilder {
        LandDefinitionBuilder::new(land_type)
    }

    pub fn land_type(&self) -> &str {
        &self.land_type
    }

    pub fn schema(&self) -> &Arc<NodeSchema> {
        &self.schema
    }

    pub fn path_table(&self) -> &Arc<PathTable> {
        &self.path_table
    }

    pub fn config(&self) -> &LandConfig {
        &self.config
    }

    pub fn initial_state(&self, land_id: &LandId) -> StateValue {
        (self.initial_state)(land_id)
    }

    pub fn action(&self, type_id: &str) -> Option<&HandlerSpec<ActionFn>> {
        self.actions.get(type_id)
    }

    pub fn event(&self, type_id: &str) -> Option<&HandlerSpec<EventFn>> {
        self.events.get(type_id)
    }

    pub fn on_tick(&self) -> Option<&HandlerSpec<EventFn>> {
        self.on_tick.as_ref()
    }

    pub fn on_join(&self) -> Option<&HandlerSpec<EventFn>> {
        self.on_join.as_ref()
    }

    pub fn on_leave(&self) -> Option<&HandlerSpec<EventFn>> {
        self.on_leave.as_ref()
    }

    pub fn on_init(&self) -> Option<&HandlerSpec<EventFn>> {
        self.on_init.as_ref()
    }

    pub fn on_finalize(&self) -> Option<&FinalizeFn> {
        self.on_finalize.as_ref()
    }

    /// Evaluate the join gate against the current state.
    pub fn check_join(&self, request: &JoinRequest, state: &StateValue) -> Result<(), ClientError> {
        match &self.can_join {
            Some(gate) => gate(request, state),
            None => Ok(()),
        }
    }

    pub fn resolver(&self, name: &str) -> Option<&Arc<dyn Resolver>> {
        self.resolvers.get(name)
    }

    /// True when every synchronized field is visible identically to all
    /// sessions, the precondition for shared (encode-once) updates.
    pub fn broadcast_only(&self) -> bool {
        use land_core::SyncPolicy;
        self.schema.fields().all(|(_, field)| {
            matches!(
                field.policy,
                SyncPolicy::Broadcast | SyncPolicy::ServerOnly | SyncPolicy::Internal
            )
        })
    }

    /// JSON description of this land type for the schema document.
    pub fn describe(&self) -> serde_json::Value {
        let actions: serde_json::Map<String, serde_json::Value> = self
            .actions
            .iter()
            .map(|(name, spec)| {
                (name.clone(), serde_json::json!({ "resolvers": &spec.resolvers }))
            })
            .collect();
        let events: serde_json::Map<String, serde_json::Value> = self
            .events
            .iter()
            .map(|(name, spec)| {
                (name.clone(), serde_json::json!({ "resolvers": &spec.resolvers }))
            })
            .collect();
        serde_json::json!({
            "state": self.schema.describe(),
            "actions": actions,
            "events": events,
            "config": &self.config,
        })
    }
}

/// Builder for [`LandDefinition`]. Validation happens in `build`.
pub struct LandDefinitionBuilder {
    land_type: String,
    schema: NodeSchema,
    config: LandConfig,
    initial_state: Option<Arc<dyn Fn(&LandId) -> StateValue + Send + Sync>>,
    actions: HashMap<String, HandlerSpec<ActionFn>>,
    events: HashMap<String, HandlerSpec<EventFn>>,
    on_tick: Option<HandlerSpec<EventFn>>,
    on_join: Option<HandlerSpec<EventFn>>,
    on_leave: Option<HandlerSpec<EventFn>>,
    on_init: Option<HandlerSpec<EventFn>>,
    on_finalize: Option<FinalizeFn>,
    can_join: Option<CanJoinFn>,
    resolvers: HashMap<String, Arc<dyn Resolver>>,
}

impl LandDefinitionBuilder {
    fn new(land_type: impl Into<String>) -> Self {
        Self {
            land_type: land_type.into(),
            schema: NodeSchema::new(),
            config: LandConfig::default(),
            initial_state: None,
            actions: HashMap::new(),
            events: HashMap::new(),
            on_tick: None,
            on_join: None,
            on_leave: None,
            on_init: None,
            on_finalize: None,
            can_join: None,
            resolvers: HashMap::new(),
        }
    }

    pub fn schema(mut self, schema: NodeSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn config(mut self, config: LandConfig) -> Self {
        self.config = config;
        self
    }

    pub fn initial_state(
        mut self,
        factory: impl Fn(&LandId) -> StateValue + Send + Sync + 'static,
    ) -> Self {
        self.initial_state = Some(Arc::new(factory));
        self
    }

    pub fn action(
        mut self,
        type_id: impl Into<String>,
        resolvers: impl IntoIterator<Item = &'static str>,
        handler: impl Fn(&mut StateDraft, &StateValue, &mut HandlerCtx<'_>) -> Result<StateValue, HandlerError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.actions.insert(
            type_id.into(),
            HandlerSpec {
                resolvers: resolvers.into_iter().map(str::to_string).collect(),
                run: Arc::new(handler),
            },
        );
        self
    }

    pub fn event(
        mut self,
        type_id: impl Into<String>,
        resolvers: impl IntoIterator<Item = &'static str>,
        handler: impl Fn(&mut StateDraft, &StateValue, &mut HandlerCtx<'_>) -> Result<(), HandlerError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.events.insert(
            type_id.into(),
            HandlerSpec {
                resolvers: resolvers.into_iter().map(str::to_string).collect(),
                run: Arc::new(handler),
            },
        );
        self
    }

    pub fn on_tick(
        mut self,
        resolvers: impl IntoIterator<Item = &'static str>,
        handler: impl Fn(&mut StateDraft, &StateValue, &mut HandlerCtx<'_>) -> Result<(), HandlerError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.on_tick = Some(HandlerSpec {
            resolvers: resolvers.into_iter().map(str::to_string).collect(),
            run: Arc::new(handler),
        });
        self
    }

    pub fn on_join(
        mut self,
        handler: impl Fn(&mut StateDraft, &StateValue, &mut HandlerCtx<'_>) -> Result<(), HandlerError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.on_join = Some(HandlerSpec { resolvers: Vec::new(), run: Arc::new(handler) });
        self
    }

    pub fn on_leave(
        mut self,
        handler: impl Fn(&mut StateDraft, &StateValue, &mut HandlerCtx<'_>) -> Result<(), HandlerError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.on_leave = Some(HandlerSpec { resolvers: Vec::new(), run: Arc::new(handler) });
        self
    }

    pub fn on_init(
        mut self,
        handler: impl Fn(&mut StateDraft, &StateValue, &mut HandlerCtx<'_>) -> Result<(), HandlerError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.on_init = Some(HandlerSpec { resolvers: Vec::new(), run: Arc::new(handler) });
        self
    }

    pub fn on_finalize(mut self, hook: impl Fn(&StateValue) + Send + Sync + 'static) -> Self {
        self.on_finalize = Some(Arc::new(hook));
        self
    }

    pub fn can_join(
        mut self,
        gate: impl Fn(&JoinRequest, &StateValue) -> Result<(), ClientError> + Send + Sync + 'static,
    ) -> Self {
        self.can_join = Some(Arc::new(gate));
        self
    }

    pub fn resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolvers.insert(resolver.name().to_string(), Arc::new(resolver));
        self
    }

    /// Validate and freeze the definition.
    pub fn build(self) -> Result<LandDefinition, DefinitionError> {
        self.schema.check()?;
        let path_table = Arc::new(PathTable::from_schema(&self.schema)?);

        let check = |handler: &str, resolvers: &[String]| -> Result<(), DefinitionError> {
            for resolver in resolvers {
                if !self.resolvers.contains_key(resolver) {
                    return Err(DefinitionError::UnknownResolver {
                        handler: handler.to_string(),
                        resolver: resolver.clone(),
                    });
                }
            }
            Ok(())
        };
        for (name, spec) in &self.actions {
            check(name, &spec.resolvers)?;
        }
        for (name, spec) in &self.events {
            check(name, &spec.resolvers)?;
        }
        if let Some(spec) = &self.on_tick {
            check("on_tick", &spec.resolvers)?;
        }

        Ok(LandDefinition {
            land_type: self.land_type,
            schema: Arc::new(self.schema),
            path_table,
            config: self.config,
            initial_state: self
                .initial_state
                .unwrap_or_else(|| Arc::new(|_| StateValue::Map(Default::default()))),
            actions: self.actions,
            events: self.events,
            on_tick: self.on_tick,
            on_join: self.on_join,
            on_leave: self.on_leave,
            on_init: self.on_init,
            on_finalize: self.on_finalize,
            can_join: self.can_join,
            resolvers: self.resolvers,
        })
    }
}

#[cfg(test)]
#[path = "definition_tests.rs"]
mod tests;
