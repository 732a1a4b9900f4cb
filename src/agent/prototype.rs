use std::sync::Arc;

use rand::RngCore;

use crate::agent::behaviour::AgentBehaviour;
use crate::agent::definitions::{AgentName, DefinitionError};
use crate::agent::runtime::LiveAgent;
use crate::agent::store::AgentStore;
use crate::agent::AgentId;
use crate::compiler::expression::{EvalCtx, EvalFn};
use crate::population::PopulationView;
use crate::values::{Value, ValueType};

/// A factory bound to a concrete argument vector (and optionally a named
/// starting state): hands out one fresh agent per identifier.
pub type AgentFactory = Box<dyn Fn(AgentId) -> LiveAgent + Send + Sync>;

/// エージェントのひな型
///
/// The immutable per-species template: parameter types, store constructor,
/// perception, behaviour and continuous time update. Created once at model
/// compilation; never mutated afterwards.
pub struct AgentPrototype {
    name: AgentName,
    parameters: Vec<ValueType>,
    param_slots: Vec<usize>,
    store_width: usize,
    /// Attribute initializers, evaluated in declaration order so later
    /// attributes may read earlier ones.
    attributes: Vec<(usize, EvalFn)>,
    /// View recomputation, applied by perception.
    views: Vec<(usize, EvalFn)>,
    /// Continuous dynamics; all right-hand sides read the pre-update store.
    time_updates: Vec<(usize, EvalFn)>,
    behaviour: AgentBehaviour,
}

impl AgentPrototype {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: AgentName,
        parameters: Vec<ValueType>,
        param_slots: Vec<usize>,
        store_width: usize,
        attributes: Vec<(usize, EvalFn)>,
        views: Vec<(usize, EvalFn)>,
        time_updates: Vec<(usize, EvalFn)>,
        behaviour: AgentBehaviour,
    ) -> Self {
        Self {
            name,
            parameters,
            param_slots,
            store_width,
            attributes,
            views,
            time_updates,
            behaviour,
        }
    }

    pub fn name(&self) -> &AgentName {
        &self.name
    }

    pub fn behaviour(&self) -> &AgentBehaviour {
        &self.behaviour
    }

    /// Builds the initial memory from the argument values: parameters are
    /// bound to their slots, then attribute initializers run in order.
    fn build_store(&self, values: &[Value]) -> Result<AgentStore, DefinitionError> {
        if values.len() != self.parameters.len() {
            return Err(DefinitionError::ArgumentCountMismatch {
                species: self.name.label().to_string(),
                expected: self.parameters.len(),
                actual: values.len(),
            });
        }
        let mut store = AgentStore::new(self.store_width);
        for (index, (&slot, (&value, &declared))) in self
            .param_slots
            .iter()
            .zip(values.iter().zip(&self.parameters))
            .enumerate()
        {
            let bound = if value.value_type() == declared {
                value
            } else {
                value.cast(declared)
            };
            if bound.is_error() {
                return Err(DefinitionError::IncompatibleArgument {
                    species: self.name.label().to_string(),
                    index,
                });
            }
            store = store.set_slot(slot, bound);
        }
        for (slot, init) in &self.attributes {
            let mut ctx = EvalCtx::for_agent(None, &store);
            let value = init(&mut ctx);
            store = store.set_slot(*slot, value);
        }
        Ok(store)
    }

    /// Creates an agent starting at the declared initial state.
    pub fn instantiate(
        self: &Arc<Self>,
        id: AgentId,
        values: &[Value],
    ) -> Result<LiveAgent, DefinitionError> {
        let store = self.build_store(values)?;
        Ok(LiveAgent::enter(
            self.clone(),
            id,
            self.behaviour.initial_state().index(),
            store,
        ))
    }

    /// Creates an agent starting at a named state, for configurations that
    /// do not start agents at the declared initial state.
    pub fn instantiate_at(
        self: &Arc<Self>,
        id: AgentId,
        values: &[Value],
        state: &str,
    ) -> Result<LiveAgent, DefinitionError> {
        let starting = self.behaviour.state_by_name(state).ok_or_else(|| {
            DefinitionError::UnknownStartingState {
                species: self.name.label().to_string(),
                state: state.to_string(),
            }
        })?;
        let store = self.build_store(values)?;
        Ok(LiveAgent::enter(self.clone(), id, starting.index(), store))
    }

    /// Binds an argument vector into a factory. The store is validated and
    /// built once; each produced agent clones it.
    pub fn factory(self: &Arc<Self>, values: &[Value]) -> Result<AgentFactory, DefinitionError> {
        let template = self.build_store(values)?;
        let prototype = self.clone();
        let state = self.behaviour.initial_state().index();
        Ok(Box::new(move |id| {
            LiveAgent::enter(prototype.clone(), id, state, template.clone())
        }))
    }

    /// Like [`AgentPrototype::factory`], starting at a named state.
    pub fn factory_at(
        self: &Arc<Self>,
        state: &str,
        values: &[Value],
    ) -> Result<AgentFactory, DefinitionError> {
        let starting = self.behaviour.state_by_name(state).ok_or_else(|| {
            DefinitionError::UnknownStartingState {
                species: self.name.label().to_string(),
                state: state.to_string(),
            }
        })?;
        let template = self.build_store(values)?;
        let prototype = self.clone();
        let index = starting.index();
        Ok(Box::new(move |id| {
            LiveAgent::enter(prototype.clone(), id, index, template.clone())
        }))
    }

    /// Recomputes the view attributes from the population snapshot. The
    /// single point where global information enters agent memory.
    pub fn perceive(
        &self,
        rng: &mut dyn RngCore,
        store: &AgentStore,
        population: &dyn PopulationView,
    ) -> AgentStore {
        let mut store = store.clone();
        for (slot, view) in &self.views {
            let value = {
                let mut ctx = EvalCtx::for_view(Some(rng), &store, population);
                view(&mut ctx)
            };
            store = store.set_slot(*slot, value);
        }
        store
    }

    /// Applies the continuous time-update for an elapsed interval. All
    /// right-hand sides read the pre-update memory; the assignments land
    /// as one batch.
    pub fn update_time(&self, rng: &mut dyn RngCore, dt: f64, store: &AgentStore) -> AgentStore {
        if self.time_updates.is_empty() {
            return store.clone();
        }
        let updates: Vec<(usize, Value)> = self
            .time_updates
            .iter()
            .map(|(slot, update)| {
                let mut ctx = EvalCtx::for_time_update(Some(rng), store, dt);
                (*slot, update(&mut ctx))
            })
            .collect();
        let mut next = store.clone();
        for (slot, value) in updates {
            next = next.set_slot(slot, value);
        }
        next
    }
}
