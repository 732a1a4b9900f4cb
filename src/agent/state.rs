use std::sync::Arc;

use rand::Rng;
use rand::RngCore;
use tracing::debug;

use crate::agent::message::{DeliveredMessage, MessageTag, OutgoingMessage};
use crate::agent::store::AgentStore;
use crate::compiler::command::AgentCommand;
use crate::compiler::expression::{EvalCtx, EvalFn};
use crate::compiler::pattern::AgentPattern;

/// The effect of a fired step or handler: the state entered, the memory
/// after the command ran, and the messages it emitted.
#[derive(Debug)]
pub struct StepEffect {
    pub next_state: usize,
    pub store: AgentStore,
    pub messages: Vec<OutgoingMessage>,
}

/// A command block paired with its pre-resolved target state.
#[derive(Debug, Clone)]
pub struct Transition {
    pub command: AgentCommand,
    pub next_state: usize,
}

impl Transition {
    pub fn apply(&self, rng: &mut dyn RngCore, store: AgentStore) -> StepEffect {
        let (messages, store) = self.command.execute(rng, store);
        StepEffect {
            next_state: self.next_state,
            store,
            messages,
        }
    }
}

/// One guarded, weighted alternative of a probabilistic step.
#[derive(Clone)]
pub struct StepCase {
    pub guard: Option<EvalFn>,
    pub weight: EvalFn,
    pub transition: Transition,
}

impl StepCase {
    fn is_enabled(&self, store: &AgentStore) -> bool {
        match &self.guard {
            Some(guard) => {
                let mut ctx = EvalCtx::for_agent(None, store);
                guard(&mut ctx).boolean_of()
            }
            None => true,
        }
    }

    fn weight(&self, rng: &mut dyn RngCore, store: &AgentStore) -> f64 {
        let mut ctx = EvalCtx::for_agent(Some(rng), store);
        (self.weight)(&mut ctx).double_of()
    }
}

/// What a state does when its sojourn time elapses.
#[derive(Clone, Default)]
pub enum AgentStep {
    /// The state has no timed step; the agent waits for messages.
    #[default]
    None,
    Deterministic(Transition),
    /// Alternatives in declaration order; the order is the observable
    /// tie-break of the selection.
    Probabilistic(Vec<StepCase>),
}

impl AgentStep {
    /// Fires the step. `None` when no alternative is enabled: the agent
    /// stays latent until the next stimulus.
    fn apply(&self, rng: &mut dyn RngCore, store: AgentStore) -> Option<StepEffect> {
        match self {
            AgentStep::None => None,
            AgentStep::Deterministic(transition) => Some(transition.apply(rng, store)),
            AgentStep::Probabilistic(cases) => {
                let enabled: Vec<(f64, &Transition)> = cases
                    .iter()
                    .filter(|case| case.is_enabled(&store))
                    .map(|case| (case.weight(rng, &store), &case.transition))
                    .filter(|(weight, _)| weight.is_finite() && *weight > 0.0)
                    .collect();
                let total: f64 = enabled.iter().map(|(weight, _)| weight).sum();
                if total <= 0.0 {
                    debug!("no enabled alternative, agent stays latent");
                    return None;
                }
                let mut selected = rng.gen::<f64>() * total;
                for (weight, transition) in &enabled {
                    if selected < *weight {
                        return Some(transition.apply(rng, store));
                    }
                    selected -= weight;
                }
                // Numeric edge: fall through to the last enabled case.
                let (_, transition) = enabled.last()?;
                Some(transition.apply(rng, store))
            }
        }
    }
}

/// メッセージハンドラ
///
/// Keyed by tag, optional sender pattern and optional guard. The guard and
/// body see the message content bound to the capture slots; the bindings
/// do not outlive the handler.
#[derive(Clone)]
pub struct MessageHandler {
    pub tag: Arc<MessageTag>,
    /// Capture slots, positional against the message content.
    pub captures: Vec<usize>,
    pub sender: Option<AgentPattern>,
    pub guard: Option<EvalFn>,
    pub transition: Transition,
}

impl MessageHandler {
    /// Fires the handler if tag, sender pattern and guard all accept the
    /// message; `None` otherwise.
    fn try_fire(
        &self,
        rng: &mut dyn RngCore,
        store: &AgentStore,
        message: &DeliveredMessage,
    ) -> Option<StepEffect> {
        if message.message.tag != self.tag {
            return None;
        }
        if let Some(sender) = &self.sender {
            if !sender.matches(Some(store), &message.sender_species, &message.sender_store) {
                return None;
            }
        }
        // Bind message content before the guard sees it.
        let mut bound = store.clone();
        for (slot, value) in self.captures.iter().zip(&message.message.content) {
            bound = bound.set_slot(*slot, *value);
        }
        if let Some(guard) = &self.guard {
            let mut ctx = EvalCtx::for_agent(None, &bound);
            if !guard(&mut ctx).boolean_of() {
                return None;
            }
        }
        let mut effect = self.transition.apply(rng, bound);
        for slot in &self.captures {
            effect.store = effect.store.unset_slot(*slot);
        }
        Some(effect)
    }
}

/// 行動状態
///
/// A node of the behavioural state machine: sojourn-time expression, step,
/// message handlers, initial flag. Looked up by pre-resolved index.
#[derive(Default)]
pub struct AgentState {
    pub(crate) index: usize,
    pub(crate) name: Arc<str>,
    pub(crate) sojourn: Option<EvalFn>,
    pub(crate) step: AgentStep,
    pub(crate) handlers: Vec<MessageHandler>,
    /// State-specific continuous dynamics, applied after the species time
    /// update over the same interval.
    pub(crate) dynamics: Vec<(usize, EvalFn)>,
    pub(crate) is_initial: bool,
}

impl AgentState {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn is_initial(&self) -> bool {
        self.is_initial
    }

    /// Samples the sojourn time for a fresh entry into this state; `None`
    /// for states without a timed step.
    pub fn sample_sojourn(&self, rng: &mut dyn RngCore, store: &AgentStore) -> Option<f64> {
        let sojourn = self.sojourn.as_ref()?;
        let mut ctx = EvalCtx::for_agent(Some(rng), store);
        let sampled = sojourn(&mut ctx).double_of();
        sampled.is_finite().then(|| sampled.max(0.0))
    }

    /// Executes the state's step when its scheduled time arrives.
    pub fn step(&self, rng: &mut dyn RngCore, store: AgentStore) -> Option<StepEffect> {
        self.step.apply(rng, store)
    }

    /// Applies this state's continuous dynamics for an elapsed interval.
    /// Like the species time update, all right-hand sides read the
    /// pre-update memory.
    pub fn apply_dynamics(
        &self,
        rng: &mut dyn RngCore,
        dt: f64,
        store: &AgentStore,
    ) -> AgentStore {
        if self.dynamics.is_empty() {
            return store.clone();
        }
        let updates: Vec<(usize, crate::values::Value)> = self
            .dynamics
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

    /// Scans handlers in declaration order; the first accepting handler
    /// fires. An unhandled message has no effect.
    pub fn on_receive(
        &self,
        rng: &mut dyn RngCore,
        store: &AgentStore,
        message: &DeliveredMessage,
    ) -> Option<StepEffect> {
        self.handlers
            .iter()
            .find_map(|handler| handler.try_fire(rng, store, message))
    }
}
