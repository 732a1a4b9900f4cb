use std::sync::Arc;

use rand::RngCore;
use thiserror::Error;

use crate::agent::definitions::{AgentName, DefinitionError};
use crate::agent::message::{DeliveredMessage, OutgoingMessage};
use crate::agent::prototype::AgentPrototype;
use crate::agent::state::{AgentState, StepEffect};
use crate::agent::store::AgentStore;
use crate::agent::AgentId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// A scheduler defect: an agent was asked to advance past the moment
    /// its next step was already scheduled for. Never ignored.
    #[error("time step missed: agent {agent} advanced to {time} past its step scheduled at {scheduled}")]
    TimeStepMissed {
        agent: AgentId,
        time: f64,
        scheduled: f64,
    },
    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

/// 実行中エージェント
///
/// Identity, memory, behavioural state and the absolute time of the next
/// scheduled step. An instance is replaced, not mutated, on every
/// transition: `execute`/`receive` return a fresh instance plus the
/// emitted messages, and the scheduler swaps the old one out.
#[derive(Clone)]
pub struct LiveAgent {
    id: AgentId,
    prototype: Arc<AgentPrototype>,
    store: AgentStore,
    state: usize,
    next_step_time: Option<f64>,
}

impl LiveAgent {
    /// Enters a state without a sampled sojourn yet; the scheduler calls
    /// [`LiveAgent::with_sampled_step`] before the agent joins the agenda.
    pub(crate) fn enter(
        prototype: Arc<AgentPrototype>,
        id: AgentId,
        state: usize,
        store: AgentStore,
    ) -> Self {
        Self {
            id,
            prototype,
            store,
            state,
            next_step_time: None,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn species(&self) -> &AgentName {
        self.prototype.name()
    }

    pub fn store(&self) -> &AgentStore {
        &self.store
    }

    pub fn state(&self) -> &Arc<AgentState> {
        self.prototype.behaviour().state(self.state)
    }

    pub fn state_name(&self) -> &str {
        self.state().name()
    }

    /// The absolute time of the next scheduled step; `None` while latent.
    pub fn time_of_next_step(&self) -> Option<f64> {
        self.next_step_time
    }

    /// Samples the sojourn time of the current state, scheduling the step
    /// relative to the agent's clock. Sampled on every state entry,
    /// including the initial one.
    pub fn with_sampled_step(&self, rng: &mut dyn RngCore) -> LiveAgent {
        let next_step_time = self
            .state()
            .sample_sojourn(rng, &self.store)
            .map(|sojourn| self.store.now() + sojourn);
        LiveAgent {
            next_step_time,
            ..self.clone()
        }
    }

    /// Clears the schedule; used when a probabilistic step had no enabled
    /// alternative and the agent idles until the next stimulus.
    pub fn latent(&self) -> LiveAgent {
        LiveAgent {
            next_step_time: None,
            ..self.clone()
        }
    }

    fn apply(&self, rng: &mut dyn RngCore, effect: StepEffect) -> (Vec<OutgoingMessage>, LiveAgent) {
        let entered = LiveAgent {
            id: self.id,
            prototype: self.prototype.clone(),
            store: effect.store,
            state: effect.next_state,
            next_step_time: None,
        };
        (effect.messages, entered.with_sampled_step(rng))
    }

    /// Fires the scheduled step of the current state. `None` when nothing
    /// is enabled; the caller keeps the (now latent) agent.
    pub fn execute(&self, rng: &mut dyn RngCore) -> Option<(Vec<OutgoingMessage>, LiveAgent)> {
        self.state()
            .step(rng, self.store.clone())
            .map(|effect| self.apply(rng, effect))
    }

    /// Handles a delivered message with the current state's handlers. An
    /// unmatched message has no effect and `None` is returned.
    pub fn receive(
        &self,
        rng: &mut dyn RngCore,
        message: &DeliveredMessage,
    ) -> Option<(Vec<OutgoingMessage>, LiveAgent)> {
        self.state()
            .on_receive(rng, &self.store, message)
            .map(|effect| self.apply(rng, effect))
    }

    /// Advances the agent's local clock to `time`, applying the species
    /// time-update function for the elapsed interval first. Progressing
    /// past the scheduled step is an internal-consistency fault.
    pub fn progress_time(&self, rng: &mut dyn RngCore, time: f64) -> Result<LiveAgent, RuntimeError> {
        if let Some(scheduled) = self.next_step_time {
            if time > scheduled {
                return Err(RuntimeError::TimeStepMissed {
                    agent: self.id,
                    time,
                    scheduled,
                });
            }
        }
        let dt = time - self.store.now();
        if dt <= 0.0 {
            return Ok(self.clone());
        }
        // Species time update first, then the current state's dynamics.
        let updated = self.prototype.update_time(rng, dt, &self.store);
        let updated = self.state().apply_dynamics(rng, dt, &updated);
        Ok(LiveAgent {
            store: updated.at_time(time),
            ..self.clone()
        })
    }

    /// Recomputes view attributes from the population snapshot.
    pub fn perceive(
        &self,
        rng: &mut dyn RngCore,
        population: &dyn crate::population::PopulationView,
    ) -> LiveAgent {
        LiveAgent {
            store: self.prototype.perceive(rng, &self.store, population),
            ..self.clone()
        }
    }

    /// Evaluates a scalar against this agent's memory (population-view
    /// support).
    pub fn eval(&self, expr: &dyn Fn(&AgentStore) -> f64) -> f64 {
        expr(&self.store)
    }
}

impl PartialEq for LiveAgent {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for LiveAgent {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::behaviour::AgentBehaviourBuilder;
    use crate::agent::definitions::AgentDefinitions;
    use crate::agent::state::{AgentStep, Transition};
    use crate::ast::Span;
    use crate::compiler::command::AgentCommand;
    use crate::values::Value;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc as StdArc;

    fn two_state_prototype() -> StdArc<AgentPrototype> {
        let definitions = AgentDefinitions::new();
        let name = definitions.declare("walker").unwrap();
        let mut builder = AgentBehaviourBuilder::new("walker");
        let idle = builder.declare_state("idle", true, Span::default()).unwrap();
        let busy = builder.declare_state("busy", false, Span::default()).unwrap();
        builder.set_sojourn(idle, StdArc::new(|_| Value::Real(1.0)));
        builder.set_step(
            idle,
            AgentStep::Deterministic(Transition {
                command: AgentCommand::skip(),
                next_state: busy,
            }),
        );
        let behaviour = builder.build(Span::default()).unwrap();
        StdArc::new(AgentPrototype::new(
            name,
            vec![],
            vec![],
            1,
            vec![],
            vec![],
            vec![],
            behaviour,
        ))
    }

    #[test]
    fn test_step_replaces_instance_and_resamples() {
        let prototype = two_state_prototype();
        let mut rng = StdRng::seed_from_u64(3);
        let agent = prototype.instantiate(0, &[]).unwrap().with_sampled_step(&mut rng);
        assert_eq!(agent.time_of_next_step(), Some(1.0));

        let before_store = agent.store().clone();
        let (messages, next) = agent.execute(&mut rng).unwrap();
        assert!(messages.is_empty());
        assert_eq!(next.state_name(), "busy");
        // busy has no timed step -> latent
        assert_eq!(next.time_of_next_step(), None);
        // 旧インスタンスは不変
        assert_eq!(agent.state_name(), "idle");
        assert_eq!(agent.store(), &before_store);
    }

    #[test]
    fn test_progress_past_schedule_is_a_fault() {
        let prototype = two_state_prototype();
        let mut rng = StdRng::seed_from_u64(3);
        let agent = prototype.instantiate(0, &[]).unwrap().with_sampled_step(&mut rng);
        let err = agent.progress_time(&mut rng, 2.0).unwrap_err();
        assert!(matches!(err, RuntimeError::TimeStepMissed { .. }));
        assert!(agent.progress_time(&mut rng, 1.0).is_ok());
    }

    #[test]
    fn test_progress_advances_clock() {
        let prototype = two_state_prototype();
        let mut rng = StdRng::seed_from_u64(3);
        let agent = prototype.instantiate(0, &[]).unwrap().with_sampled_step(&mut rng);
        let later = agent.progress_time(&mut rng, 0.5).unwrap();
        assert_eq!(later.store().now(), 0.5);
        assert_eq!(agent.store().now(), 0.0);
    }
}
