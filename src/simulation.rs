use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};
use uuid::Uuid;

use crate::agent::message::{DeliveredMessage, OutgoingMessage};
use crate::agent::prototype::AgentFactory;
use crate::agent::runtime::{LiveAgent, RuntimeError};
use crate::agent::AgentId;
use crate::config::SimulationConfig;
use crate::population::{AgentFilter, AgentScalar, PopulationSnapshot, PopulationView};

/// One fired step or handler: the determinism witness of a trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryEvent {
    pub agent: AgentId,
    pub time: f64,
    pub state: Arc<str>,
}

pub type Trajectory = Vec<TrajectoryEvent>;

enum ActivityKind {
    /// A routed message reaching its target's inbox.
    Deliver {
        target: AgentId,
        message: DeliveredMessage,
    },
    /// An agent's scheduled step; stale when the epoch lags the agent's.
    Step { agent: AgentId, epoch: u64 },
}

/// An agenda entry. The total order of the scheduler: time first,
/// deliveries before steps, then agent id, then insertion sequence.
/// Fully deterministic under a fixed seed.
struct Activity {
    time: f64,
    seq: u64,
    kind: ActivityKind,
}

impl Activity {
    fn class(&self) -> u8 {
        match self.kind {
            ActivityKind::Deliver { .. } => 0,
            ActivityKind::Step { .. } => 1,
        }
    }

    fn agent(&self) -> AgentId {
        match self.kind {
            ActivityKind::Deliver { target, .. } => target,
            ActivityKind::Step { agent, .. } => agent,
        }
    }
}

impl Ord for Activity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then_with(|| self.class().cmp(&other.class()))
            .then_with(|| self.agent().cmp(&other.agent()))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Activity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Activity {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Activity {}

/// シミュレーション状態
///
/// The reference implementation of the population-scheduler boundary: one
/// trajectory's live agents, the agenda of scheduled activities and the
/// global clock. Agents execute one at a time in agenda order; every
/// transition swaps a fresh instance in. Superseded agenda entries are
/// invalidated by epoch and skipped lazily on pop.
#[derive(Default)]
pub struct SimulationState {
    now: f64,
    agents: BTreeMap<AgentId, LiveAgent>,
    agenda: BinaryHeap<Reverse<Activity>>,
    epochs: HashMap<AgentId, u64>,
    seq: u64,
    next_id: AgentId,
    trajectory: Trajectory,
}

impl SimulationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn agent(&self, id: AgentId) -> Option<&LiveAgent> {
        self.agents.get(&id)
    }

    pub fn agents(&self) -> impl Iterator<Item = &LiveAgent> {
        self.agents.values()
    }

    pub fn trajectory(&self) -> &[TrajectoryEvent] {
        &self.trajectory
    }

    pub fn into_trajectory(self) -> Trajectory {
        self.trajectory
    }

    /// Instantiates one agent from the factory, samples its initial
    /// sojourn time and puts it on the agenda.
    pub fn add_agent(&mut self, rng: &mut dyn RngCore, factory: &AgentFactory) -> AgentId {
        let id = self.next_id;
        self.next_id += 1;
        let agent = factory(id).with_sampled_step(rng);
        self.replace(agent);
        id
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn bump_epoch(&mut self, id: AgentId) -> u64 {
        let epoch = self.epochs.entry(id).or_insert(0);
        *epoch += 1;
        *epoch
    }

    /// Swaps an agent in, invalidating any pending step of its
    /// predecessor, and schedules its next step if one is due.
    fn replace(&mut self, agent: LiveAgent) {
        let id = agent.id();
        let epoch = self.bump_epoch(id);
        if let Some(time) = agent.time_of_next_step() {
            let seq = self.next_seq();
            self.agenda.push(Reverse(Activity {
                time,
                seq,
                kind: ActivityKind::Step { agent: id, epoch },
            }));
        }
        self.agents.insert(id, agent);
    }

    fn snapshot(&self) -> PopulationSnapshot {
        PopulationSnapshot::new(self.agents.values().cloned().collect())
    }

    /// Moves the global clock forward: every agent's local time advances
    /// (running its continuous dynamics), then every agent perceives the
    /// fresh population snapshot.
    fn advance_to(&mut self, rng: &mut dyn RngCore, time: f64) -> Result<(), RuntimeError> {
        if time <= self.now {
            return Ok(());
        }
        let ids: Vec<AgentId> = self.agents.keys().copied().collect();
        for id in &ids {
            let agent = self.agents[id].progress_time(rng, time)?;
            self.agents.insert(*id, agent);
        }
        let snapshot = self.snapshot();
        for id in &ids {
            let agent = self.agents[id].perceive(rng, &snapshot);
            self.agents.insert(*id, agent);
        }
        self.now = time;
        Ok(())
    }

    fn perceive_one(&mut self, rng: &mut dyn RngCore, id: AgentId) {
        let snapshot = self.snapshot();
        if let Some(agent) = self.agents.get(&id) {
            let agent = agent.perceive(rng, &snapshot);
            self.agents.insert(id, agent);
        }
    }

    /// Routes outgoing messages against the live population. The sender
    /// never receives its own message; matching uses the sender's store
    /// snapshot as the ambient context of the target pattern.
    fn route(&mut self, sender: AgentId, messages: Vec<OutgoingMessage>) {
        let sender_species = self.agents[&sender].species().clone();
        for outgoing in messages {
            let targets: Vec<AgentId> = self
                .agents
                .iter()
                .filter(|(id, agent)| {
                    **id != sender
                        && outgoing.target.matches(
                            Some(&outgoing.sender_store),
                            agent.species(),
                            agent.store(),
                        )
                })
                .map(|(id, _)| *id)
                .collect();
            for target in targets {
                let seq = self.next_seq();
                self.agenda.push(Reverse(Activity {
                    time: outgoing.delivery_time,
                    seq,
                    kind: ActivityKind::Deliver {
                        target,
                        message: DeliveredMessage {
                            sender_id: sender,
                            sender_species: sender_species.clone(),
                            sender_store: outgoing.sender_store.clone(),
                            message: outgoing.message.clone(),
                            time: outgoing.delivery_time,
                        },
                    },
                }));
            }
        }
    }

    fn record(&mut self, agent: &LiveAgent, time: f64) {
        self.trajectory.push(TrajectoryEvent {
            agent: agent.id(),
            time,
            state: agent.state().name().clone(),
        });
    }

    /// Advances the trajectory until the agenda drains or the next
    /// activity lies past the deadline, then moves every agent's clock to
    /// the deadline.
    pub fn run_until(&mut self, rng: &mut dyn RngCore, deadline: f64) -> Result<(), RuntimeError> {
        while let Some(Reverse(peeked)) = self.agenda.peek() {
            if peeked.time > deadline {
                break;
            }
            let Some(Reverse(activity)) = self.agenda.pop() else {
                break;
            };
            match activity.kind {
                ActivityKind::Step { agent: id, epoch } => {
                    if self.epochs.get(&id).copied().unwrap_or(0) != epoch {
                        // superseded by a message-induced transition
                        continue;
                    }
                    self.advance_to(rng, activity.time)?;
                    self.perceive_one(rng, id);
                    let agent = self.agents[&id].clone();
                    match agent.execute(rng) {
                        Some((messages, next)) => {
                            self.record(&next, activity.time);
                            self.replace(next);
                            self.route(id, messages);
                        }
                        None => {
                            debug!(agent = id, time = activity.time, "step without effect");
                            self.replace(agent.latent());
                        }
                    }
                }
                ActivityKind::Deliver { target, message } => {
                    self.advance_to(rng, activity.time)?;
                    self.perceive_one(rng, target);
                    let agent = self.agents[&target].clone();
                    if let Some((messages, next)) = agent.receive(rng, &message) {
                        self.record(&next, activity.time);
                        self.replace(next);
                        self.route(target, messages);
                    }
                }
            }
        }
        self.advance_to(rng, deadline)
    }
}

impl PopulationView for SimulationState {
    fn count(&self, filter: &AgentFilter) -> usize {
        self.agents.values().filter(|agent| filter(agent)).count()
    }

    fn sum_of(&self, expr: &AgentScalar, filter: &AgentFilter) -> f64 {
        self.agents
            .values()
            .filter(|agent| filter(agent))
            .map(|agent| agent.eval(expr))
            .sum()
    }

    fn min_of(&self, expr: &AgentScalar, filter: &AgentFilter) -> Option<f64> {
        self.agents
            .values()
            .filter(|agent| filter(agent))
            .map(|agent| agent.eval(expr))
            .reduce(f64::min)
    }

    fn max_of(&self, expr: &AgentScalar, filter: &AgentFilter) -> Option<f64> {
        self.agents
            .values()
            .filter(|agent| filter(agent))
            .map(|agent| agent.eval(expr))
            .reduce(f64::max)
    }

    fn mean_of(&self, expr: &AgentScalar, filter: &AgentFilter) -> Option<f64> {
        let selected: Vec<f64> = self
            .agents
            .values()
            .filter(|agent| filter(agent))
            .map(|agent| agent.eval(expr))
            .collect();
        (!selected.is_empty()).then(|| selected.iter().sum::<f64>() / selected.len() as f64)
    }

    fn exists(&self, filter: &AgentFilter) -> bool {
        self.agents.values().any(|agent| filter(agent))
    }

    fn for_all(&self, filter: &AgentFilter) -> bool {
        self.agents.values().all(|agent| filter(agent))
    }
}

/// Runs independent replications of one scenario, one seeded random
/// stream per trajectory. Replications fan out on the rayon pool; nothing
/// mutable is shared between them.
pub fn run_replications<F>(
    config: &SimulationConfig,
    setup: F,
) -> Result<Vec<Trajectory>, RuntimeError>
where
    F: Fn(&mut SimulationState, &mut StdRng) -> Result<(), RuntimeError> + Sync,
{
    let run_id = Uuid::new_v4();
    info!(
        %run_id,
        replications = config.replications,
        deadline = config.deadline,
        "starting simulation run"
    );
    (0..config.replications)
        .into_par_iter()
        .map(|replication| {
            let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(replication));
            let mut state = SimulationState::new();
            setup(&mut state, &mut rng)?;
            state.run_until(&mut rng, config.deadline)?;
            Ok(state.into_trajectory())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(time: f64, seq: u64, kind: ActivityKind) -> Activity {
        Activity { time, seq, kind }
    }

    #[test]
    fn test_agenda_orders_by_time_then_class_then_id() {
        let step = |agent, time, seq| {
            activity(time, seq, ActivityKind::Step { agent, epoch: 1 })
        };
        let mut heap = BinaryHeap::new();
        heap.push(Reverse(step(2, 1.0, 1)));
        heap.push(Reverse(step(1, 1.0, 2)));
        heap.push(Reverse(step(0, 0.5, 3)));
        let order: Vec<AgentId> = std::iter::from_fn(|| heap.pop())
            .map(|Reverse(a)| a.agent())
            .collect();
        // 時刻 0.5 が先、同時刻は agent id 順
        assert_eq!(order, vec![0, 1, 2]);
    }
}
