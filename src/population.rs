use crate::agent::runtime::LiveAgent;
use crate::agent::store::AgentStore;

/// A scalar evaluated against one agent's memory during a population scan.
pub type AgentScalar<'a> = dyn Fn(&AgentStore) -> f64 + 'a;

/// A filter selecting agents during a population scan.
pub type AgentFilter<'a> = dyn Fn(&LiveAgent) -> bool + 'a;

/// 母集団ビュー
///
/// The aggregate-evaluation boundary: the compiled quantifiers are pure
/// pass-through callers of this interface and never iterate the population
/// themselves. The reference implementation lives in the simulation
/// scheduler; embedding systems may provide their own.
pub trait PopulationView {
    /// Number of agents accepted by the filter.
    fn count(&self, filter: &AgentFilter) -> usize;

    /// Sum of the scalar over the accepted agents; 0 for an empty selection.
    fn sum_of(&self, expr: &AgentScalar, filter: &AgentFilter) -> f64;

    /// Minimum of the scalar over the accepted agents; `None` when the
    /// selection is empty.
    fn min_of(&self, expr: &AgentScalar, filter: &AgentFilter) -> Option<f64>;

    /// Maximum of the scalar over the accepted agents; `None` when the
    /// selection is empty.
    fn max_of(&self, expr: &AgentScalar, filter: &AgentFilter) -> Option<f64>;

    /// Mean of the scalar over the accepted agents; `None` when the
    /// selection is empty.
    fn mean_of(&self, expr: &AgentScalar, filter: &AgentFilter) -> Option<f64>;

    fn exists(&self, filter: &AgentFilter) -> bool;

    fn for_all(&self, filter: &AgentFilter) -> bool;
}

/// An immutable copy of the live population, used while agents perceive
/// (the scheduler is mid-replacement, so the live map cannot be borrowed).
pub struct PopulationSnapshot {
    agents: Vec<LiveAgent>,
}

impl PopulationSnapshot {
    pub fn new(agents: Vec<LiveAgent>) -> Self {
        Self { agents }
    }
}

impl PopulationView for PopulationSnapshot {
    fn count(&self, filter: &AgentFilter) -> usize {
        self.agents.iter().filter(|agent| filter(agent)).count()
    }

    fn sum_of(&self, expr: &AgentScalar, filter: &AgentFilter) -> f64 {
        self.agents
            .iter()
            .filter(|agent| filter(agent))
            .map(|agent| agent.eval(expr))
            .sum()
    }

    fn min_of(&self, expr: &AgentScalar, filter: &AgentFilter) -> Option<f64> {
        self.agents
            .iter()
            .filter(|agent| filter(agent))
            .map(|agent| agent.eval(expr))
            .reduce(f64::min)
    }

    fn max_of(&self, expr: &AgentScalar, filter: &AgentFilter) -> Option<f64> {
        self.agents
            .iter()
            .filter(|agent| filter(agent))
            .map(|agent| agent.eval(expr))
            .reduce(f64::max)
    }

    fn mean_of(&self, expr: &AgentScalar, filter: &AgentFilter) -> Option<f64> {
        let selected: Vec<f64> = self
            .agents
            .iter()
            .filter(|agent| filter(agent))
            .map(|agent| agent.eval(expr))
            .collect();
        (!selected.is_empty()).then(|| selected.iter().sum::<f64>() / selected.len() as f64)
    }

    fn exists(&self, filter: &AgentFilter) -> bool {
        self.agents.iter().any(|agent| filter(agent))
    }

    fn for_all(&self, filter: &AgentFilter) -> bool {
        self.agents.iter().all(|agent| filter(agent))
    }
}
