use std::sync::Arc;

use crate::values::Value;
use crate::variables::AgentVariable;

/// エージェントメモリ
///
/// A vector of values indexed by variable slot plus the agent's local
/// clock. Every mutation returns a new store; the previous value is never
/// aliased or written through. This replacement discipline is what makes
/// sharing stores across trajectory snapshots safe.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentStore {
    now: f64,
    slots: Arc<[Value]>,
}

impl Default for AgentStore {
    fn default() -> Self {
        Self::new(0)
    }
}

impl AgentStore {
    /// Creates a store of `width` slots, all unset, at time 0. Unset slots
    /// read as [`Value::Error`].
    pub fn new(width: usize) -> Self {
        Self {
            now: 0.0,
            slots: vec![Value::Error; width].into(),
        }
    }

    /// Builds a store from variable/value pairs; the width is the model's
    /// registry width so later local bindings have their slot available.
    pub fn of(width: usize, assignments: &[(AgentVariable, Value)]) -> Self {
        let mut slots = vec![Value::Error; width];
        for (variable, value) in assignments {
            slots[variable.slot()] = *value;
        }
        Self {
            now: 0.0,
            slots: slots.into(),
        }
    }

    /// Value of the given variable; [`Value::Error`] when the slot was
    /// never assigned.
    pub fn get(&self, variable: &AgentVariable) -> Value {
        self.get_slot(variable.slot())
    }

    pub fn get_slot(&self, slot: usize) -> Value {
        self.slots.get(slot).copied().unwrap_or(Value::Error)
    }

    /// Returns a new store with the slot assigned; `self` is untouched.
    pub fn set(&self, variable: &AgentVariable, value: Value) -> AgentStore {
        self.set_slot(variable.slot(), value)
    }

    pub fn set_slot(&self, slot: usize, value: Value) -> AgentStore {
        let mut slots: Vec<Value> = self.slots.to_vec();
        if slot >= slots.len() {
            slots.resize(slot + 1, Value::Error);
        }
        slots[slot] = value;
        AgentStore {
            now: self.now,
            slots: slots.into(),
        }
    }

    /// Clears a slot back to the unset state; used when a `let` scope ends.
    pub fn unset_slot(&self, slot: usize) -> AgentStore {
        self.set_slot(slot, Value::Error)
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    /// Returns a new store with the clock moved to `now`. The clock is
    /// monotone; callers guarantee `now >= self.now()`.
    pub fn at_time(&self, now: f64) -> AgentStore {
        AgentStore {
            now,
            slots: self.slots.clone(),
        }
    }

    pub fn width(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::ValueType;
    use crate::variables::VariableRegistry;

    fn variable(name: &str) -> (VariableRegistry, AgentVariable) {
        let mut registry = VariableRegistry::new();
        let v = registry.register(name, ValueType::Integer).unwrap();
        (registry, v)
    }

    #[test]
    fn test_set_returns_new_store() {
        let (_, x) = variable("x");
        let before = AgentStore::new(1);
        let after = before.set(&x, Value::Integer(42));
        // 旧ストアは不変
        assert_eq!(before.get(&x), Value::Error);
        assert_eq!(after.get(&x), Value::Integer(42));
    }

    #[test]
    fn test_unset_slot_reads_error() {
        let store = AgentStore::new(2);
        assert_eq!(store.get_slot(0), Value::Error);
        assert_eq!(store.get_slot(7), Value::Error);
    }

    #[test]
    fn test_clock_is_carried_by_replacement() {
        let store = AgentStore::new(0);
        let later = store.at_time(2.5);
        assert_eq!(store.now(), 0.0);
        assert_eq!(later.now(), 2.5);
    }

    #[test]
    fn test_of_builds_from_assignments() {
        let (mut registry, x) = variable("x");
        let y = registry.register("y", ValueType::Real).unwrap();
        let store = AgentStore::of(
            registry.len(),
            &[(x.clone(), Value::Integer(1)), (y.clone(), Value::Real(0.5))],
        );
        assert_eq!(store.get(&x), Value::Integer(1));
        assert_eq!(store.get(&y), Value::Real(0.5));
    }
}
