use std::collections::HashMap;
use std::sync::Arc;

use crate::values::ValueType;

/// An interned agent-local variable: a name bound once to a memory slot.
///
/// Slots address positions in an agent store. A slot, once assigned, is
/// never reused within a model; parameters, attributes, views, local
/// bindings and message-pattern captures all draw from the same registry.
#[derive(Clone, Debug)]
pub struct AgentVariable {
    name: Arc<str>,
    slot: usize,
    value_type: ValueType,
}

impl AgentVariable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }
}

impl PartialEq for AgentVariable {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot
    }
}

impl Eq for AgentVariable {}

/// 変数レジストリ
///
/// Assigns every agent-local name a stable slot index shared by the
/// compiler and the runtime memory layout. Lookups after registration are
/// by pre-resolved slot, never by string.
#[derive(Debug, Default)]
pub struct VariableRegistry {
    variables: Vec<AgentVariable>,
    index: HashMap<Arc<str>, usize>,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` with the given type, or returns the existing
    /// variable when the name is already interned. Returns `Err` with the
    /// previously registered variable if the types disagree.
    pub fn register(
        &mut self,
        name: &str,
        value_type: ValueType,
    ) -> Result<AgentVariable, AgentVariable> {
        if let Some(&slot) = self.index.get(name) {
            let existing = self.variables[slot].clone();
            if existing.value_type == value_type {
                return Ok(existing);
            }
            return Err(existing);
        }
        let name: Arc<str> = Arc::from(name);
        let variable = AgentVariable {
            name: name.clone(),
            slot: self.variables.len(),
            value_type,
        };
        self.variables.push(variable.clone());
        self.index.insert(name, variable.slot);
        Ok(variable)
    }

    pub fn get(&self, name: &str) -> Option<AgentVariable> {
        self.index.get(name).map(|&slot| self.variables[slot].clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of slots assigned so far; the width of any store built for
    /// this model.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}
