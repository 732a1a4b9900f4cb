use core::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use crate::agent::prototype::AgentPrototype;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DefinitionError {
    #[error("Species already defined: {0}")]
    AlreadyDefined(String),
    #[error("Unknown species: {0}")]
    UnknownSpecies(String),
    #[error("Species {species} has no state named {state}")]
    UnknownStartingState { species: String, state: String },
    #[error("Species {species} expects {expected} arguments, found {actual}")]
    ArgumentCountMismatch {
        species: String,
        expected: usize,
        actual: usize,
    },
    #[error("Argument {index} of species {species} has an incompatible type")]
    IncompatibleArgument { species: String, index: usize },
    #[error("Species {0} was declared but its behaviour was never wired")]
    IncompleteSpecies(String),
}

/// A species identity: dense id plus human-readable label. Equality and
/// hashing are by id only.
#[derive(Clone, Debug)]
pub struct AgentName {
    id: usize,
    label: Arc<str>,
}

impl AgentName {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl PartialEq for AgentName {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AgentName {}

impl std::hash::Hash for AgentName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// 種別カタログ
///
/// Two-phase like the behaviours it contains: species names are declared
/// first (so patterns may reference species wired later), prototypes are
/// attached once compiled. After `seal`, the catalog is immutable.
#[derive(Default)]
pub struct AgentDefinitions {
    names: DashMap<String, AgentName>,
    ordered: std::sync::Mutex<Vec<AgentName>>,
    prototypes: DashMap<usize, Arc<AgentPrototype>>,
}

impl AgentDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase one: declares a species and assigns its dense id.
    pub fn declare(&self, label: &str) -> Result<AgentName, DefinitionError> {
        if self.names.contains_key(label) {
            return Err(DefinitionError::AlreadyDefined(label.to_string()));
        }
        let mut ordered = self.ordered.lock().expect("definitions lock");
        let name = AgentName {
            id: ordered.len(),
            label: Arc::from(label),
        };
        ordered.push(name.clone());
        self.names.insert(label.to_string(), name.clone());
        Ok(name)
    }

    pub fn name_of(&self, label: &str) -> Option<AgentName> {
        self.names.get(label).map(|entry| entry.value().clone())
    }

    /// Phase two: attaches the compiled prototype.
    pub fn set_prototype(&self, prototype: Arc<AgentPrototype>) {
        self.prototypes.insert(prototype.name().id(), prototype);
    }

    pub fn prototype(&self, label: &str) -> Result<Arc<AgentPrototype>, DefinitionError> {
        let name = self
            .name_of(label)
            .ok_or_else(|| DefinitionError::UnknownSpecies(label.to_string()))?;
        self.prototypes
            .get(&name.id())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DefinitionError::IncompleteSpecies(label.to_string()))
    }

    /// Every declared species, in declaration order.
    pub fn species(&self) -> Vec<AgentName> {
        self.ordered.lock().expect("definitions lock").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_assigns_dense_ids() {
        let definitions = AgentDefinitions::new();
        let a = definitions.declare("A").unwrap();
        let b = definitions.declare("B").unwrap();
        assert_eq!(a.id(), 0);
        assert_eq!(b.id(), 1);
        assert_eq!(definitions.species().len(), 2);
    }

    #[test]
    fn test_duplicate_species_rejected() {
        let definitions = AgentDefinitions::new();
        definitions.declare("A").unwrap();
        assert_eq!(
            definitions.declare("A").unwrap_err(),
            DefinitionError::AlreadyDefined("A".into())
        );
    }

    #[test]
    fn test_equality_is_by_id() {
        let definitions = AgentDefinitions::new();
        let a = definitions.declare("A").unwrap();
        let same = definitions.name_of("A").unwrap();
        assert_eq!(a, same);
    }

    #[test]
    fn test_declared_but_unwired_species_is_incomplete() {
        let definitions = AgentDefinitions::new();
        definitions.declare("A").unwrap();
        assert!(matches!(
            definitions.prototype("A").unwrap_err(),
            DefinitionError::IncompleteSpecies(_)
        ));
        assert!(matches!(
            definitions.prototype("B").unwrap_err(),
            DefinitionError::UnknownSpecies(_)
        ));
    }
}
