use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::state::{AgentState, AgentStep, MessageHandler};
use crate::ast::Span;
use crate::compiler::error::{CompileError, CompileResult};
use crate::compiler::expression::EvalFn;

/// 状態機械の組み立て
///
/// Behaviours are built in two phases: first every state is declared, then
/// steps and handlers are wired, because a step may target a state that is
/// declared after it. `build` returns the immutable [`AgentBehaviour`]
/// only once every forward reference resolved; partial definitions are
/// rejected, never defaulted.
pub struct AgentBehaviourBuilder {
    species: String,
    states: Vec<AgentState>,
    names: HashMap<String, usize>,
    initial: Option<usize>,
}

impl AgentBehaviourBuilder {
    pub fn new(species: &str) -> Self {
        Self {
            species: species.to_string(),
            states: Vec::new(),
            names: HashMap::new(),
            initial: None,
        }
    }

    /// Phase one: declares a state and assigns its index.
    pub fn declare_state(
        &mut self,
        name: &str,
        is_initial: bool,
        span: Span,
    ) -> CompileResult<usize> {
        if self.names.contains_key(name) {
            return Err(CompileError::DuplicateName {
                name: name.to_string(),
                span,
            });
        }
        let index = self.states.len();
        if is_initial {
            if let Some(first) = self.initial {
                return Err(CompileError::DuplicateInitialState {
                    species: self.species.clone(),
                    first: self.states[first].name().to_string(),
                    second: name.to_string(),
                    span,
                });
            }
            self.initial = Some(index);
        }
        self.states.push(AgentState {
            index,
            name: Arc::from(name),
            sojourn: None,
            step: AgentStep::None,
            handlers: Vec::new(),
            dynamics: Vec::new(),
            is_initial,
        });
        self.names.insert(name.to_string(), index);
        Ok(index)
    }

    /// Resolves a state name to its index; unknown targets are compile
    /// errors, never a runtime default.
    pub fn state_index(&self, name: &str, span: Span) -> CompileResult<usize> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::UnknownState {
                name: name.to_string(),
                span,
            })
    }

    // Phase two: wiring.

    pub fn set_sojourn(&mut self, state: usize, sojourn: EvalFn) {
        self.states[state].sojourn = Some(sojourn);
    }

    pub fn set_step(&mut self, state: usize, step: AgentStep) {
        self.states[state].step = step;
    }

    pub fn add_handler(&mut self, state: usize, handler: MessageHandler) {
        self.states[state].handlers.push(handler);
    }

    pub fn set_dynamics(&mut self, state: usize, dynamics: Vec<(usize, EvalFn)>) {
        self.states[state].dynamics = dynamics;
    }

    /// Finishes the build. Fails when no state was flagged initial.
    pub fn build(self, span: Span) -> CompileResult<AgentBehaviour> {
        let initial = self.initial.ok_or(CompileError::MissingInitialState {
            species: self.species.clone(),
            span,
        })?;
        Ok(AgentBehaviour {
            states: self.states.into_iter().map(Arc::new).collect(),
            names: self.names,
            initial,
        })
    }
}

/// The immutable, fully-resolved state machine of one species.
pub struct AgentBehaviour {
    states: Vec<Arc<AgentState>>,
    names: HashMap<String, usize>,
    initial: usize,
}

impl AgentBehaviour {
    pub fn initial_state(&self) -> &Arc<AgentState> {
        &self.states[self.initial]
    }

    pub fn state(&self, index: usize) -> &Arc<AgentState> {
        &self.states[index]
    }

    pub fn state_by_name(&self, name: &str) -> Option<&Arc<AgentState>> {
        self.names.get(name).map(|&index| &self.states[index])
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::new(5, 1)
    }

    #[test]
    fn test_forward_reference_resolves_after_declaration() {
        let mut builder = AgentBehaviourBuilder::new("walker");
        let a = builder.declare_state("A", true, span()).unwrap();
        let b = builder.declare_state("B", false, span()).unwrap();
        assert_eq!(builder.state_index("B", span()).unwrap(), b);
        let behaviour = builder.build(span()).unwrap();
        assert_eq!(behaviour.initial_state().index(), a);
        assert_eq!(behaviour.state_by_name("B").unwrap().index(), b);
    }

    #[test]
    fn test_duplicate_state_name_is_rejected() {
        let mut builder = AgentBehaviourBuilder::new("walker");
        builder.declare_state("A", true, span()).unwrap();
        let err = builder.declare_state("A", false, span()).unwrap_err();
        assert!(matches!(err, CompileError::DuplicateName { .. }));
    }

    #[test]
    fn test_missing_initial_state_fails_build() {
        let mut builder = AgentBehaviourBuilder::new("walker");
        builder.declare_state("A", false, span()).unwrap();
        let err = builder.build(span()).unwrap_err();
        assert!(matches!(err, CompileError::MissingInitialState { .. }));
    }

    #[test]
    fn test_second_initial_state_is_rejected() {
        let mut builder = AgentBehaviourBuilder::new("walker");
        builder.declare_state("A", true, span()).unwrap();
        let err = builder.declare_state("B", true, span()).unwrap_err();
        match err {
            CompileError::DuplicateInitialState { first, second, .. } => {
                assert_eq!(first, "A");
                assert_eq!(second, "B");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_state_is_compile_error() {
        let builder = AgentBehaviourBuilder::new("walker");
        let err = builder.state_index("Z", span()).unwrap_err();
        assert!(matches!(err, CompileError::UnknownState { .. }));
    }
}
