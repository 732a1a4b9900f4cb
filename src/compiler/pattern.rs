use core::fmt;
use std::sync::Arc;

use crate::agent::definitions::AgentName;
use crate::agent::store::AgentStore;
use crate::ast::Pattern;
use crate::compiler::context::ExpressionContext;
use crate::compiler::error::{CompileError, CompileResult};
use crate::compiler::expression::{EvalCtx, ExpressionCompiler};
use crate::compiler::ModelSymbols;

type PatternFn = Arc<dyn Fn(Option<&AgentStore>, &AgentName, &AgentStore) -> bool + Send + Sync>;

/// A compiled agent-selector: a predicate over (observer memory, candidate
/// agent). Used for message targeting and as the filter of population
/// aggregates; it never iterates the population itself.
#[derive(Clone)]
pub struct AgentPattern {
    predicate: PatternFn,
}

impl AgentPattern {
    /// The pattern that matches every agent; the default `send` target.
    pub fn always() -> Self {
        Self {
            predicate: Arc::new(|_, _, _| true),
        }
    }

    pub fn matches(
        &self,
        observer: Option<&AgentStore>,
        species: &AgentName,
        candidate: &AgentStore,
    ) -> bool {
        (self.predicate)(observer, species, candidate)
    }
}

impl fmt::Debug for AgentPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AgentPattern(..)")
    }
}

/// Compiles a parsed selector pattern. Named patterns check species
/// equality first, then evaluate their guard with the candidate's memory
/// as the pattern element (`it`) and the observer's memory ambient.
pub fn compile_pattern(symbols: &ModelSymbols, pattern: &Pattern) -> CompileResult<AgentPattern> {
    let predicate = compile_predicate(symbols, pattern)?;
    Ok(AgentPattern { predicate })
}

fn compile_predicate(symbols: &ModelSymbols, pattern: &Pattern) -> CompileResult<PatternFn> {
    match pattern {
        Pattern::Any(_) => Ok(Arc::new(|_, _, _| true)),

        Pattern::Named {
            species,
            guard,
            span,
        } => {
            let expected = symbols
                .species_name(species)
                .ok_or(CompileError::UnknownSpecies {
                    name: species.clone(),
                    span: *span,
                })?;
            let guard = compile_guard(symbols, guard)?;
            Ok(Arc::new(move |observer, species, candidate| {
                *species == expected && guard_holds(&guard, observer, candidate)
            }))
        }

        Pattern::Property { guard, .. } => {
            let guard = compile_guard(symbols, guard)?;
            Ok(Arc::new(move |observer, _, candidate| {
                guard_holds(&guard, observer, candidate)
            }))
        }

        Pattern::Not(inner, _) => {
            let inner = compile_predicate(symbols, inner)?;
            Ok(Arc::new(move |observer, species, candidate| {
                !inner(observer, species, candidate)
            }))
        }

        Pattern::And(left, right, _) => {
            let left = compile_predicate(symbols, left)?;
            let right = compile_predicate(symbols, right)?;
            Ok(Arc::new(move |observer, species, candidate| {
                left(observer, species, candidate) && right(observer, species, candidate)
            }))
        }

        Pattern::Or(left, right, _) => {
            let left = compile_predicate(symbols, left)?;
            let right = compile_predicate(symbols, right)?;
            Ok(Arc::new(move |observer, species, candidate| {
                left(observer, species, candidate) || right(observer, species, candidate)
            }))
        }
    }
}

fn compile_guard(
    symbols: &ModelSymbols,
    guard: &crate::ast::Expr,
) -> CompileResult<crate::compiler::expression::EvalFn> {
    let compiler = ExpressionCompiler::new(ExpressionContext::AgentPattern, symbols);
    compiler.check_boolean(guard)?;
    compiler.compile(guard)
}

fn guard_holds(
    guard: &crate::compiler::expression::EvalFn,
    observer: Option<&AgentStore>,
    candidate: &AgentStore,
) -> bool {
    let mut ctx = EvalCtx::for_pattern(observer, candidate);
    guard(&mut ctx).boolean_of()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, RelationOp, Span};
    use crate::values::{Value, ValueType};

    fn span() -> Span {
        Span::new(1, 1)
    }

    fn symbols_with_species() -> ModelSymbols {
        let mut symbols = ModelSymbols::new();
        symbols.declare_species("prey", span()).unwrap();
        symbols.declare_species("hunter", span()).unwrap();
        symbols.register_variable("energy", ValueType::Real).unwrap();
        symbols
    }

    #[test]
    fn test_named_pattern_checks_species_first() {
        let symbols = symbols_with_species();
        let pattern = compile_pattern(
            &symbols,
            &Pattern::Named {
                species: "prey".into(),
                guard: Expr::True,
                span: span(),
            },
        )
        .unwrap();
        let prey = symbols.species_name("prey").unwrap();
        let hunter = symbols.species_name("hunter").unwrap();
        let store = AgentStore::new(1);
        assert!(pattern.matches(None, &prey, &store));
        assert!(!pattern.matches(None, &hunter, &store));
    }

    #[test]
    fn test_guard_reads_candidate_through_it() {
        let symbols = symbols_with_species();
        // it.energy > 1.0
        let pattern = compile_pattern(
            &symbols,
            &Pattern::Property {
                guard: Expr::Relation {
                    op: RelationOp::Gt,
                    left: Box::new(Expr::PatternReference("energy".into(), span())),
                    right: Box::new(Expr::Real(1.0)),
                    span: span(),
                },
                span: span(),
            },
        )
        .unwrap();
        let name = symbols.species_name("prey").unwrap();
        let energy = symbols.variable("energy").unwrap();
        let strong = AgentStore::new(1).set(&energy, Value::Real(2.0));
        let weak = AgentStore::new(1).set(&energy, Value::Real(0.5));
        assert!(pattern.matches(None, &name, &strong));
        assert!(!pattern.matches(None, &name, &weak));
    }

    #[test]
    fn test_unknown_species_is_compile_error() {
        let symbols = symbols_with_species();
        let err = compile_pattern(
            &symbols,
            &Pattern::Named {
                species: "ghost".into(),
                guard: Expr::True,
                span: span(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::UnknownSpecies { .. }));
    }

    #[test]
    fn test_connectives() {
        let symbols = symbols_with_species();
        let prey_pattern = Pattern::Named {
            species: "prey".into(),
            guard: Expr::True,
            span: span(),
        };
        let not_prey = compile_pattern(&symbols, &Pattern::Not(Box::new(prey_pattern), span())).unwrap();
        let hunter = symbols.species_name("hunter").unwrap();
        let store = AgentStore::new(1);
        assert!(not_prey.matches(None, &hunter, &store));
    }

    #[test]
    fn test_non_boolean_guard_is_rejected() {
        let symbols = symbols_with_species();
        let err = compile_pattern(
            &symbols,
            &Pattern::Property {
                guard: Expr::Integer(1),
                span: span(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::TypeMismatch { .. }));
    }
}
