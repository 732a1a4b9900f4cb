use core::fmt;
use std::collections::HashSet;
use std::sync::Arc;

use rand::RngCore;

use crate::agent::message::OutgoingMessage;
use crate::agent::store::AgentStore;
use crate::ast::Command;
use crate::compiler::context::ExpressionContext;
use crate::compiler::error::{CompileError, CompileResult};
use crate::compiler::expression::{EvalCtx, EvalFn, ExpressionCompiler};
use crate::compiler::pattern::{compile_pattern, AgentPattern};
use crate::compiler::ModelSymbols;

type CommandFn =
    Arc<dyn Fn(&mut dyn RngCore, AgentStore, &mut Vec<OutgoingMessage>) -> AgentStore + Send + Sync>;

/// A compiled action block: a step function from (random source, memory)
/// to (outgoing messages, new memory). Composes left-to-right; memory is
/// threaded through, message lists concatenate.
#[derive(Clone)]
pub struct AgentCommand {
    run: CommandFn,
}

impl AgentCommand {
    /// The empty command.
    pub fn skip() -> Self {
        Self {
            run: Arc::new(|_, store, _| store),
        }
    }

    pub fn execute(
        &self,
        rng: &mut dyn RngCore,
        store: AgentStore,
    ) -> (Vec<OutgoingMessage>, AgentStore) {
        let mut messages = Vec::new();
        let store = (self.run)(rng, store, &mut messages);
        (messages, store)
    }

    pub(crate) fn run(
        &self,
        rng: &mut dyn RngCore,
        store: AgentStore,
        messages: &mut Vec<OutgoingMessage>,
    ) -> AgentStore {
        (self.run)(rng, store, messages)
    }
}

impl fmt::Debug for AgentCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AgentCommand(..)")
    }
}

/// Compiles the action blocks of one species. `assignable` is the set of
/// slots the species declared as attributes or views; assignments outside
/// it are compile errors.
pub struct CommandCompiler<'m> {
    symbols: &'m ModelSymbols,
    assignable: &'m HashSet<usize>,
}

impl<'m> CommandCompiler<'m> {
    pub fn new(symbols: &'m ModelSymbols, assignable: &'m HashSet<usize>) -> Self {
        Self { symbols, assignable }
    }

    fn expression(&self) -> ExpressionCompiler<'m> {
        ExpressionCompiler::new(ExpressionContext::AgentCommand, self.symbols)
    }

    pub fn compile(&self, command: &Command) -> CompileResult<AgentCommand> {
        let run = self.compile_fn(command)?;
        Ok(AgentCommand { run })
    }

    fn compile_fn(&self, command: &Command) -> CompileResult<CommandFn> {
        match command {
            Command::Skip => Ok(Arc::new(|_, store, _| store)),

            Command::Assign { name, expr, span } => {
                let variable =
                    self.symbols
                        .variable(name)
                        .ok_or_else(|| CompileError::UnknownSymbol {
                            name: name.clone(),
                            span: *span,
                        })?;
                if !self.assignable.contains(&variable.slot()) {
                    return Err(CompileError::NotAssignable {
                        name: name.clone(),
                        span: *span,
                    });
                }
                let slot = variable.slot();
                let value = self.expression().compile(expr)?;
                Ok(Arc::new(move |rng, store, _| {
                    let v = eval_with(rng, &store, &value);
                    store.set_slot(slot, v)
                }))
            }

            Command::Let {
                name,
                value_type,
                expr,
                body,
                span,
            } => {
                let variable = self
                    .symbols
                    .variable(name)
                    .filter(|v| v.value_type() == *value_type)
                    .ok_or_else(|| CompileError::UnknownSymbol {
                        name: name.clone(),
                        span: *span,
                    })?;
                let slot = variable.slot();
                let value = self.expression().compile(expr)?;
                let body = self.compile_fn(body)?;
                // The binding is visible inside the body only.
                Ok(Arc::new(move |rng, store, messages| {
                    let v = eval_with(rng, &store, &value);
                    let inner = store.set_slot(slot, v);
                    let after = body(rng, inner, messages);
                    after.unset_slot(slot)
                }))
            }

            Command::IfThenElse {
                guard,
                then_branch,
                else_branch,
                ..
            } => {
                let expression = self.expression();
                expression.check_boolean(guard)?;
                let guard = expression.compile(guard)?;
                let then_branch = self.compile_fn(then_branch)?;
                let else_branch = match else_branch {
                    Some(branch) => Some(self.compile_fn(branch)?),
                    None => None,
                };
                Ok(Arc::new(move |rng, store, messages| {
                    if eval_with(rng, &store, &guard).boolean_of() {
                        then_branch(rng, store, messages)
                    } else if let Some(else_branch) = &else_branch {
                        else_branch(rng, store, messages)
                    } else {
                        store
                    }
                }))
            }

            Command::Send {
                tag,
                args,
                target,
                delay,
                span,
            } => {
                let tag = self
                    .symbols
                    .tag(tag)
                    .ok_or_else(|| CompileError::UnknownTag {
                        name: tag.clone(),
                        span: *span,
                    })?;
                if args.len() != tag.arity() {
                    return Err(CompileError::ArityMismatch {
                        tag: tag.name().to_string(),
                        expected: tag.arity(),
                        actual: args.len(),
                        span: *span,
                    });
                }
                let elements: Vec<EvalFn> = args
                    .iter()
                    .map(|arg| self.expression().compile(arg))
                    .collect::<CompileResult<_>>()?;
                let target = match target {
                    Some(pattern) => compile_pattern(self.symbols, pattern)?,
                    None => AgentPattern::always(),
                };
                let delay = self.expression().compile(delay)?;
                Ok(Arc::new(move |rng, store, messages| {
                    let content = elements
                        .iter()
                        .map(|element| eval_with(rng, &store, element))
                        .collect();
                    let delay = eval_with(rng, &store, &delay).double_of().max(0.0);
                    messages.push(OutgoingMessage {
                        message: crate::agent::message::AgentMessage {
                            tag: tag.clone(),
                            content,
                        },
                        sender_store: store.clone(),
                        target: target.clone(),
                        delivery_time: store.now() + delay,
                    });
                    store
                }))
            }

            Command::Block(commands) => {
                let compiled: Vec<CommandFn> = commands
                    .iter()
                    .map(|command| self.compile_fn(command))
                    .collect::<CompileResult<_>>()?;
                Ok(Arc::new(move |rng, store, messages| {
                    compiled
                        .iter()
                        .fold(store, |store, command| command(rng, store, messages))
                }))
            }
        }
    }
}

fn eval_with(rng: &mut dyn RngCore, store: &AgentStore, f: &EvalFn) -> crate::values::Value {
    let mut ctx = EvalCtx::for_agent(Some(rng), store);
    f(&mut ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Expr, Span};
    use crate::values::{Value, ValueType};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn span() -> Span {
        Span::new(2, 4)
    }

    fn setup() -> (ModelSymbols, HashSet<usize>) {
        let mut symbols = ModelSymbols::new();
        let count = symbols.register_variable("count", ValueType::Integer).unwrap();
        symbols.register_variable("tmp", ValueType::Integer).unwrap();
        symbols
            .message_repository()
            .register("ping", vec![ValueType::Integer])
            .unwrap();
        let assignable = HashSet::from([count.slot()]);
        (symbols, assignable)
    }

    #[test]
    fn test_assignment_updates_memory_by_replacement() {
        let (symbols, assignable) = setup();
        let compiler = CommandCompiler::new(&symbols, &assignable);
        let command = compiler
            .compile(&Command::Assign {
                name: "count".into(),
                expr: Expr::Binary {
                    op: BinaryOp::Add,
                    left: Box::new(Expr::Reference("count".into(), span())),
                    right: Box::new(Expr::Integer(1)),
                    span: span(),
                },
                span: span(),
            })
            .unwrap();
        let count = symbols.variable("count").unwrap();
        let before = AgentStore::new(symbols.store_width()).set(&count, Value::Integer(1));
        let mut rng = StdRng::seed_from_u64(0);
        let (messages, after) = command.execute(&mut rng, before.clone());
        assert!(messages.is_empty());
        assert_eq!(after.get(&count), Value::Integer(2));
        assert_eq!(before.get(&count), Value::Integer(1));
    }

    #[test]
    fn test_assignment_to_undeclared_slot_fails() {
        let (symbols, assignable) = setup();
        let compiler = CommandCompiler::new(&symbols, &assignable);
        let err = compiler
            .compile(&Command::Assign {
                name: "tmp".into(),
                expr: Expr::Integer(0),
                span: span(),
            })
            .unwrap_err();
        assert!(matches!(err, CompileError::NotAssignable { .. }));
    }

    #[test]
    fn test_let_binding_does_not_escape_block() {
        let (symbols, assignable) = setup();
        let compiler = CommandCompiler::new(&symbols, &assignable);
        let command = compiler
            .compile(&Command::Let {
                name: "tmp".into(),
                value_type: ValueType::Integer,
                expr: Expr::Integer(10),
                body: Box::new(Command::Assign {
                    name: "count".into(),
                    expr: Expr::Reference("tmp".into(), span()),
                    span: span(),
                }),
                span: span(),
            })
            .unwrap();
        let count = symbols.variable("count").unwrap();
        let tmp = symbols.variable("tmp").unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let (_, after) = command.execute(&mut rng, AgentStore::new(symbols.store_width()));
        assert_eq!(after.get(&count), Value::Integer(10));
        assert_eq!(after.get(&tmp), Value::Error);
    }

    #[test]
    fn test_send_arity_is_checked_at_compile_time() {
        let (symbols, assignable) = setup();
        let compiler = CommandCompiler::new(&symbols, &assignable);
        let err = compiler
            .compile(&Command::Send {
                tag: "ping".into(),
                args: vec![Expr::Integer(0), Expr::Integer(1)],
                target: None,
                delay: Expr::Real(0.0),
                span: span(),
            })
            .unwrap_err();
        match err {
            CompileError::ArityMismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_send_emits_message_with_delivery_time() {
        let (symbols, assignable) = setup();
        let compiler = CommandCompiler::new(&symbols, &assignable);
        let command = compiler
            .compile(&Command::Send {
                tag: "ping".into(),
                args: vec![Expr::Integer(3)],
                target: None,
                delay: Expr::Real(1.5),
                span: span(),
            })
            .unwrap();
        let store = AgentStore::new(symbols.store_width()).at_time(2.0);
        let mut rng = StdRng::seed_from_u64(0);
        let (messages, _) = command.execute(&mut rng, store);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message.content, vec![Value::Integer(3)]);
        assert_eq!(messages[0].delivery_time, 3.5);
    }

    #[test]
    fn test_unknown_tag_is_compile_error() {
        let (symbols, assignable) = setup();
        let compiler = CommandCompiler::new(&symbols, &assignable);
        let err = compiler
            .compile(&Command::Send {
                tag: "pong".into(),
                args: vec![],
                target: None,
                delay: Expr::Real(0.0),
                span: span(),
            })
            .unwrap_err();
        assert!(matches!(err, CompileError::UnknownTag { .. }));
    }

    #[test]
    fn test_non_boolean_guard_rejected() {
        let (symbols, assignable) = setup();
        let compiler = CommandCompiler::new(&symbols, &assignable);
        let err = compiler
            .compile(&Command::IfThenElse {
                guard: Expr::Integer(1),
                then_branch: Box::new(Command::Skip),
                else_branch: None,
                span: span(),
            })
            .unwrap_err();
        assert!(matches!(err, CompileError::TypeMismatch { .. }));
    }

    #[test]
    fn test_sequencing_threads_memory_and_concatenates_messages() {
        let (symbols, assignable) = setup();
        let compiler = CommandCompiler::new(&symbols, &assignable);
        let send = Command::Send {
            tag: "ping".into(),
            args: vec![Expr::Reference("count".into(), span())],
            target: None,
            delay: Expr::Real(0.0),
            span: span(),
        };
        let command = compiler
            .compile(&Command::Block(vec![
                Command::Assign {
                    name: "count".into(),
                    expr: Expr::Integer(5),
                    span: span(),
                },
                send.clone(),
                send,
            ]))
            .unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let (messages, _) = command.execute(&mut rng, AgentStore::new(symbols.store_width()));
        assert_eq!(messages.len(), 2);
        // 代入後の値が送信内容に反映されている
        assert_eq!(messages[0].message.content, vec![Value::Integer(5)]);
        assert_eq!(messages[1].message.content, vec![Value::Integer(5)]);
    }
}
