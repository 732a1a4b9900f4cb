//! モデルコンパイラ
//!
//! Turns parsed model fragments into the immutable, executable artifacts
//! the runtime drives: per-species prototypes, message tags, measures and
//! predicates. Symbols resolve to integer handles here, once; nothing is
//! looked up by name after compilation. Diagnostics are aggregated so a
//! single pass over a bad model reports everything it can find.

pub mod command;
pub mod context;
pub mod error;
pub mod expression;
pub mod pattern;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::agent::definitions::{AgentDefinitions, AgentName, DefinitionError};
use crate::agent::message::{MessageRepository, MessageTag};
use crate::agent::prototype::{AgentFactory, AgentPrototype};
use crate::agent::state::{AgentStep, MessageHandler, StepCase, Transition};
use crate::agent::AgentBehaviourBuilder;
use crate::ast::{
    Command, HandlerDef, ModelDef, Span, SpeciesDef, StateDef, StepDef, TransitionDef,
};
use crate::compiler::command::CommandCompiler;
use crate::compiler::context::ExpressionContext;
use crate::compiler::error::{CompileError, CompileErrors, CompileResult, ErrorReporter};
use crate::compiler::expression::{EvalCtx, ExpressionCompiler};
use crate::compiler::pattern::compile_pattern;
use crate::measure::{Measure, Predicate};
use crate::values::{Value, ValueType};
use crate::variables::{AgentVariable, VariableRegistry};

/// The symbol environment shared by the expression, pattern and command
/// compilers: evaluated globals, the slot registry, the species catalog
/// and the message tags.
#[derive(Default)]
pub struct ModelSymbols {
    globals: HashMap<String, (Value, ValueType)>,
    registry: VariableRegistry,
    definitions: AgentDefinitions,
    messages: MessageRepository,
}

impl ModelSymbols {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an evaluated constant or parameter.
    pub fn define_global(&mut self, name: &str, value: Value) {
        self.globals
            .insert(name.to_string(), (value, value.value_type()));
    }

    pub fn global(&self, name: &str) -> Option<(Value, ValueType)> {
        self.globals.get(name).copied()
    }

    pub fn register_variable(
        &mut self,
        name: &str,
        value_type: ValueType,
    ) -> Result<AgentVariable, AgentVariable> {
        self.registry.register(name, value_type)
    }

    pub fn variable(&self, name: &str) -> Option<AgentVariable> {
        self.registry.get(name)
    }

    pub fn declare_species(&self, name: &str, span: Span) -> CompileResult<AgentName> {
        self.definitions
            .declare(name)
            .map_err(|_| CompileError::DuplicateName {
                name: name.to_string(),
                span,
            })
    }

    pub fn species_name(&self, name: &str) -> Option<AgentName> {
        self.definitions.name_of(name)
    }

    pub fn tag(&self, name: &str) -> Option<Arc<MessageTag>> {
        self.messages.get(name)
    }

    pub fn message_repository(&self) -> &MessageRepository {
        &self.messages
    }

    pub fn definitions(&self) -> &AgentDefinitions {
        &self.definitions
    }

    /// Width of every agent store built for this model.
    pub fn store_width(&self) -> usize {
        self.registry.len()
    }
}

/// A fully compiled model: the species catalog plus the exported
/// measures and predicates.
pub struct Model {
    symbols: ModelSymbols,
    measures: Vec<Measure>,
    predicates: Vec<Predicate>,
}

impl Model {
    pub fn symbols(&self) -> &ModelSymbols {
        &self.symbols
    }

    pub fn definitions(&self) -> &AgentDefinitions {
        self.symbols.definitions()
    }

    /// An agent factory bound to the given argument values, starting at
    /// the species' declared initial state.
    pub fn factory(&self, species: &str, values: &[Value]) -> Result<AgentFactory, DefinitionError> {
        self.definitions().prototype(species)?.factory(values)
    }

    /// An agent factory starting at a named state instead.
    pub fn factory_at(
        &self,
        species: &str,
        state: &str,
        values: &[Value],
    ) -> Result<AgentFactory, DefinitionError> {
        self.definitions()
            .prototype(species)?
            .factory_at(state, values)
    }

    pub fn measures(&self) -> &[Measure] {
        &self.measures
    }

    pub fn measure(&self, name: &str) -> Option<&Measure> {
        self.measures.iter().find(|measure| measure.name() == name)
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn predicate(&self, name: &str) -> Option<&Predicate> {
        self.predicates
            .iter()
            .find(|predicate| predicate.name() == name)
    }
}

/// Compiles a parsed model in one aggregate-all-errors pass.
pub struct ModelCompiler {
    symbols: ModelSymbols,
    reporter: ErrorReporter,
}

impl ModelCompiler {
    pub fn compile(def: &ModelDef) -> Result<Model, CompileErrors> {
        let mut compiler = Self {
            symbols: ModelSymbols::new(),
            reporter: ErrorReporter::new(),
        };
        compiler.compile_globals(def);
        compiler.compile_messages(def);
        compiler.declare_species(def);
        compiler.register_species_variables(def);

        for species in &def.species {
            compiler.compile_species(species);
        }

        let (measures, predicates) = compiler.compile_observations(def);
        debug!(
            species = def.species.len(),
            measures = measures.len(),
            errors = compiler.reporter.has_errors(),
            "model compilation finished"
        );
        compiler.reporter.finish(Model {
            symbols: compiler.symbols,
            measures,
            predicates,
        })
    }

    /// Constants first, then parameters; both are evaluated eagerly and
    /// fold into the closure tree as plain values.
    fn compile_globals(&mut self, def: &ModelDef) {
        let declarations = def
            .constants
            .iter()
            .map(|c| (&c.name, &c.expr, c.span, ExpressionContext::Constant))
            .chain(
                def.parameters
                    .iter()
                    .map(|p| (&p.name, &p.expr, p.span, ExpressionContext::Parameter)),
            );
        for (name, expr, span, context) in declarations {
            if self.symbols.global(name).is_some() {
                self.reporter.report(CompileError::DuplicateName {
                    name: name.clone(),
                    span,
                });
                continue;
            }
            let compiled = {
                let compiler = ExpressionCompiler::new(context, &self.symbols);
                compiler.compile(expr)
            };
            if let Some(compiled) = self.reporter.record(compiled) {
                let value = compiled(&mut EvalCtx::pure());
                self.symbols.define_global(name, value);
            }
        }
    }

    fn compile_messages(&mut self, def: &ModelDef) {
        for message in &def.messages {
            let result = self
                .symbols
                .messages
                .register(&message.name, message.payload.clone());
            if result.is_err() {
                self.reporter.report(CompileError::DuplicateName {
                    name: message.name.clone(),
                    span: message.span,
                });
            }
        }
    }

    /// Species names are declared before anything is wired so patterns and
    /// sends may reference species defined later in the model.
    fn declare_species(&mut self, def: &ModelDef) {
        for species in &def.species {
            let declared = self.symbols.declare_species(&species.name, species.span);
            self.reporter.record(declared);
        }
    }

    /// Interns every agent-local name the model mentions: parameters,
    /// attributes, views, handler captures and let bindings. After this
    /// pass the registry is read-only.
    fn register_species_variables(&mut self, def: &ModelDef) {
        for species in &def.species {
            for (name, value_type) in &species.params {
                self.register(name, *value_type, species.span);
            }
            for attribute in species
                .attributes
                .iter()
                .chain(&species.views)
                .chain(&species.time_updates)
            {
                self.register(&attribute.name, attribute.value_type, attribute.span);
            }
            for state in &species.states {
                for dynamic in &state.dynamics {
                    self.register(&dynamic.name, dynamic.value_type, dynamic.span);
                }
                self.register_step_locals(&state.step);
                for handler in &state.handlers {
                    self.register_handler_locals(handler);
                }
            }
        }
    }

    fn register(&mut self, name: &str, value_type: ValueType, span: Span) {
        if self.symbols.register_variable(name, value_type).is_err() {
            self.reporter.report(CompileError::DuplicateName {
                name: name.to_string(),
                span,
            });
        }
    }

    fn register_step_locals(&mut self, step: &StepDef) {
        match step {
            StepDef::None => {}
            StepDef::Deterministic(transition) => self.register_command_locals(&transition.command),
            StepDef::Probabilistic(cases) => {
                for case in cases {
                    self.register_command_locals(&case.transition.command);
                }
            }
        }
    }

    fn register_handler_locals(&mut self, handler: &HandlerDef) {
        if let Some(tag) = self.symbols.tag(&handler.tag) {
            let payload = tag.payload().to_vec();
            for (capture, value_type) in handler.captures.iter().zip(payload) {
                self.register(capture, value_type, handler.span);
            }
        }
        self.register_command_locals(&handler.transition.command);
    }

    fn register_command_locals(&mut self, command: &Command) {
        match command {
            Command::Let {
                name,
                value_type,
                body,
                span,
                ..
            } => {
                self.register(name, *value_type, *span);
                self.register_command_locals(body);
            }
            Command::IfThenElse {
                then_branch,
                else_branch,
                ..
            } => {
                self.register_command_locals(then_branch);
                if let Some(else_branch) = else_branch {
                    self.register_command_locals(else_branch);
                }
            }
            Command::Block(commands) => {
                for command in commands {
                    self.register_command_locals(command);
                }
            }
            Command::Skip | Command::Assign { .. } | Command::Send { .. } => {}
        }
    }

    fn compile_species(&mut self, def: &SpeciesDef) {
        let Some(name) = self.symbols.species_name(&def.name) else {
            // 宣言段階で重複エラー済み
            return;
        };
        debug!(species = %name, "compiling species");

        let mut param_types = Vec::new();
        let mut param_slots = Vec::new();
        for (param, value_type) in &def.params {
            if let Some(variable) = self.symbols.variable(param) {
                param_types.push(*value_type);
                param_slots.push(variable.slot());
            }
        }

        let assignable: HashSet<usize> = def
            .attributes
            .iter()
            .chain(&def.views)
            .filter_map(|attribute| self.symbols.variable(&attribute.name))
            .map(|variable| variable.slot())
            .collect();

        let attributes =
            self.compile_attribute_set(&def.attributes, ExpressionContext::AgentAttribute, None);
        let views = self.compile_attribute_set(&def.views, ExpressionContext::AgentView, None);
        let time_updates = self.compile_attribute_set(
            &def.time_updates,
            ExpressionContext::AgentTimeUpdate,
            Some(&assignable),
        );

        let mut builder = AgentBehaviourBuilder::new(&def.name);
        let mut declared: Vec<(usize, &StateDef)> = Vec::new();
        for state in &def.states {
            let index = builder.declare_state(&state.name, state.is_initial, state.span);
            if let Some(index) = self.reporter.record(index) {
                declared.push((index, state));
            }
        }
        for (index, state) in &declared {
            self.wire_state(&mut builder, *index, state, &assignable);
        }
        let behaviour = builder.build(def.span);
        let Some(behaviour) = self.reporter.record(behaviour) else {
            return;
        };
        if self.reporter.has_errors() {
            // Diagnostics exist; the partial prototype would be unsound, so
            // the species stays unwired. Compilation still fails overall.
            return;
        }
        let prototype = AgentPrototype::new(
            name,
            param_types,
            param_slots,
            self.symbols.store_width(),
            attributes,
            views,
            time_updates,
            behaviour,
        );
        self.symbols.definitions.set_prototype(Arc::new(prototype));
    }

    /// Compiles a list of attribute expressions; when `assignable` is given
    /// the target slot must belong to it (time updates may only touch the
    /// species' own attributes and views).
    fn compile_attribute_set(
        &mut self,
        attributes: &[crate::ast::AttributeDef],
        context: ExpressionContext,
        assignable: Option<&HashSet<usize>>,
    ) -> Vec<(usize, crate::compiler::expression::EvalFn)> {
        let mut compiled = Vec::new();
        for attribute in attributes {
            let Some(variable) = self.symbols.variable(&attribute.name) else {
                continue;
            };
            if let Some(assignable) = assignable {
                if !assignable.contains(&variable.slot()) {
                    self.reporter.report(CompileError::NotAssignable {
                        name: attribute.name.clone(),
                        span: attribute.span,
                    });
                    continue;
                }
            }
            let result = {
                let compiler = ExpressionCompiler::new(context, &self.symbols);
                compiler.compile(&attribute.expr)
            };
            if let Some(eval) = self.reporter.record(result) {
                compiled.push((variable.slot(), eval));
            }
        }
        compiled
    }

    fn wire_state(
        &mut self,
        builder: &mut AgentBehaviourBuilder,
        index: usize,
        state: &StateDef,
        assignable: &HashSet<usize>,
    ) {
        if let Some(sojourn) = &state.sojourn {
            let result = {
                let compiler =
                    ExpressionCompiler::new(ExpressionContext::AgentSojournTime, &self.symbols);
                compiler.compile(sojourn)
            };
            if let Some(sojourn) = self.reporter.record(result) {
                builder.set_sojourn(index, sojourn);
            }
        }
        if !state.dynamics.is_empty() {
            let dynamics = self.compile_attribute_set(
                &state.dynamics,
                ExpressionContext::AgentTimeUpdate,
                Some(assignable),
            );
            builder.set_dynamics(index, dynamics);
        }
        match &state.step {
            StepDef::None => {}
            StepDef::Deterministic(transition) => {
                if let Some(transition) = self.compile_transition(builder, transition, assignable) {
                    builder.set_step(index, AgentStep::Deterministic(transition));
                }
            }
            StepDef::Probabilistic(case_defs) => {
                let mut cases = Vec::new();
                for case in case_defs {
                    let guard = match &case.guard {
                        Some(guard) => {
                            let result = {
                                let compiler = ExpressionCompiler::new(
                                    ExpressionContext::AgentCommand,
                                    &self.symbols,
                                );
                                compiler.check_boolean(guard).and_then(|()| compiler.compile(guard))
                            };
                            match self.reporter.record(result) {
                                Some(guard) => Some(guard),
                                None => continue,
                            }
                        }
                        None => None,
                    };
                    let weight = {
                        let compiler =
                            ExpressionCompiler::new(ExpressionContext::AgentCommand, &self.symbols);
                        compiler.compile(&case.weight)
                    };
                    let Some(weight) = self.reporter.record(weight) else {
                        continue;
                    };
                    let Some(transition) =
                        self.compile_transition(builder, &case.transition, assignable)
                    else {
                        continue;
                    };
                    cases.push(StepCase {
                        guard,
                        weight,
                        transition,
                    });
                }
                builder.set_step(index, AgentStep::Probabilistic(cases));
            }
        }
        for handler in &state.handlers {
            if let Some(handler) = self.compile_handler(builder, handler, assignable) {
                builder.add_handler(index, handler);
            }
        }
    }

    fn compile_transition(
        &mut self,
        builder: &AgentBehaviourBuilder,
        transition: &TransitionDef,
        assignable: &HashSet<usize>,
    ) -> Option<Transition> {
        let next = builder.state_index(&transition.next, transition.span);
        let next_state = self.reporter.record(next)?;
        let command = {
            let compiler = CommandCompiler::new(&self.symbols, assignable);
            compiler.compile(&transition.command)
        };
        let command = self.reporter.record(command)?;
        Some(Transition {
            command,
            next_state,
        })
    }

    fn compile_handler(
        &mut self,
        builder: &AgentBehaviourBuilder,
        handler: &HandlerDef,
        assignable: &HashSet<usize>,
    ) -> Option<MessageHandler> {
        let Some(tag) = self.symbols.tag(&handler.tag) else {
            self.reporter.report(CompileError::UnknownTag {
                name: handler.tag.clone(),
                span: handler.span,
            });
            return None;
        };
        if handler.captures.len() != tag.arity() {
            self.reporter.report(CompileError::CaptureArityMismatch {
                tag: tag.name().to_string(),
                expected: tag.arity(),
                actual: handler.captures.len(),
                span: handler.span,
            });
            return None;
        }
        let captures: Vec<usize> = handler
            .captures
            .iter()
            .filter_map(|capture| self.symbols.variable(capture))
            .map(|variable| variable.slot())
            .collect();
        let sender = match &handler.sender {
            Some(pattern) => {
                let compiled = compile_pattern(&self.symbols, pattern);
                Some(self.reporter.record(compiled)?)
            }
            None => None,
        };
        let guard = match &handler.guard {
            Some(guard) => {
                let result = {
                    let compiler = ExpressionCompiler::new(
                        ExpressionContext::AgentMessageHandler,
                        &self.symbols,
                    );
                    compiler.check_boolean(guard).and_then(|()| compiler.compile(guard))
                };
                Some(self.reporter.record(result)?)
            }
            None => None,
        };
        let transition = self.compile_transition(builder, &handler.transition, assignable)?;
        Some(MessageHandler {
            tag,
            captures,
            sender,
            guard,
            transition,
        })
    }

    fn compile_observations(&mut self, def: &ModelDef) -> (Vec<Measure>, Vec<Predicate>) {
        let mut measures = Vec::new();
        for measure in &def.measures {
            let result = {
                let compiler = ExpressionCompiler::new(ExpressionContext::Measure, &self.symbols);
                compiler.compile(&measure.expr)
            };
            if let Some(eval) = self.reporter.record(result) {
                measures.push(Measure::new(&measure.name, eval));
            }
        }
        let mut predicates = Vec::new();
        for predicate in &def.predicates {
            let result = {
                let compiler =
                    ExpressionCompiler::new(ExpressionContext::Predicate, &self.symbols);
                compiler
                    .check_boolean(&predicate.expr)
                    .and_then(|()| compiler.compile(&predicate.expr))
            };
            if let Some(eval) = self.reporter.record(result) {
                predicates.push(Predicate::new(&predicate.name, eval));
            }
        }
        (measures, predicates)
    }
}
