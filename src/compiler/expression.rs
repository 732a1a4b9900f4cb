use std::sync::Arc;

use rand::Rng;
use rand::RngCore;
use rand_distr::StandardNormal;

use crate::agent::store::AgentStore;
use crate::ast::{AggregateOp, BinaryOp, Builtin, Expr, RelationOp, Span, UnaryOp};
use crate::compiler::context::ExpressionContext;
use crate::compiler::error::{CompileError, CompileResult};
use crate::compiler::pattern::compile_pattern;
use crate::compiler::ModelSymbols;
use crate::population::PopulationView;
use crate::values::{Value, ValueType};

/// A compiled expression: a closure from the evaluation context to a value.
/// Closures are pure with respect to everything except the random source
/// handed in through the context, and are safe to share across trajectories.
pub type EvalFn = Arc<dyn Fn(&mut EvalCtx<'_>) -> Value + Send + Sync>;

/// 評価コンテキスト
///
/// The record a compiled closure evaluates against. Which fields are
/// populated depends on where the expression was compiled; a closure never
/// asks for a capability its compilation context forbade, so a missing
/// field can only be observed as [`Value::Error`] through API misuse.
pub struct EvalCtx<'a> {
    pub(crate) rng: Option<&'a mut dyn RngCore>,
    pub(crate) store: Option<&'a AgentStore>,
    /// Memory of the matched pattern element (`it`).
    pub(crate) pattern: Option<&'a AgentStore>,
    pub(crate) now: Option<f64>,
    pub(crate) dt: Option<f64>,
    pub(crate) population: Option<&'a dyn PopulationView>,
}

impl<'a> EvalCtx<'a> {
    /// Context for parameter/constant evaluation: nothing but literals and
    /// previously evaluated globals.
    pub fn pure() -> Self {
        Self {
            rng: None,
            store: None,
            pattern: None,
            now: None,
            dt: None,
            population: None,
        }
    }

    /// Context for agent-local evaluation (commands, guards, sojourn).
    pub fn for_agent(rng: Option<&'a mut dyn RngCore>, store: &'a AgentStore) -> Self {
        Self {
            rng,
            store: Some(store),
            pattern: None,
            now: Some(store.now()),
            dt: None,
            population: None,
        }
    }

    /// Context for pattern-guard evaluation: the observer's memory ambient,
    /// the candidate's memory as the pattern element.
    pub fn for_pattern(observer: Option<&'a AgentStore>, candidate: &'a AgentStore) -> Self {
        Self {
            rng: None,
            store: observer,
            pattern: Some(candidate),
            now: observer.map(AgentStore::now),
            dt: None,
            population: None,
        }
    }

    /// Context for the continuous time-update function.
    pub fn for_time_update(rng: Option<&'a mut dyn RngCore>, store: &'a AgentStore, dt: f64) -> Self {
        Self {
            rng,
            store: Some(store),
            pattern: None,
            now: Some(store.now()),
            dt: Some(dt),
            population: None,
        }
    }

    /// Context for perception: agent-local plus the population snapshot.
    pub fn for_view(
        rng: Option<&'a mut dyn RngCore>,
        store: &'a AgentStore,
        population: &'a dyn PopulationView,
    ) -> Self {
        Self {
            rng,
            store: Some(store),
            pattern: None,
            now: Some(store.now()),
            dt: None,
            population: Some(population),
        }
    }

    /// Context for measures and predicates: population plus global clock.
    pub fn for_population(population: &'a dyn PopulationView, now: f64) -> Self {
        Self {
            rng: None,
            store: None,
            pattern: None,
            now: Some(now),
            dt: None,
            population: Some(population),
        }
    }

    pub(crate) fn get_slot(&self, slot: usize) -> Value {
        match self.store {
            Some(store) => store.get_slot(slot),
            None => Value::Error,
        }
    }

    pub(crate) fn get_pattern_slot(&self, slot: usize) -> Value {
        match self.pattern {
            Some(store) => store.get_slot(slot),
            None => Value::Error,
        }
    }

    pub(crate) fn now_value(&self) -> Value {
        match self.now {
            Some(now) => Value::Real(now),
            None => Value::Error,
        }
    }

    pub(crate) fn dt_value(&self) -> Value {
        match self.dt {
            Some(dt) => Value::Real(dt),
            None => Value::Error,
        }
    }

    pub(crate) fn random_value(&mut self) -> Value {
        match self.rng.as_deref_mut() {
            Some(rng) => Value::Real(rng.gen::<f64>()),
            None => Value::Error,
        }
    }

    pub(crate) fn sample_uniform(&mut self, from: Value, to: Value) -> Value {
        let (from, to) = (from.double_of(), to.double_of());
        match self.rng.as_deref_mut() {
            Some(rng) => Value::Real(from + rng.gen::<f64>() * (to - from)),
            None => Value::Error,
        }
    }

    pub(crate) fn sample_normal(&mut self, mean: Value, sigma: Value) -> Value {
        let (mean, sigma) = (mean.double_of(), sigma.double_of());
        match self.rng.as_deref_mut() {
            Some(rng) => {
                let draw: f64 = rng.sample(StandardNormal);
                Value::Real(mean + draw * sigma)
            }
            None => Value::Error,
        }
    }
}

/// Compiles expressions appearing in one [`ExpressionContext`].
///
/// The permission check runs here, per node, while the closure tree is
/// being built; the produced closures carry no checks of their own.
pub struct ExpressionCompiler<'m> {
    context: ExpressionContext,
    symbols: &'m ModelSymbols,
}

impl<'m> ExpressionCompiler<'m> {
    pub fn new(context: ExpressionContext, symbols: &'m ModelSymbols) -> Self {
        Self { context, symbols }
    }

    fn forbidden(&self, construct: &'static str, span: Span) -> CompileError {
        CompileError::IllegalCapability {
            construct,
            context: self.context,
            span,
        }
    }

    /// Static type of an expression, as far as it can be determined without
    /// running it. Arithmetic over the wrong tags is not an error here (it
    /// yields the Error value at runtime); relations and casts are checked
    /// strictly.
    pub fn infer(&self, expr: &Expr) -> CompileResult<ValueType> {
        match expr {
            Expr::True | Expr::False => Ok(ValueType::Boolean),
            Expr::Integer(_) => Ok(ValueType::Integer),
            Expr::Real(_) => Ok(ValueType::Real),
            Expr::Reference(name, span) => self.reference_type(name, *span),
            Expr::PatternReference(name, span) => match self.symbols.variable(name) {
                Some(variable) => Ok(variable.value_type()),
                None => Err(CompileError::UnknownSymbol {
                    name: name.clone(),
                    span: *span,
                }),
            },
            Expr::Now(_) | Expr::Dt(_) | Expr::Random(_) => Ok(ValueType::Real),
            Expr::SampleUniform { .. } | Expr::SampleNormal { .. } => Ok(ValueType::Real),
            Expr::Unary { op, arg, .. } => match op {
                UnaryOp::Not => Ok(ValueType::Boolean),
                UnaryOp::Neg => self.infer(arg),
            },
            Expr::Binary {
                op, left, right, ..
            } => match op {
                BinaryOp::And | BinaryOp::Or => Ok(ValueType::Boolean),
                BinaryOp::Pow => Ok(ValueType::Real),
                _ => Ok(self.infer(left)?.promote(self.infer(right)?)),
            },
            Expr::Relation { .. } => Ok(ValueType::Boolean),
            Expr::IfThenElse {
                then_branch,
                else_branch,
                ..
            } => {
                let then_type = self.infer(then_branch)?;
                let else_type = self.infer(else_branch)?;
                if then_type == else_type {
                    Ok(then_type)
                } else if then_type.is_numeric() && else_type.is_numeric() {
                    Ok(ValueType::Real)
                } else {
                    Ok(ValueType::None)
                }
            }
            Expr::Call { .. } => Ok(ValueType::Real),
            Expr::Cast { target, .. } => Ok(*target),
            Expr::Aggregate { op, .. } => Ok(match op {
                AggregateOp::Count => ValueType::Integer,
                AggregateOp::Exists | AggregateOp::ForAll => ValueType::Boolean,
                _ => ValueType::Real,
            }),
        }
    }

    fn reference_type(&self, name: &str, span: Span) -> CompileResult<ValueType> {
        if let Some((_, value_type)) = self.symbols.global(name) {
            return Ok(value_type);
        }
        if self.context.attribute_access_allowed() {
            if let Some(variable) = self.symbols.variable(name) {
                return Ok(variable.value_type());
            }
        }
        Err(CompileError::UnknownSymbol {
            name: name.to_string(),
            span,
        })
    }

    /// Requires `expr` to be statically Boolean; used for guards.
    pub fn check_boolean(&self, expr: &Expr) -> CompileResult<()> {
        let found = self.infer(expr)?;
        if found != ValueType::Boolean {
            return Err(CompileError::TypeMismatch {
                expected: ValueType::Boolean,
                found,
                span: expr.span(),
            });
        }
        Ok(())
    }

    pub fn compile(&self, expr: &Expr) -> CompileResult<EvalFn> {
        match expr {
            Expr::True => Ok(constant(Value::Boolean(true))),
            Expr::False => Ok(constant(Value::Boolean(false))),
            Expr::Integer(value) => Ok(constant(Value::Integer(*value))),
            Expr::Real(value) => Ok(constant(Value::Real(*value))),

            Expr::Reference(name, span) => self.compile_reference(name, *span),

            Expr::PatternReference(name, span) => {
                if !self.context.pattern_reference_allowed() {
                    return Err(self.forbidden("pattern element reference", *span));
                }
                let variable = self.symbols.variable(name).ok_or(CompileError::UnknownSymbol {
                    name: name.clone(),
                    span: *span,
                })?;
                let slot = variable.slot();
                Ok(Arc::new(move |ctx| ctx.get_pattern_slot(slot)))
            }

            Expr::Now(span) => {
                if !self.context.now_allowed() {
                    return Err(self.forbidden("now", *span));
                }
                Ok(Arc::new(|ctx| ctx.now_value()))
            }

            Expr::Dt(span) => {
                if !self.context.dt_allowed() {
                    return Err(self.forbidden("dt", *span));
                }
                Ok(Arc::new(|ctx| ctx.dt_value()))
            }

            Expr::Random(span) => {
                if !self.context.random_allowed() {
                    return Err(self.forbidden("random()", *span));
                }
                Ok(Arc::new(|ctx| ctx.random_value()))
            }

            Expr::SampleUniform { from, to, span } => {
                if !self.context.random_allowed() {
                    return Err(self.forbidden("uniform sampling", *span));
                }
                let from = self.compile(from)?;
                let to = self.compile(to)?;
                Ok(Arc::new(move |ctx| {
                    let from = from(ctx);
                    let to = to(ctx);
                    ctx.sample_uniform(from, to)
                }))
            }

            Expr::SampleNormal { mean, sigma, span } => {
                if !self.context.random_allowed() {
                    return Err(self.forbidden("normal sampling", *span));
                }
                let mean = self.compile(mean)?;
                let sigma = self.compile(sigma)?;
                Ok(Arc::new(move |ctx| {
                    let mean = mean(ctx);
                    let sigma = sigma(ctx);
                    ctx.sample_normal(mean, sigma)
                }))
            }

            Expr::Unary { op, arg, .. } => {
                let arg = self.compile(arg)?;
                Ok(match op {
                    UnaryOp::Neg => Arc::new(move |ctx| arg(ctx).neg()),
                    UnaryOp::Not => Arc::new(move |ctx| arg(ctx).not()),
                })
            }

            Expr::Binary {
                op, left, right, ..
            } => {
                let left = self.compile(left)?;
                let right = self.compile(right)?;
                let op = *op;
                Ok(Arc::new(move |ctx| {
                    let l = left(ctx);
                    let r = right(ctx);
                    match op {
                        BinaryOp::Add => l.sum(r),
                        BinaryOp::Sub => l.sub(r),
                        BinaryOp::Mul => l.mul(r),
                        BinaryOp::Div => l.div(r),
                        BinaryOp::ZeroDiv => l.zero_div(r),
                        BinaryOp::Mod => l.modulo(r),
                        BinaryOp::Pow => l.pow(r),
                        BinaryOp::And => l.and(r),
                        BinaryOp::Or => l.or(r),
                    }
                }))
            }

            Expr::Relation {
                op, left, right, span,
            } => {
                let left_type = self.infer(left)?;
                let right_type = self.infer(right)?;
                if !left_type.comparable_with(right_type)
                    || (op.is_ordering() && !left_type.is_numeric())
                {
                    return Err(CompileError::IncomparableTypes {
                        left: left_type,
                        right: right_type,
                        span: *span,
                    });
                }
                let left = self.compile(left)?;
                let right = self.compile(right)?;
                let op = *op;
                Ok(Arc::new(move |ctx| {
                    let l = left(ctx);
                    let r = right(ctx);
                    match l.partial_compare(r) {
                        Some(ordering) => Value::Boolean(match op {
                            RelationOp::Eq => ordering.is_eq(),
                            RelationOp::Neq => ordering.is_ne(),
                            RelationOp::Lt => ordering.is_lt(),
                            RelationOp::Leq => ordering.is_le(),
                            RelationOp::Gt => ordering.is_gt(),
                            RelationOp::Geq => ordering.is_ge(),
                        }),
                        None => Value::Error,
                    }
                }))
            }

            Expr::IfThenElse {
                guard,
                then_branch,
                else_branch,
                ..
            } => {
                self.check_boolean(guard)?;
                let guard = self.compile(guard)?;
                let then_branch = self.compile(then_branch)?;
                let else_branch = self.compile(else_branch)?;
                Ok(Arc::new(move |ctx| match guard(ctx) {
                    Value::Boolean(true) => then_branch(ctx),
                    Value::Boolean(false) => else_branch(ctx),
                    _ => Value::Error,
                }))
            }

            Expr::Call {
                function,
                args,
                span,
            } => self.compile_call(*function, args, *span),

            Expr::Cast { target, arg, span } => {
                let arg_type = self.infer(arg)?;
                if !target.is_numeric() || !arg_type.is_numeric() {
                    return Err(CompileError::TypeMismatch {
                        expected: *target,
                        found: arg_type,
                        span: *span,
                    });
                }
                let target = *target;
                let arg = self.compile(arg)?;
                Ok(Arc::new(move |ctx| arg(ctx).cast(target)))
            }

            Expr::Aggregate {
                op,
                expr,
                pattern,
                span,
            } => self.compile_aggregate(*op, expr.as_deref(), pattern, *span),
        }
    }

    fn compile_reference(&self, name: &str, span: Span) -> CompileResult<EvalFn> {
        if let Some((value, _)) = self.symbols.global(name) {
            return Ok(constant(value));
        }
        if self.context.attribute_access_allowed() {
            if let Some(variable) = self.symbols.variable(name) {
                let slot = variable.slot();
                return Ok(Arc::new(move |ctx| ctx.get_slot(slot)));
            }
        }
        Err(CompileError::UnknownSymbol {
            name: name.to_string(),
            span,
        })
    }

    fn compile_call(&self, function: Builtin, args: &[Expr], span: Span) -> CompileResult<EvalFn> {
        if args.len() != function.arity() {
            return Err(CompileError::FunctionArityMismatch {
                function: function.to_string(),
                expected: function.arity(),
                actual: args.len(),
                span,
            });
        }
        let compiled: Vec<EvalFn> = args
            .iter()
            .map(|arg| self.compile(arg))
            .collect::<CompileResult<_>>()?;
        Ok(match function {
            Builtin::Abs => unary(compiled, f64::abs),
            Builtin::Floor => unary(compiled, f64::floor),
            Builtin::Ceil => unary(compiled, f64::ceil),
            Builtin::Exp => unary(compiled, f64::exp),
            Builtin::Log => unary(compiled, f64::ln),
            Builtin::Log10 => unary(compiled, f64::log10),
            Builtin::Sqrt => unary(compiled, f64::sqrt),
            Builtin::Sin => unary(compiled, f64::sin),
            Builtin::Cos => unary(compiled, f64::cos),
            Builtin::Tan => unary(compiled, f64::tan),
            Builtin::Asin => unary(compiled, f64::asin),
            Builtin::Acos => unary(compiled, f64::acos),
            Builtin::Atan => unary(compiled, f64::atan),
            Builtin::Sinh => unary(compiled, f64::sinh),
            Builtin::Cosh => unary(compiled, f64::cosh),
            Builtin::Tanh => unary(compiled, f64::tanh),
            Builtin::Atan2 => binary(compiled, f64::atan2),
            Builtin::Pow => binary(compiled, f64::powf),
            Builtin::Min => {
                let [a, b] = pair(compiled);
                Arc::new(move |ctx| {
                    let x = a(ctx);
                    let y = b(ctx);
                    x.min_value(y)
                })
            }
            Builtin::Max => {
                let [a, b] = pair(compiled);
                Arc::new(move |ctx| {
                    let x = a(ctx);
                    let y = b(ctx);
                    x.max_value(y)
                })
            }
        })
    }

    fn compile_aggregate(
        &self,
        op: AggregateOp,
        expr: Option<&Expr>,
        pattern: &crate::ast::Pattern,
        span: Span,
    ) -> CompileResult<EvalFn> {
        if !self.context.aggregates_allowed() {
            return Err(self.forbidden("population aggregate", span));
        }
        let compiled_pattern = compile_pattern(self.symbols, pattern)?;
        // The per-agent scalar sees the candidate as the pattern element.
        let scalar = match expr {
            Some(expr) => {
                let inner =
                    ExpressionCompiler::new(ExpressionContext::AgentPattern, self.symbols);
                Some(inner.compile(expr)?)
            }
            None if op.takes_expression() => {
                return Err(CompileError::FunctionArityMismatch {
                    function: op.to_string(),
                    expected: 1,
                    actual: 0,
                    span,
                })
            }
            None => None,
        };
        Ok(Arc::new(move |ctx| {
            let Some(population) = ctx.population else {
                return Value::Error;
            };
            let observer = ctx.store;
            let filter = |agent: &crate::agent::runtime::LiveAgent| {
                compiled_pattern.matches(observer, agent.species(), agent.store())
            };
            let eval_scalar = |candidate: &AgentStore| -> f64 {
                match &scalar {
                    Some(scalar) => {
                        let mut inner = EvalCtx::for_pattern(observer, candidate);
                        scalar(&mut inner).double_of()
                    }
                    None => f64::NAN,
                }
            };
            match op {
                AggregateOp::Count => Value::Integer(population.count(&filter) as i64),
                AggregateOp::Sum => Value::Real(population.sum_of(&eval_scalar, &filter)),
                AggregateOp::Min => match population.min_of(&eval_scalar, &filter) {
                    Some(value) => Value::Real(value),
                    None => Value::Error,
                },
                AggregateOp::Max => match population.max_of(&eval_scalar, &filter) {
                    Some(value) => Value::Real(value),
                    None => Value::Error,
                },
                AggregateOp::Mean => match population.mean_of(&eval_scalar, &filter) {
                    Some(value) => Value::Real(value),
                    None => Value::Error,
                },
                AggregateOp::Exists => Value::Boolean(population.exists(&filter)),
                AggregateOp::ForAll => Value::Boolean(population.for_all(&filter)),
            }
        }))
    }
}

fn constant(value: Value) -> EvalFn {
    Arc::new(move |_| value)
}

fn pair(mut compiled: Vec<EvalFn>) -> [EvalFn; 2] {
    let b = compiled.pop().expect("arity checked");
    let a = compiled.pop().expect("arity checked");
    [a, b]
}

fn unary(mut compiled: Vec<EvalFn>, op: fn(f64) -> f64) -> EvalFn {
    let arg = compiled.pop().expect("arity checked");
    Arc::new(move |ctx| arg(ctx).apply(op))
}

fn binary(compiled: Vec<EvalFn>, op: fn(f64, f64) -> f64) -> EvalFn {
    let [a, b] = pair(compiled);
    Arc::new(move |ctx| {
        let x = a(ctx);
        let y = b(ctx);
        x.apply2(y, op)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Pattern;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn symbols() -> ModelSymbols {
        let mut symbols = ModelSymbols::new();
        symbols.define_global("half", Value::Real(0.5));
        symbols
            .register_variable("x", ValueType::Integer)
            .unwrap();
        symbols
    }

    fn span() -> Span {
        Span::new(1, 1)
    }

    #[test]
    fn test_constant_folding_of_globals() {
        let symbols = symbols();
        let compiler = ExpressionCompiler::new(ExpressionContext::Constant, &symbols);
        let f = compiler
            .compile(&Expr::Binary {
                op: BinaryOp::Add,
                left: Box::new(Expr::Reference("half".into(), span())),
                right: Box::new(Expr::Real(1.0)),
                span: span(),
            })
            .unwrap();
        assert_eq!(f(&mut EvalCtx::pure()), Value::Real(1.5));
    }

    #[test]
    fn test_attribute_access_forbidden_in_constant_context() {
        let symbols = symbols();
        let compiler = ExpressionCompiler::new(ExpressionContext::Constant, &symbols);
        let err = compiler
            .compile(&Expr::Reference("x".into(), span()))
            .unwrap_err();
        assert!(matches!(err, CompileError::UnknownSymbol { .. }));
    }

    #[test]
    fn test_random_forbidden_outside_random_contexts() {
        let symbols = symbols();
        let compiler = ExpressionCompiler::new(ExpressionContext::Measure, &symbols);
        let err = compiler.compile(&Expr::Random(span())).unwrap_err();
        assert!(matches!(
            err,
            CompileError::IllegalCapability {
                construct: "random()",
                ..
            }
        ));
    }

    #[test]
    fn test_dt_only_in_time_update() {
        let symbols = symbols();
        let command = ExpressionCompiler::new(ExpressionContext::AgentCommand, &symbols);
        assert!(command.compile(&Expr::Dt(span())).is_err());

        let update = ExpressionCompiler::new(ExpressionContext::AgentTimeUpdate, &symbols);
        let f = update.compile(&Expr::Dt(span())).unwrap();
        let store = AgentStore::new(1);
        let mut ctx = EvalCtx::for_time_update(None, &store, 0.25);
        assert_eq!(f(&mut ctx), Value::Real(0.25));
    }

    #[test]
    fn test_incomparable_relation_is_compile_error() {
        let symbols = symbols();
        let compiler = ExpressionCompiler::new(ExpressionContext::AgentCommand, &symbols);
        let err = compiler
            .compile(&Expr::Relation {
                op: RelationOp::Lt,
                left: Box::new(Expr::True),
                right: Box::new(Expr::Integer(1)),
                span: span(),
            })
            .unwrap_err();
        match err {
            CompileError::IncomparableTypes { left, right, .. } => {
                assert_eq!(left, ValueType::Boolean);
                assert_eq!(right, ValueType::Integer);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_attribute_read_through_slot() {
        let symbols = symbols();
        let compiler = ExpressionCompiler::new(ExpressionContext::AgentCommand, &symbols);
        let f = compiler
            .compile(&Expr::Reference("x".into(), span()))
            .unwrap();
        let variable = symbols.variable("x").unwrap();
        let store = AgentStore::new(1).set(&variable, Value::Integer(7));
        let mut ctx = EvalCtx::for_agent(None, &store);
        assert_eq!(f(&mut ctx), Value::Integer(7));
    }

    #[test]
    fn test_uniform_sampling_stays_in_range() {
        let symbols = symbols();
        let compiler = ExpressionCompiler::new(ExpressionContext::AgentSojournTime, &symbols);
        let f = compiler
            .compile(&Expr::SampleUniform {
                from: Box::new(Expr::Real(2.0)),
                to: Box::new(Expr::Real(3.0)),
                span: span(),
            })
            .unwrap();
        let store = AgentStore::new(0);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let mut ctx = EvalCtx::for_agent(Some(&mut rng), &store);
            let Value::Real(v) = f(&mut ctx) else {
                panic!("expected real")
            };
            assert!((2.0..3.0).contains(&v));
        }
    }

    #[test]
    fn test_aggregate_requires_population_capability() {
        let symbols = symbols();
        let compiler = ExpressionCompiler::new(ExpressionContext::AgentCommand, &symbols);
        let err = compiler
            .compile(&Expr::Aggregate {
                op: AggregateOp::Count,
                expr: None,
                pattern: Pattern::Any(span()),
                span: span(),
            })
            .unwrap_err();
        assert!(matches!(err, CompileError::IllegalCapability { .. }));
    }

    #[test]
    fn test_builtin_arity_checked() {
        let symbols = symbols();
        let compiler = ExpressionCompiler::new(ExpressionContext::Constant, &symbols);
        let err = compiler
            .compile(&Expr::Call {
                function: Builtin::Atan2,
                args: vec![Expr::Real(1.0)],
                span: span(),
            })
            .unwrap_err();
        assert!(matches!(err, CompileError::FunctionArityMismatch { .. }));
    }
}
