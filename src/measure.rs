use core::fmt;

use crate::compiler::expression::{EvalCtx, EvalFn};
use crate::population::PopulationView;
use crate::values::Value;

/// A named scalar observation over the population, exported as a plain
/// closure for the monitoring and reporting layers. An evaluation that
/// hits missing data yields [`Value::Error`]; consumers treat it as "no
/// data", never as a fault.
#[derive(Clone)]
pub struct Measure {
    name: String,
    eval: EvalFn,
}

impl Measure {
    pub(crate) fn new(name: &str, eval: EvalFn) -> Self {
        Self {
            name: name.to_string(),
            eval,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn eval(&self, population: &dyn PopulationView, now: f64) -> Value {
        let mut ctx = EvalCtx::for_population(population, now);
        (self.eval)(&mut ctx)
    }
}

impl fmt::Debug for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Measure({})", self.name)
    }
}

/// A named boolean observation over the population.
#[derive(Clone)]
pub struct Predicate {
    name: String,
    eval: EvalFn,
}

impl Predicate {
    pub(crate) fn new(name: &str, eval: EvalFn) -> Self {
        Self {
            name: name.to_string(),
            eval,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `false` when the underlying expression evaluates to Error.
    pub fn holds(&self, population: &dyn PopulationView, now: f64) -> bool {
        let mut ctx = EvalCtx::for_population(population, now);
        (self.eval)(&mut ctx).boolean_of()
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate({})", self.name)
    }
}
