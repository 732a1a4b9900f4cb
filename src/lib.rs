//! MURE — a compiler and discrete-event runtime for collective adaptive
//! systems.
//!
//! A declarative agent model arrives as parsed fragments ([`ast`]), is
//! compiled into closures under context-sensitive permission rules
//! ([`compiler`]), and runs as a population of replace-don't-mutate agents
//! advanced by a deterministic, probabilistically scheduled event loop
//! ([`simulation`]). The surface grammar, monitoring and reporting layers
//! are external collaborators.

pub mod agent;
pub mod ast;
pub mod compiler;
pub mod config;
pub mod error;
pub mod measure;
pub mod population;
pub mod simulation;
pub mod values;
pub mod variables;

// Re-exports
pub use agent::{
    AgentFactory, AgentId, AgentName, AgentPrototype, AgentStore, DefinitionError, LiveAgent,
    RuntimeError,
};
pub use ast::{Command, Expr, ModelDef, Pattern, Span, SpeciesDef};
pub use compiler::error::{CompileError, CompileErrors};
pub use compiler::{Model, ModelCompiler};
pub use config::SimulationConfig;
pub use error::{Error, InternalResult};
pub use measure::{Measure, Predicate};
pub use population::PopulationView;
pub use simulation::{run_replications, SimulationState, Trajectory, TrajectoryEvent};
pub use values::{Value, ValueType};
