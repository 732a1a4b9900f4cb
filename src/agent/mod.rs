//! The agent side of the runtime: memory, messages, the behavioural state
//! machine, species templates and the live instances the scheduler drives.

pub mod behaviour;
pub mod definitions;
pub mod message;
pub mod prototype;
pub mod runtime;
pub mod state;
pub mod store;

/// Identifies one agent instance within a trajectory.
pub type AgentId = usize;

pub use behaviour::{AgentBehaviour, AgentBehaviourBuilder};
pub use definitions::{AgentDefinitions, AgentName, DefinitionError};
pub use message::{AgentMessage, DeliveredMessage, MessageRepository, MessageTag, OutgoingMessage};
pub use prototype::{AgentFactory, AgentPrototype};
pub use runtime::{LiveAgent, RuntimeError};
pub use state::{AgentState, AgentStep, MessageHandler, StepCase, StepEffect, Transition};
pub use store::AgentStore;
