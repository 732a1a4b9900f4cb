use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use crate::agent::definitions::AgentName;
use crate::agent::store::AgentStore;
use crate::agent::AgentId;
use crate::compiler::pattern::AgentPattern;
use crate::values::{Value, ValueType};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MessageError {
    #[error("Message tag already registered: {0}")]
    AlreadyRegistered(String),
    #[error("Unknown message tag: {0}")]
    UnknownTag(String),
}

/// An interned message tag: dense id, label and declared payload types.
/// The arity check of `send` compares against `payload.len()`.
#[derive(Debug)]
pub struct MessageTag {
    id: usize,
    name: Arc<str>,
    payload: Vec<ValueType>,
}

impl MessageTag {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.payload.len()
    }

    pub fn payload(&self) -> &[ValueType] {
        &self.payload
    }
}

impl PartialEq for MessageTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MessageTag {}

/// メッセージタグのレジストリ
///
/// Tags are registered once while the model compiles and are immutable
/// afterwards; lookups during compilation are by name, at runtime by the
/// pre-resolved `Arc<MessageTag>` handle.
#[derive(Default)]
pub struct MessageRepository {
    tags: DashMap<String, Arc<MessageTag>>,
}

impl MessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, payload: Vec<ValueType>) -> Result<Arc<MessageTag>, MessageError> {
        if self.tags.contains_key(name) {
            return Err(MessageError::AlreadyRegistered(name.to_string()));
        }
        let tag = Arc::new(MessageTag {
            id: self.tags.len(),
            name: Arc::from(name),
            payload,
        });
        self.tags.insert(name.to_string(), tag.clone());
        Ok(tag)
    }

    pub fn get(&self, name: &str) -> Option<Arc<MessageTag>> {
        self.tags.get(name).map(|entry| entry.value().clone())
    }
}

/// A message value: tag plus fixed-arity content. Equality is tag id plus
/// content equality.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentMessage {
    pub tag: Arc<MessageTag>,
    pub content: Vec<Value>,
}

/// A message emitted by a step or handler, not yet routed. The target
/// pattern is resolved against the live population by the external router;
/// the sender's store snapshot is the ambient context of that match.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub message: AgentMessage,
    pub sender_store: AgentStore,
    pub target: AgentPattern,
    /// Absolute simulated time at which the message reaches its targets.
    pub delivery_time: f64,
}

/// A routed message sitting in one agent's inbox. Carries the sender's
/// identity and store snapshot so handler sender-patterns can match.
#[derive(Debug, Clone)]
pub struct DeliveredMessage {
    pub sender_id: AgentId,
    pub sender_species: AgentName,
    pub sender_store: AgentStore,
    pub message: AgentMessage,
    pub time: f64,
}
