use thiserror::Error;

use crate::agent::definitions::DefinitionError;
use crate::agent::message::MessageError;
use crate::agent::runtime::RuntimeError;
use crate::compiler::error::CompileErrors;
use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Compile error: {0}")]
    Compile(#[from] CompileErrors),
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),
    #[error("Message error: {0}")]
    Message(#[from] MessageError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

// エラー作成用のヘルパー関数
impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
