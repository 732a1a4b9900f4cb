use core::fmt;

use thiserror::Error;

use crate::ast::Span;
use crate::compiler::context::ExpressionContext;
use crate::values::ValueType;

/// Error type for model compilation
///
/// Every variant carries the span the parser recorded for the offending
/// fragment. Compilation keeps going after an error wherever it can, so a
/// single bad model surfaces as many diagnostics as possible in one pass.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("{span}: duplicate name: {name}")]
    DuplicateName { name: String, span: Span },

    #[error("{span}: unknown symbol: {name}")]
    UnknownSymbol { name: String, span: Span },

    #[error("{span}: unknown species: {name}")]
    UnknownSpecies { name: String, span: Span },

    #[error("{span}: unknown state: {name}")]
    UnknownState { name: String, span: Span },

    #[error("{span}: unknown message tag: {name}")]
    UnknownTag { name: String, span: Span },

    #[error("{span}: message {tag} expects {expected} elements, found {actual}")]
    ArityMismatch {
        tag: String,
        expected: usize,
        actual: usize,
        span: Span,
    },

    #[error("{span}: {function} expects {expected} arguments, found {actual}")]
    FunctionArityMismatch {
        function: String,
        expected: usize,
        actual: usize,
        span: Span,
    },

    #[error("{span}: {construct} is not allowed in {context} context")]
    IllegalCapability {
        construct: &'static str,
        context: ExpressionContext,
        span: Span,
    },

    #[error("{span}: expected {expected}, found {found}")]
    TypeMismatch {
        expected: ValueType,
        found: ValueType,
        span: Span,
    },

    #[error("{span}: values of type {left} and {right} are not comparable")]
    IncomparableTypes {
        left: ValueType,
        right: ValueType,
        span: Span,
    },

    #[error("{span}: {name} is not an assignable attribute or view")]
    NotAssignable { name: String, span: Span },

    #[error("{span}: species {species} has no initial state")]
    MissingInitialState { species: String, span: Span },

    #[error("{span}: species {species} flags more than one initial state ({first} and {second})")]
    DuplicateInitialState {
        species: String,
        first: String,
        second: String,
        span: Span,
    },

    #[error("{span}: handler for {tag} binds {actual} captures, tag carries {expected}")]
    CaptureArityMismatch {
        tag: String,
        expected: usize,
        actual: usize,
        span: Span,
    },
}

impl CompileError {
    pub fn span(&self) -> Span {
        match self {
            CompileError::DuplicateName { span, .. }
            | CompileError::UnknownSymbol { span, .. }
            | CompileError::UnknownSpecies { span, .. }
            | CompileError::UnknownState { span, .. }
            | CompileError::UnknownTag { span, .. }
            | CompileError::ArityMismatch { span, .. }
            | CompileError::FunctionArityMismatch { span, .. }
            | CompileError::IllegalCapability { span, .. }
            | CompileError::TypeMismatch { span, .. }
            | CompileError::IncomparableTypes { span, .. }
            | CompileError::NotAssignable { span, .. }
            | CompileError::MissingInitialState { span, .. }
            | CompileError::DuplicateInitialState { span, .. }
            | CompileError::CaptureArityMismatch { span, .. } => *span,
        }
    }
}

/// The non-empty list of diagnostics a failed compilation returns.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileErrors {
    pub errors: Vec<CompileError>,
}

impl std::error::Error for CompileErrors {}

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "model compilation failed with {} error(s):", self.errors.len())?;
        for error in &self.errors {
            writeln!(f, "  {}", error)?;
        }
        Ok(())
    }
}

impl From<CompileError> for CompileErrors {
    fn from(error: CompileError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Collects diagnostics across declarations so compilation can report them
/// all at once.
#[derive(Debug, Default)]
pub struct ErrorReporter {
    errors: Vec<CompileError>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, error: CompileError) {
        self.errors.push(error);
    }

    /// Unwraps a per-declaration result, recording the error and yielding
    /// `None` so the caller can continue with its siblings.
    pub fn record<T>(&mut self, result: CompileResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.report(error);
                None
            }
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Converts the collected diagnostics into the final outcome.
    pub fn finish<T>(self, value: T) -> Result<T, CompileErrors> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(CompileErrors {
                errors: self.errors,
            })
        }
    }
}
