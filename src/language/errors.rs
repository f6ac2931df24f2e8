use crate::error::SynthError;
use miette::Diagnostic;
use thiserror::Error;

pub type CompileResult<T> = Result<T, CompileError>;

/// Errors raised while turning an input document into a graph. `context`
/// names the block, chunk or declaration the error was found in.
#[derive(Debug, Error, Diagnostic)]
pub enum CompileError {
    #[error("malformed document: {message}")]
    Document {
        message: String,
        line: usize,
        column: usize,
    },
    #[error("invalid type `{text}` in {context}: {message}")]
    Type {
        text: String,
        message: String,
        context: String,
    },
    #[error("unknown variable `{name}` in {context}")]
    UnknownVariable { name: String, context: String },
    #[error("call to undeclared block `{name}` in {context}")]
    UnknownBlock { name: String, context: String },
    #[error("`{name}` is declared more than once in {context}")]
    Duplicate { name: String, context: String },
    #[error("type error in {context}: {message}")]
    Mismatch { message: String, context: String },
    #[error("invalid graph in {context}: {source}")]
    Graph {
        context: String,
        #[source]
        source: SynthError,
    },
}

impl CompileError {
    pub fn mismatch(context: &str, message: impl Into<String>) -> Self {
        CompileError::Mismatch {
            message: message.into(),
            context: context.to_string(),
        }
    }

    /// 1-based line and column for document syntax errors.
    pub fn location(&self) -> Option<(usize, usize)> {
        match self {
            CompileError::Document { line, column, .. } => Some((*line, *column)),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CompileError {
    fn from(err: serde_json::Error) -> Self {
        CompileError::Document {
            message: err.to_string(),
            line: err.line(),
            column: err.column(),
        }
    }
}
