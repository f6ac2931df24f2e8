use miette::Diagnostic;
use thiserror::Error;

pub type SynthResult<T> = Result<T, SynthError>;

/// Invariant violations raised while lowering a graph. None of these are
/// recoverable: the synthesis run that hits one produces no output.
#[derive(Debug, Error, Diagnostic)]
pub enum SynthError {
    #[error("chunk constraint cannot be both local and global")]
    ConstraintConflict,
    #[error("duplicate block `{name}`")]
    DuplicateBlock { name: String },
    #[error("call to unknown block `{name}`")]
    UnknownBlock { name: String },
    #[error("call to `{name}` points at a stale block instance")]
    DivergentCall { name: String },
    #[error("block `{name}` is neither a function nor inlined")]
    UninterpretedBlock { name: String },
    #[error("inline block `{name}` expands into itself")]
    RecursiveInline { name: String },
    #[error("cannot join captures `{left}` and `{right}` of `{variable}`")]
    IncompatibleCapture {
        variable: String,
        left: String,
        right: String,
    },
    #[error("no usage of `{variable}` found below `{block}`")]
    MissingCapture { variable: String, block: String },
    #[error("`{block}` cannot pass `{variable}`: no capture recorded and not declared there")]
    UnresolvedArgument { variable: String, block: String },
    #[error("cannot derive a parameter type for `{variable}`: {message}")]
    ParameterType { variable: String, message: String },
    #[error("decoy asset `{name}` is invalid: {message}")]
    DecoyAsset { name: String, message: String },
}
