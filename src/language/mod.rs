pub mod ast;
pub mod builtins;
pub mod compile;
pub mod errors;
pub mod parser;
pub mod typecheck;
pub mod types;

pub use builtins::Builtins;
pub use compile::{compile, compile_document};
pub use errors::{CompileError, CompileResult};
pub use types::TypeNode;
