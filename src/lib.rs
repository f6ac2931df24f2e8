#![allow(clippy::collapsible_if)]

pub mod codegen;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod interpret;
pub mod language;
pub mod pipeline;
pub mod project;

pub use error::{SynthError, SynthResult};
pub use pipeline::{SynthOptions, Synthesizer, Variant};
