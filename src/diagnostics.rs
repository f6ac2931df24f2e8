use crate::{error::SynthError, language::CompileError, project::ManifestError};
use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(vulnsynth::document))]
pub struct DocumentDiagnostic {
    #[source_code]
    src: NamedSource,
    #[label("{label}")]
    span: SourceSpan,
    #[help]
    help: Option<String>,
    message: String,
    label: String,
}

impl DocumentDiagnostic {
    pub fn new(path: &Path, source: &str, message: &str, line: usize, column: usize) -> Self {
        let offset = line_column_offset(source, line, column);
        let len = usize::from(offset < source.len());
        Self {
            src: NamedSource::new(path.display().to_string(), source.to_string()),
            span: (offset, len).into(),
            help: Some("the input must be a vulnsynth JSON program description".into()),
            message: message.to_string(),
            label: "here".into(),
        }
    }
}

/// Byte offset of a 1-based line/column pair, clamped to the source.
pub fn line_column_offset(source: &str, line: usize, column: usize) -> usize {
    let mut offset = 0;
    for (idx, text) in source.split_inclusive('\n').enumerate() {
        if idx + 1 == line {
            let column = column.saturating_sub(1).min(text.len());
            return (offset + column).min(source.len());
        }
        offset += text.len();
    }
    source.len()
}

pub fn compile_report(path: &Path, source: &str, error: CompileError) -> Report {
    match &error {
        CompileError::Document {
            message,
            line,
            column,
        } => Report::new(DocumentDiagnostic::new(path, source, message, *line, *column)),
        _ => Report::new(error).wrap_err(format!("failed to compile {}", path.display())),
    }
}

pub fn synth_report(path: &Path, error: SynthError) -> Report {
    Report::new(error).wrap_err(format!("failed to synthesize {}", path.display()))
}

pub fn manifest_report(error: ManifestError) -> Report {
    Report::new(error)
}

pub fn io_report(path: &Path, error: std::io::Error) -> Report {
    Report::msg(format!("failed to access {}: {error}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_follow_lines_and_columns() {
        let source = "{\n  \"a\": 1,\n  oops\n}";
        assert_eq!(line_column_offset(source, 1, 1), 0);
        assert_eq!(&source[line_column_offset(source, 3, 3)..][..4], "oops");
        assert_eq!(line_column_offset(source, 9, 1), source.len());
    }

    #[test]
    fn document_errors_keep_the_parser_message() {
        let source = "{\"blocks\": [}";
        let error = serde_json::from_str::<crate::language::ast::Document>(source)
            .map_err(CompileError::from)
            .expect_err("syntax error");
        let report = compile_report(Path::new("input.json"), source, error);
        assert!(report.to_string().contains("line 1"));
    }
}
