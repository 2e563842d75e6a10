//! Diagnostics for session and config files

use miette::{Diagnostic, NamedSource, SourceSpan};
use std::path::PathBuf;
use thiserror::Error;

/// Session file that does not parse, with source location
#[derive(Debug, Error, Diagnostic)]
#[error("invalid session file: {message}")]
#[diagnostic(code(qcheck::yaml::syntax))]
pub struct YamlSyntaxError {
    #[source_code]
    src: NamedSource<String>,

    #[label("here")]
    span: SourceSpan,

    #[help]
    help: Option<String>,

    message: String,
}

impl YamlSyntaxError {
    /// Build from a serde_yml error over `source`
    pub fn from_serde_error(err: &serde_yml::Error, source: &str, filename: &str) -> Self {
        let (line, column) = err
            .location()
            .map(|loc| (loc.line(), loc.column()))
            .unwrap_or((1, 1));
        let offset = line_col_to_offset(source, line, column);
        let message = err.to_string();

        Self {
            src: NamedSource::new(filename, source.to_string()),
            span: SourceSpan::from(offset..(offset + 1).min(source.len()).max(offset)),
            help: generate_help(&message),
            message,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors loading a session file
#[derive(Debug, Error, Diagnostic)]
pub enum YamlError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Syntax(#[from] YamlSyntaxError),

    #[error("cannot read {}: {source}", path.display())]
    #[diagnostic(code(qcheck::yaml::io))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Byte offset of a 1-based line/column position, clamped to the source
fn line_col_to_offset(source: &str, line: usize, column: usize) -> usize {
    let line_start = source
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum::<usize>();
    if line_start >= source.len() {
        return source.len().saturating_sub(1);
    }

    let line_text = source[line_start..].lines().next().unwrap_or("");
    let col = line_text
        .char_indices()
        .nth(column.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(line_text.len());
    line_start + col
}

/// Suggestions for common mistakes in session files
fn generate_help(message: &str) -> Option<String> {
    let msg = message.to_lowercase();

    if msg.contains("unknown variant") && msg.contains("simple") {
        return Some(
            "Measurement types are: boolean, simple, constant, composite, multchoice, string, scomposite, upload"
                .to_string(),
        );
    }

    if msg.contains("unknown variant") && msg.contains("absolute") {
        return Some("Tolerance types are: absolute, percent, multchoice".to_string());
    }

    if msg.contains("missing field `slug`") || msg.contains("missing field `id`") {
        return Some("Every measurement needs an id, a slug, a name, a category and a type".to_string());
    }

    if msg.contains("missing field `measurements`") {
        return Some("A session file lists its measurements under `measurements:`".to_string());
    }

    if msg.contains("tab") {
        return Some("YAML requires spaces for indentation, not tabs".to_string());
    }

    if msg.contains("duplicate key") {
        return Some("Each key can only appear once".to_string());
    }

    if msg.contains("mapping values are not allowed") {
        return Some("You may be missing a space after ':' or have incorrect indentation".to_string());
    }

    None
}
