//! Transform error definitions.

use std::fmt;

use thiserror::Error;

/// File name used when rendering diagnostics; the source never touches disk.
pub const STDIN_NAME: &str = "<stdin>";

/// A single problem reported while parsing the submitted source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 1-based line.
    pub line: usize,
    /// 1-based column, counted in characters.
    pub column: usize,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: error: {}",
            STDIN_NAME, self.line, self.column, self.message
        )
    }
}

/// Errors that can occur while transforming a source text.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The source did not parse.
    #[error("{} syntax error(s) in source", .0.len())]
    Syntax(Vec<Diagnostic>),

    /// Brackets nest deeper than the transformer accepts.
    #[error("{0}")]
    TooDeep(Diagnostic),

    /// The module uses a construct the selected output format cannot express.
    #[error("unsupported construct: {0}")]
    Unsupported(String),

    /// Printing the transformed program failed.
    #[error("code generation failed: {0}")]
    Emit(#[from] std::io::Error),

    /// Internal invariant broken (e.g. wrapper template shape changed).
    #[error("internal transform error: {0}")]
    Internal(String),
}

impl TransformError {
    /// Render the error as the plain-text body sent back to the caller.
    pub fn report(&self) -> String {
        match self {
            TransformError::Syntax(diagnostics) => {
                let mut out = String::new();
                for diagnostic in diagnostics {
                    out.push_str(&diagnostic.to_string());
                    out.push('\n');
                }
                out
            }
            TransformError::TooDeep(diagnostic) => format!("{}\n", diagnostic),
            other => format!("{}: error: {}\n", STDIN_NAME, other),
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TransformError::Syntax(_) => "syntax_error",
            TransformError::TooDeep(_) => "too_deep",
            TransformError::Unsupported(_) => "unsupported",
            TransformError::Emit(_) | TransformError::Internal(_) => "internal_error",
        }
    }
}
