//! Source transformation subsystem.
//!
//! # Data Flow
//! ```text
//! src query value
//!     → swc.rs (parse as ES module, collect diagnostics)
//!     → lower.rs (rewrite import/export, wrap in IIFE or CommonJS shell)
//!     → swc.rs (print with the swc code generator)
//!     → bytes written as the response body
//! ```
//!
//! Parsing and printing belong to swc; this module owns only the lowering of
//! module syntax into the requested output format.

pub mod error;
pub mod lower;
pub mod swc;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use error::{Diagnostic, TransformError};
pub use swc::SwcTransformer;

/// Global identifier the IIFE result is assigned to by default.
pub const DEFAULT_GLOBAL_NAME: &str = "exports";

/// Output module format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// `var <global> = (() => { ... })();`
    #[default]
    Iife,
    /// Top-level statements with the namespace assigned to `module.exports`.
    Cjs,
    /// Module syntax preserved.
    Esm,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Iife => "iife",
            Format::Cjs => "cjs",
            Format::Esm => "esm",
        };
        f.write_str(name)
    }
}

/// Options passed to every transform call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOptions {
    pub format: Format,
    /// Identifier (or dotted path) receiving the IIFE result. Empty means the
    /// IIFE is emitted as a bare expression statement.
    pub global_name: String,
    /// Strip insignificant whitespace from the printed output.
    pub minify: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            format: Format::Iife,
            global_name: DEFAULT_GLOBAL_NAME.to_string(),
            minify: false,
        }
    }
}

/// A code transformation capability.
///
/// Implementations must be deterministic: the same source and options always
/// produce byte-identical output.
pub trait Transformer: Send + Sync + 'static {
    fn transform(&self, source: &str, options: &TransformOptions) -> Result<Vec<u8>, TransformError>;
}

const RESERVED_WORDS: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "implements", "import", "in", "instanceof", "interface", "let", "new", "null",
    "package", "private", "protected", "public", "return", "static", "super", "switch", "this",
    "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Returns true if `name` can be used as a binding identifier.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let starts = first == '_' || first == '$' || first.is_alphabetic();
    starts
        && chars.all(|c| c == '_' || c == '$' || c.is_alphanumeric())
        && !RESERVED_WORDS.contains(&name)
}

/// Returns true if `name` is empty or a dot-separated path of identifiers.
pub fn is_valid_global_name(name: &str) -> bool {
    name.is_empty() || name.split('.').all(is_identifier)
}
