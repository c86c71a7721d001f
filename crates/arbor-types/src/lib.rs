//! Node tree, values, addresses, and errors shared by all Arbor crates.
//!
//! This crate provides the foundational types the rest of the workspace builds on:
//! - `ArborError`: unified error taxonomy
//! - `Tree` / `NodeId`: arena of owned nodes addressed by generational handles
//! - `Value`: the tagged union a node carries as its value
//! - `Address`: a node's position as sibling indices from its tree root

mod address;
mod tree;
mod value;

pub use address::Address;
pub use tree::{NodeId, Tree};
pub use value::{format_duration, parse_duration, Value, TYPE_TAGS};

/// Unified error type for all Arbor subsystems.
#[derive(Debug, thiserror::Error)]
pub enum ArborError {
    // === Expression / Statement Errors ===
    #[error("Syntax error near '{near}': {message}")]
    Syntax { near: String, message: String },

    // === Tree Errors ===
    #[error("Address error: {0}")]
    Address(String),

    // === Evaluation Errors ===
    #[error("Evaluation error in [{statement}]: {message}")]
    Evaluation { statement: String, message: String },

    /// Raised by the `throw` statement; `catch` reads the message back.
    #[error("{message}")]
    Thrown { message: String },

    // === Codec Errors ===
    #[error("Hyperlisp parse error at line {line}, col {col}: {message}")]
    Parse {
        line: usize,
        col: usize,
        message: String,
        source_snippet: Option<String>,
    },

    #[error("Invalid {type_name} literal '{literal}'")]
    InvalidLiteral { type_name: String, literal: String },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ArborError {
    pub fn syntax(near: impl Into<String>, message: impl Into<String>) -> Self {
        ArborError::Syntax {
            near: near.into(),
            message: message.into(),
        }
    }

    pub fn address(message: impl Into<String>) -> Self {
        ArborError::Address(message.into())
    }

    pub fn evaluation(statement: impl Into<String>, message: impl Into<String>) -> Self {
        ArborError::Evaluation {
            statement: statement.into(),
            message: message.into(),
        }
    }

    pub fn thrown(message: impl Into<String>) -> Self {
        ArborError::Thrown {
            message: message.into(),
        }
    }

    /// Returns `true` for malformed expressions and unsupported statement shapes.
    pub fn is_syntax(&self) -> bool {
        matches!(self, ArborError::Syntax { .. })
    }

    /// Returns `true` when an address or ancestor walk exceeded the tree.
    pub fn is_address(&self) -> bool {
        matches!(self, ArborError::Address(_))
    }

    /// Returns `true` for comparisons between values that cannot be coerced.
    pub fn is_evaluation(&self) -> bool {
        matches!(self, ArborError::Evaluation { .. })
    }

    /// Stable lowercase label, used by the CLI when reporting failures.
    pub fn category(&self) -> &'static str {
        match self {
            ArborError::Syntax { .. } => "syntax",
            ArborError::Address(_) => "address",
            ArborError::Evaluation { .. } => "evaluation",
            ArborError::Thrown { .. } => "thrown",
            ArborError::Parse { .. } | ArborError::InvalidLiteral { .. } => "parse",
            ArborError::Io(_) => "io",
            ArborError::Json(_) => "json",
            ArborError::Other(_) => "other",
        }
    }
}

/// A convenience alias for `Result<T, ArborError>`.
pub type Result<T> = std::result::Result<T, ArborError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_syntax() {
        let err = ArborError::syntax("@/foo?bar", "unknown type pivot 'bar'");
        assert_eq!(
            err.to_string(),
            "Syntax error near '@/foo?bar': unknown type pivot 'bar'"
        );
    }

    #[test]
    fn error_display_address() {
        let err = ArborError::address("index 4 out of range at 0-4");
        assert_eq!(err.to_string(), "Address error: index 4 out of range at 0-4");
    }

    #[test]
    fn error_display_evaluation() {
        let err = ArborError::evaluation("if", "cannot compare int with guid");
        assert_eq!(
            err.to_string(),
            "Evaluation error in [if]: cannot compare int with guid"
        );
    }

    #[test]
    fn error_display_parse_error() {
        let err = ArborError::Parse {
            line: 3,
            col: 1,
            message: "odd indentation".into(),
            source_snippet: Some(" foo".into()),
        };
        assert_eq!(
            err.to_string(),
            "Hyperlisp parse error at line 3, col 1: odd indentation"
        );
    }

    #[test]
    fn error_display_invalid_literal() {
        let err = ArborError::InvalidLiteral {
            type_name: "int".into(),
            literal: "five".into(),
        };
        assert_eq!(err.to_string(), "Invalid int literal 'five'");
    }

    #[test]
    fn error_display_thrown_is_the_bare_message() {
        assert_eq!(ArborError::thrown("out of stock").to_string(), "out of stock");
    }

    #[test]
    fn classification_helpers() {
        assert!(ArborError::syntax("x", "y").is_syntax());
        assert!(ArborError::address("x").is_address());
        assert!(ArborError::evaluation("x", "y").is_evaluation());
        assert!(!ArborError::Other("x".into()).is_syntax());
    }

    #[test]
    fn categories_are_stable() {
        assert_eq!(ArborError::syntax("a", "b").category(), "syntax");
        assert_eq!(ArborError::address("a").category(), "address");
        assert_eq!(ArborError::evaluation("a", "b").category(), "evaluation");
        assert_eq!(ArborError::thrown("a").category(), "thrown");
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(ArborError::from(io).category(), "io");
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: ArborError = io.into();
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn json_error_converts() {
        let bad: std::result::Result<serde_json::Value, _> = serde_json::from_str("{bad");
        let err: ArborError = bad.unwrap_err().into();
        assert!(err.to_string().starts_with("JSON error:"));
    }
}
