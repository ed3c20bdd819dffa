//! Shared types, errors, and schema contracts for the brick runtime.
//!
//! This crate provides the foundational types used by the runtime and the CLI:
//! - `BrickError`: unified error taxonomy
//! - `ErrorKind`: the five failure categories callers branch on
//! - `Schema`: declarative input/output contract of a brick
//! - `validate`: structural validation of a value against a `Schema`

pub mod schema;

pub use schema::{validate, Schema, ValidationResult, Violation};

/// Unified error type for all brick runtime subsystems.
#[derive(Debug, thiserror::Error)]
pub enum BrickError {
    // === Configuration Errors ===
    #[error("Brick '{brick_id}' has invalid property '{property}': {message}")]
    Configuration {
        brick_id: String,
        property: String,
        message: String,
    },

    #[error("Brick '{brick_id}' is not registered")]
    NotFound { brick_id: String },

    #[error("Invalid expression '{expression}': {message}")]
    Expression { expression: String, message: String },

    #[error("Invalid pipeline definition: {0}")]
    Definition(String),

    #[error("Pipeline nesting exceeded the limit of {limit} levels")]
    DepthExceeded { limit: usize },

    // === Input Validation ===
    #[error("Invalid input for brick '{brick_id}': {}", summarize(.violations))]
    InputValidation {
        brick_id: String,
        violations: Vec<Violation>,
        config: serde_json::Value,
        schema: Box<Schema>,
    },

    // === Business Errors ===
    #[error("{message}")]
    Business {
        brick_id: Option<String>,
        message: String,
    },

    #[error("Pipeline cancelled: {message}")]
    Cancelled {
        brick_id: Option<String>,
        message: String,
    },

    // === Unexpected ===
    #[error("Unexpected error{}: {message}", brick_suffix(.brick_id))]
    Unexpected {
        brick_id: Option<String>,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// The failure categories a caller branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    InputValidation,
    Business,
    Cancel,
    Unexpected,
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn brick_suffix(brick_id: &Option<String>) -> String {
    match brick_id {
        Some(id) => format!(" in brick '{id}'"),
        None => String::new(),
    }
}

impl BrickError {
    /// Build a business error raised by brick behavior.
    pub fn business(message: impl Into<String>) -> Self {
        BrickError::Business {
            brick_id: None,
            message: message.into(),
        }
    }

    /// Build a cancellation raised by brick behavior.
    pub fn cancelled(message: impl Into<String>) -> Self {
        BrickError::Cancelled {
            brick_id: None,
            message: message.into(),
        }
    }

    /// Build an unexpected error, e.g. from a library call that failed.
    pub fn unexpected(message: impl Into<String>) -> Self {
        BrickError::Unexpected {
            brick_id: None,
            message: message.into(),
        }
    }

    /// Map the error onto its failure category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrickError::Configuration { .. }
            | BrickError::NotFound { .. }
            | BrickError::Expression { .. }
            | BrickError::Definition(_)
            | BrickError::DepthExceeded { .. } => ErrorKind::Configuration,
            BrickError::InputValidation { .. } => ErrorKind::InputValidation,
            BrickError::Business { .. } => ErrorKind::Business,
            BrickError::Cancelled { .. } => ErrorKind::Cancel,
            BrickError::Unexpected { .. }
            | BrickError::Io(_)
            | BrickError::Json(_)
            | BrickError::Yaml(_) => ErrorKind::Unexpected,
        }
    }

    /// Returns `true` if the run was stopped on purpose rather than failing.
    pub fn is_cancel(&self) -> bool {
        self.kind() == ErrorKind::Cancel
    }

    /// Returns `true` for user-meaningful failures, cancellation included.
    pub fn is_business(&self) -> bool {
        matches!(self.kind(), ErrorKind::Business | ErrorKind::Cancel)
    }

    /// Attach the failing brick id to business, cancel, and unexpected errors
    /// that were raised without one. Other variants already carry it.
    pub fn with_brick(self, id: &str) -> Self {
        match self {
            BrickError::Business {
                brick_id: None,
                message,
            } => BrickError::Business {
                brick_id: Some(id.to_string()),
                message,
            },
            BrickError::Cancelled {
                brick_id: None,
                message,
            } => BrickError::Cancelled {
                brick_id: Some(id.to_string()),
                message,
            },
            BrickError::Unexpected {
                brick_id: None,
                message,
            } => BrickError::Unexpected {
                brick_id: Some(id.to_string()),
                message,
            },
            BrickError::Io(e) => BrickError::Unexpected {
                brick_id: Some(id.to_string()),
                message: e.to_string(),
            },
            BrickError::Json(e) => BrickError::Unexpected {
                brick_id: Some(id.to_string()),
                message: e.to_string(),
            },
            other => other,
        }
    }

    /// The brick the error is attributed to, when known.
    pub fn brick_id(&self) -> Option<&str> {
        match self {
            BrickError::Configuration { brick_id, .. }
            | BrickError::NotFound { brick_id }
            | BrickError::InputValidation { brick_id, .. } => Some(brick_id),
            BrickError::Business { brick_id, .. }
            | BrickError::Cancelled { brick_id, .. }
            | BrickError::Unexpected { brick_id, .. } => brick_id.as_deref(),
            _ => None,
        }
    }
}

/// A convenience alias for `Result<T, BrickError>`.
pub type Result<T> = std::result::Result<T, BrickError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_configuration() {
        let err = BrickError::Configuration {
            brick_id: "@brick/dom/add-class".into(),
            property: "root".into(),
            message: "selector is required when not root-aware".into(),
        };
        assert_eq!(
            err.to_string(),
            "Brick '@brick/dom/add-class' has invalid property 'root': selector is required when not root-aware"
        );
    }

    #[test]
    fn error_display_not_found() {
        let err = BrickError::NotFound {
            brick_id: "@acme/missing".into(),
        };
        assert_eq!(err.to_string(), "Brick '@acme/missing' is not registered");
    }

    #[test]
    fn error_display_input_validation_lists_violations() {
        let err = BrickError::InputValidation {
            brick_id: "@brick/map".into(),
            violations: vec![
                Violation::new("/elements", "is required"),
                Violation::new("/elementKey", "expected string, found number"),
            ],
            config: serde_json::json!({}),
            schema: Box::new(Schema::Any),
        };
        assert_eq!(
            err.to_string(),
            "Invalid input for brick '@brick/map': /elements: is required; /elementKey: expected string, found number"
        );
    }

    #[test]
    fn error_display_unexpected_with_and_without_brick() {
        let err = BrickError::unexpected("boom");
        assert_eq!(err.to_string(), "Unexpected error: boom");
        let err = err.with_brick("@acme/fetch");
        assert_eq!(err.to_string(), "Unexpected error in brick '@acme/fetch': boom");
    }

    #[test]
    fn error_display_cancelled() {
        let err = BrickError::cancelled("user stopped");
        assert_eq!(err.to_string(), "Pipeline cancelled: user stopped");
    }

    // --- kind ---

    #[test]
    fn kind_maps_configuration_family() {
        assert_eq!(
            BrickError::NotFound { brick_id: "x".into() }.kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            BrickError::Expression {
                expression: "{{".into(),
                message: "unterminated".into()
            }
            .kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            BrickError::Definition("expected a list".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            BrickError::DepthExceeded { limit: 3 }.kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn kind_maps_library_errors_to_unexpected() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: BrickError = json_err.into();
        assert_eq!(err.kind(), ErrorKind::Unexpected);

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: BrickError = io_err.into();
        assert_eq!(err.kind(), ErrorKind::Unexpected);
    }

    #[test]
    fn cancel_is_a_business_subtype() {
        let err = BrickError::cancelled("stop");
        assert!(err.is_cancel());
        assert!(err.is_business());

        let err = BrickError::business("bad file");
        assert!(!err.is_cancel());
        assert!(err.is_business());

        let err = BrickError::unexpected("bug");
        assert!(!err.is_cancel());
        assert!(!err.is_business());
    }

    // --- with_brick ---

    #[test]
    fn with_brick_fills_missing_id_only() {
        let err = BrickError::business("bad").with_brick("@a/b");
        assert_eq!(err.brick_id(), Some("@a/b"));

        let err = BrickError::Business {
            brick_id: Some("@inner".into()),
            message: "bad".into(),
        }
        .with_brick("@outer");
        assert_eq!(err.brick_id(), Some("@inner"));
    }

    #[test]
    fn with_brick_converts_json_errors_to_unexpected() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = BrickError::from(json_err).with_brick("@acme/parse");
        assert!(matches!(err, BrickError::Unexpected { .. }));
        assert_eq!(err.brick_id(), Some("@acme/parse"));
    }

    // --- Result alias ---

    #[test]
    fn result_alias_err() {
        fn example() -> Result<()> {
            Err(BrickError::business("fail"))
        }
        assert!(example().is_err());
    }
}
