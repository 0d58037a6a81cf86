//! Error types for configuration validation.

use thiserror::Error;
use validator::ValidationErrors;

/// Unified configuration error type.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Field-level validation failure.
    #[error("Invalid configuration:\n{}", format_validation_errors(.0))]
    Validation(#[source] ValidationErrors),

    /// Two failure events overlap on the same target; rejected at
    /// configuration time, never at runtime.
    #[error("overlapping failure events on target '{target}' at offsets {first_ms}ms and {second_ms}ms")]
    OverlappingFailures {
        target: String,
        first_ms: u64,
        second_ms: u64,
    },

    /// A scenario with nothing to emit.
    #[error("scenario '{0}' declares no sensor population")]
    EmptyScenario(String),
}

fn format_validation_errors(errors: &ValidationErrors) -> String {
    use std::fmt::Write;

    let mut output = String::new();
    for (field, errors) in errors.field_errors() {
        let _ = writeln!(output, "Field '{}':", field);
        for error in errors {
            let message = match &error.message {
                Some(msg) => msg.to_string(),
                None => error.code.to_string(),
            };
            let _ = writeln!(output, "  - {}", message);
        }
    }
    output
}

impl From<ValidationErrors> for ConfigError {
    fn from(errors: ValidationErrors) -> Self {
        ConfigError::Validation(errors)
    }
}
