//! Error types for table lenses, conditions and formulas.

use thiserror::Error;

/// Failure raised by an injected script environment.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}{}", suggestion_suffix(.suggestion))]
pub struct ScriptError {
    pub message: String,
    /// Human-readable hint for fixing the expression, when the engine has one
    pub suggestion: Option<String>,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        ScriptError {
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        ScriptError {
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LensError {
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Condition parse error at {position}: {message}")]
    ConditionParse { position: usize, message: String },

    #[error("Unknown formula: {0}")]
    UnknownFormula(String),

    #[error("Invalid formula: {0}")]
    FormulaConstruction(String),

    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    #[error("Index {index} out of range [0, {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    suggestion.as_ref().map(|s| format!(" ({})", s)).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, LensError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_error_display_includes_suggestion() {
        let err = ScriptError::with_suggestion("undefined: foo", "did you mean 'food'?");
        assert_eq!(err.to_string(), "undefined: foo (did you mean 'food'?)");
        assert_eq!(ScriptError::new("boom").to_string(), "boom");
    }

    #[test]
    fn test_script_error_converts() {
        let err: LensError = ScriptError::new("boom").into();
        assert_eq!(err.to_string(), "Script error: boom");
    }
}
