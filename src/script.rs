//! Injected script evaluation.
//!
//! Expression operands of conditions are evaluated through a `ScriptEnv`
//! supplied by the caller. The crate ships no engine of its own.

use crate::error::{LensError, Result, ScriptError};
use crate::value::CellValue;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Named values visible to a script
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableScope {
    vars: FxHashMap<String, CellValue>,
}

impl VariableScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<CellValue>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&CellValue> {
        self.vars.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<CellValue> {
        self.vars.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Evaluates an expression to a value.
pub trait ScriptEnv: Send + Sync {
    fn evaluate(&self, expr: &str, scope: &VariableScope) -> std::result::Result<CellValue, ScriptError>;
}

impl<F> ScriptEnv for F
where
    F: Fn(&str, &VariableScope) -> std::result::Result<CellValue, ScriptError> + Send + Sync,
{
    fn evaluate(&self, expr: &str, scope: &VariableScope) -> std::result::Result<CellValue, ScriptError> {
        self(expr, scope)
    }
}

/// How script failures are treated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptContext {
    /// Log failures and continue with a null value instead of failing
    pub tolerant: bool,
    /// Variables passed to every evaluation
    pub scope: VariableScope,
}

impl ScriptContext {
    pub fn tolerant() -> Self {
        ScriptContext {
            tolerant: true,
            scope: VariableScope::new(),
        }
    }

    pub fn with_scope(mut self, scope: VariableScope) -> Self {
        self.scope = scope;
        self
    }

    /// Evaluate `expr`. Without an environment the expression cannot run,
    /// which counts as a failure.
    pub fn evaluate(&self, env: Option<&dyn ScriptEnv>, expr: &str) -> Result<CellValue> {
        let outcome = match env {
            Some(env) => env.evaluate(expr, &self.scope),
            None => Err(ScriptError::with_suggestion(
                format!("cannot evaluate `{}`", expr),
                "no script environment was supplied",
            )),
        };

        match outcome {
            Ok(value) => Ok(value),
            Err(err) if self.tolerant => {
                log::warn!("script `{}` failed, using null: {}", expr, err);
                Ok(CellValue::Null)
            }
            Err(err) => {
                log::error!("script `{}` failed: {}", expr, err);
                Err(LensError::Script(err))
            }
        }
    }
}
