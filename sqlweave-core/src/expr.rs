//! Expression evaluation and value conversion seams
//!
//! sqlweave does not parse test expressions itself. A caller plugs in an
//! [`ExpressionEngine`]; nodes only see `evaluate(expression, environment)`.

use crate::{Environment, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by an expression engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ExpressionError {
    pub message: String,
}

impl ExpressionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Evaluates test expressions against an environment.
///
/// Implementations are shared by every session and may be called from many
/// threads at once; they must not mutate the environment.
pub trait ExpressionEngine: Send + Sync {
    fn evaluate(&self, expression: &str, env: &Environment)
        -> Result<Value, ExpressionError>;
}

impl<F> ExpressionEngine for F
where
    F: Fn(&str, &Environment) -> Result<Value, ExpressionError> + Send + Sync,
{
    fn evaluate(&self, expression: &str, env: &Environment) -> Result<Value, ExpressionError> {
        self(expression, env)
    }
}

/// Renders a value as inline SQL text for `${name}` substitutions
pub trait ArgConverter: Send + Sync {
    fn convert(&self, value: &Value) -> String;
}

/// Renders values as SQL literals: strings single-quoted with embedded quotes
/// doubled, `NULL` for null, JSON and arrays as quoted JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlLiteralConverter;

impl ArgConverter for SqlLiteralConverter {
    fn convert(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::I32(i) => i.to_string(),
            Value::I64(i) => i.to_string(),
            Value::F32(f) => f.to_string(),
            Value::F64(f) => f.to_string(),
            Value::String(s) => quote(s),
            Value::Bytes(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
                format!("X'{hex}'")
            }
            Value::Json(_) | Value::Array(_) => quote(&value.to_json().to_string()),
        }
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Read-only bundle handed to every node evaluation
#[derive(Clone)]
pub struct EvalContext {
    engine: Arc<dyn ExpressionEngine>,
    converter: Arc<dyn ArgConverter>,
}

impl EvalContext {
    pub fn new(engine: Arc<dyn ExpressionEngine>) -> Self {
        Self {
            engine,
            converter: Arc::new(SqlLiteralConverter),
        }
    }

    pub fn with_converter(mut self, converter: Arc<dyn ArgConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn engine(&self) -> &dyn ExpressionEngine {
        self.engine.as_ref()
    }

    pub fn converter(&self) -> &dyn ArgConverter {
        self.converter.as_ref()
    }
}

impl fmt::Debug for EvalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalContext").finish_non_exhaustive()
    }
}
