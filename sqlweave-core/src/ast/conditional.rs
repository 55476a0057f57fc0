//! Guarded fragments: `If`, `When` and the unconditional `Otherwise`

use super::{eval_nodes, Node};
use crate::{Environment, Error, EvalContext, Result, Value};
use serde::{Deserialize, Serialize};

/// Evaluate a test expression; anything but a boolean is an error naming the test.
fn check(test: &str, ctx: &EvalContext, env: &Environment) -> Result<bool> {
    let normalized = test.replace('\n', " ");
    let value = ctx
        .engine()
        .evaluate(&normalized, env)
        .map_err(|e| Error::expression(test, e.message))?;
    value.as_bool().ok_or_else(|| {
        Error::expression(test, format!("expected a boolean, got {}", value.type_name()))
    })
}

/// Emits its children only when `test` evaluates to true
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct If {
    pub test: String,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl If {
    pub fn new(test: impl Into<String>, children: Vec<Node>) -> Self {
        Self {
            test: test.into(),
            children,
        }
    }

    pub fn eval(&self, ctx: &EvalContext, env: &Environment, args: &mut Vec<Value>) -> Result<String> {
        if check(&self.test, ctx, env)? {
            eval_nodes(&self.children, ctx, env, args)
        } else {
            Ok(String::new())
        }
    }
}

/// One guarded branch of a `Choose`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct When {
    pub test: String,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl When {
    pub fn new(test: impl Into<String>, children: Vec<Node>) -> Self {
        Self {
            test: test.into(),
            children,
        }
    }

    /// `Some(fragment)` when the guard holds, `None` otherwise.
    /// A matching branch with no output still yields `Some("")`.
    pub fn eval_guarded(
        &self,
        ctx: &EvalContext,
        env: &Environment,
        args: &mut Vec<Value>,
    ) -> Result<Option<String>> {
        if check(&self.test, ctx, env)? {
            eval_nodes(&self.children, ctx, env, args).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Fallback branch of a `Choose`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Otherwise {
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Otherwise {
    pub fn new(children: Vec<Node>) -> Self {
        Self { children }
    }

    pub fn eval(&self, ctx: &EvalContext, env: &Environment, args: &mut Vec<Value>) -> Result<String> {
        eval_nodes(&self.children, ctx, env, args)
    }
}
