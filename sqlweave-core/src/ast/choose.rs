//! First-match branching over `When` guards

use super::{Otherwise, When};
use crate::{Environment, EvalContext, Result, Value};
use serde::{Deserialize, Serialize};

/// Evaluates `whens` in order; the first true guard wins and nothing after
/// it is evaluated. Falls back to `otherwise`, then to an empty fragment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Choose {
    #[serde(default)]
    pub whens: Vec<When>,
    #[serde(default)]
    pub otherwise: Option<Otherwise>,
}

impl Choose {
    pub fn new(whens: Vec<When>, otherwise: Option<Otherwise>) -> Self {
        Self { whens, otherwise }
    }

    pub fn eval(&self, ctx: &EvalContext, env: &Environment, args: &mut Vec<Value>) -> Result<String> {
        for when in &self.whens {
            if let Some(fragment) = when.eval_guarded(ctx, env, args)? {
                return Ok(fragment);
            }
        }
        match &self.otherwise {
            Some(otherwise) => otherwise.eval(ctx, env, args),
            None => Ok(String::new()),
        }
    }
}
