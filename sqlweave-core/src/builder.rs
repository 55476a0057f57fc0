//! SQL builder: node tree + parameters -> SQL text and ordered arguments

use crate::ast::eval_nodes;
use crate::dialect::map_unquoted;
use crate::{
    ArgConverter, Dialect, Environment, EvalContext, ExpressionEngine, Node, Params, Result, Value,
};
use std::sync::Arc;

/// SQL text paired with its arguments in placeholder order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoundSql {
    marked: String,
    sql: String,
    args: Vec<Value>,
}

impl BoundSql {
    fn new(marked: String, args: Vec<Value>) -> Self {
        let sql = Dialect::Generic.bind(&marked);
        Self { marked, sql, args }
    }

    /// The statement with generic `?` placeholders
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// The statement with placeholders for `dialect`. Question marks that
    /// were part of the template text stay as written.
    pub fn to_dialect(&self, dialect: Dialect) -> String {
        dialect.bind(&self.marked)
    }

    pub(crate) fn marked(&self) -> &str {
        &self.marked
    }
}

/// Evaluates node trees against call parameters and session-scoped variables
#[derive(Debug, Clone)]
pub struct SqlBuilder {
    context: EvalContext,
    vars: Params,
    enable_log: bool,
}

impl SqlBuilder {
    pub fn new(engine: Arc<dyn ExpressionEngine>) -> Self {
        Self {
            context: EvalContext::new(engine),
            vars: Params::new(),
            enable_log: false,
        }
    }

    pub fn with_converter(mut self, converter: Arc<dyn ArgConverter>) -> Self {
        self.context = self.context.with_converter(converter);
        self
    }

    /// Add a session-scoped variable; call parameters of the same name win
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Replace all session-scoped variables
    pub fn set_vars(&mut self, vars: Params) {
        self.vars = vars;
    }

    pub fn vars(&self) -> &Params {
        &self.vars
    }

    pub fn set_enable_log(&mut self, enable: bool) {
        self.enable_log = enable;
    }

    pub fn enable_log(&self) -> bool {
        self.enable_log
    }

    pub fn context(&self) -> &EvalContext {
        &self.context
    }

    /// Evaluate `nodes` against the session variables overlaid with `params`.
    ///
    /// Bind sites stay distinguishable from any `?` in the template text
    /// until the session renders them for its dialect. Whitespace runs
    /// outside quoted literals and comments are collapsed so fragments can
    /// be written with their own leading spaces.
    pub fn build(&self, params: &Params, nodes: &[Node]) -> Result<BoundSql> {
        let env = Environment::merged(&self.vars, params);
        let mut args = Vec::new();
        let raw = eval_nodes(nodes, &self.context, &env, &mut args)?;
        let bound = BoundSql::new(collapse_whitespace(&raw), args);

        if self.enable_log {
            tracing::debug!(sql = %bound.sql, args = bound.args.len(), "built sql");
        }
        Ok(bound)
    }
}

fn collapse_whitespace(sql: &str) -> String {
    let collapsed = map_unquoted(sql, |out, c| {
        if !c.is_whitespace() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with(char::is_whitespace) {
            out.push(' ');
        }
    });
    collapsed.trim_end().to_string()
}
