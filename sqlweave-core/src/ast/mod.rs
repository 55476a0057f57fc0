//! Template node tree and its evaluator
//!
//! A tree is built once by whatever loads templates and is immutable
//! afterwards. Evaluation only reads the environment; the one side effect is
//! appending bound arguments to the caller's sink, in the same order their
//! placeholders appear in the emitted SQL.

pub mod choose;
pub mod conditional;
pub mod text;

pub use choose::Choose;
pub use conditional::{If, Otherwise, When};
pub use text::{Segment, Text, BIND_MARKER, PLACEHOLDER};

use crate::{Environment, EvalContext, Result, Value};
use serde::{Deserialize, Serialize};

/// One unit of template logic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    Text(Text),
    If(If),
    Choose(Choose),
    When(When),
    Otherwise(Otherwise),
}

impl Node {
    /// Shorthand for a text node parsed from raw template text
    pub fn text(raw: &str) -> Self {
        Node::Text(Text::parse(raw))
    }

    /// Shorthand for a guarded fragment
    pub fn if_(test: impl Into<String>, children: Vec<Node>) -> Self {
        Node::If(If::new(test, children))
    }

    /// Evaluate this node, appending bound values to `args`
    pub fn eval(&self, ctx: &EvalContext, env: &Environment, args: &mut Vec<Value>) -> Result<String> {
        match self {
            Node::Text(text) => Ok(text.eval(ctx, env, args)),
            Node::If(node) => node.eval(ctx, env, args),
            Node::Choose(node) => node.eval(ctx, env, args),
            Node::When(node) => Ok(node.eval_guarded(ctx, env, args)?.unwrap_or_default()),
            Node::Otherwise(node) => node.eval(ctx, env, args),
        }
    }
}

/// Evaluate a node sequence in order and concatenate the fragments
pub fn eval_nodes(
    nodes: &[Node],
    ctx: &EvalContext,
    env: &Environment,
    args: &mut Vec<Value>,
) -> Result<String> {
    let mut sql = String::new();
    for node in nodes {
        sql.push_str(&node.eval(ctx, env, args)?);
    }
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ToyEngine;
    use std::sync::Arc;

    fn ctx() -> EvalContext {
        EvalContext::new(Arc::new(ToyEngine::default()))
    }

    #[test]
    fn test_argument_order_follows_placeholder_order() {
        let nodes = vec![
            Node::text("UPDATE t SET a = #{a}"),
            Node::if_("b != null", vec![Node::text(", b = #{b}")]),
            Node::text(", c = #{c}"),
            Node::if_("skip != null", vec![Node::text(", d = #{d}")]),
            Node::text(" WHERE id = #{id}"),
        ];
        let env = Environment::new()
            .with("a", 1)
            .with("b", 2)
            .with("c", 3)
            .with("d", 4)
            .with("skip", ())
            .with("id", 9);

        let mut args = Vec::new();
        let sql = eval_nodes(&nodes, &ctx(), &env, &mut args).unwrap();

        assert_eq!(
            sql,
            format!("UPDATE t SET a = {BIND_MARKER}, b = {BIND_MARKER}, c = {BIND_MARKER} WHERE id = {BIND_MARKER}")
        );
        assert_eq!(
            args,
            vec![Value::I32(1), Value::I32(2), Value::I32(3), Value::I32(9)]
        );
        assert_eq!(sql.matches(BIND_MARKER).count(), args.len());
    }

    #[test]
    fn test_error_stops_evaluation() {
        let nodes = vec![
            Node::text("a = #{a}"),
            Node::if_("a", vec![Node::text(" b")]),
            Node::text(" c = #{c}"),
        ];
        let env = Environment::new().with("a", 1).with("c", 2);
        let mut args = Vec::new();
        let err = eval_nodes(&nodes, &ctx(), &env, &mut args).unwrap_err();
        assert!(matches!(err, crate::Error::Expression { ref test, .. } if test == "a"));
    }

    #[test]
    fn test_tree_is_reusable_across_environments() {
        let nodes = vec![
            Node::text("SELECT 1"),
            Node::if_("x != null", vec![Node::text(" WHERE x = #{x}")]),
        ];
        let ctx = ctx();

        let mut first = Vec::new();
        let with_x = eval_nodes(&nodes, &ctx, &Environment::new().with("x", 1), &mut first).unwrap();
        let mut second = Vec::new();
        let without_x = eval_nodes(&nodes, &ctx, &Environment::new(), &mut second).unwrap();

        assert_eq!(with_x, format!("SELECT 1 WHERE x = {BIND_MARKER}"));
        assert_eq!(first, vec![Value::I32(1)]);
        assert_eq!(without_x, "SELECT 1");
        assert!(second.is_empty());
    }

    #[test]
    fn test_concurrent_evaluation_of_shared_tree() {
        let nodes = Arc::new(vec![
            Node::text("SELECT * FROM t WHERE 1=1"),
            Node::if_("id != null", vec![Node::text(" AND id = #{id}")]),
        ]);
        let ctx = ctx();

        let handles: Vec<_> = (0..8i32)
            .map(|i| {
                let nodes = Arc::clone(&nodes);
                let ctx = ctx.clone();
                std::thread::spawn(move || {
                    let env = Environment::new().with("id", i);
                    let mut args = Vec::new();
                    let sql = eval_nodes(&nodes, &ctx, &env, &mut args).unwrap();
                    (sql, args)
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let (sql, args) = handle.join().unwrap();
            assert_eq!(sql, format!("SELECT * FROM t WHERE 1=1 AND id = {BIND_MARKER}"));
            assert_eq!(args, vec![Value::I32(i as i32)]);
        }
    }

    #[test]
    fn test_tree_deserializes_from_json() {
        let tree: Vec<Node> = serde_json::from_value(serde_json::json!([
            {"type": "text", "segments": [{"literal": "SELECT 1"}]},
            {"type": "if", "test": "x != null", "children": [
                {"type": "text", "segments": [{"literal": " AND x = "}, {"bind": "x"}]}
            ]}
        ]))
        .unwrap();

        assert_eq!(
            tree,
            vec![
                Node::text("SELECT 1"),
                Node::if_("x != null", vec![Node::text(" AND x = #{x}")]),
            ]
        );
    }
}
