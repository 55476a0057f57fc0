//! Literal SQL fragments with embedded parameter references

use crate::{Environment, EvalContext, Value};
use serde::{Deserialize, Serialize};

/// The generic positional placeholder servers accept
pub const PLACEHOLDER: &str = "?";

/// Where evaluated templates bind the next positional argument. A
/// private-use code point, so it cannot clash with `?` operators or text in
/// the template; [`crate::Dialect::bind`] turns it into real placeholders.
/// Any occurrence in literal or inlined text is dropped.
pub const BIND_MARKER: &str = "\u{E000}";

/// A piece of a text node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    /// Emitted verbatim
    Literal(String),
    /// `#{name}`: emits a placeholder and binds the named value
    Bind(String),
    /// `${name}`: inlines the value rendered by the context's converter
    Inline(String),
}

/// A literal SQL fragment
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Text {
    pub segments: Vec<Segment>,
}

impl Text {
    /// A fragment with no parameter references
    pub fn literal(sql: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::Literal(sql.into())],
        }
    }

    /// Split raw text into literal, `#{..}` and `${..}` segments.
    /// An unterminated reference is kept as literal text.
    pub fn parse(raw: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = raw;

        while let Some(start) = rest.find(['#', '$']) {
            let (before, tail) = rest.split_at(start);
            literal.push_str(before);

            let sigil = tail.as_bytes()[0];
            let body = &tail[1..];
            let end = match body.strip_prefix('{').and_then(|b| b.find('}')) {
                Some(end) => end,
                None => {
                    literal.push(char::from(sigil));
                    rest = body;
                    continue;
                }
            };

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            let name = body[1..=end].trim().to_string();
            segments.push(if sigil == b'#' {
                Segment::Bind(name)
            } else {
                Segment::Inline(name)
            });
            rest = &body[end + 2..];
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Self { segments }
    }

    /// Names bound through `#{..}`, in order of appearance
    pub fn bindings(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Bind(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Emit the fragment. Missing variables bind (or inline) as NULL.
    pub fn eval(&self, ctx: &EvalContext, env: &Environment, args: &mut Vec<Value>) -> String {
        let mut sql = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => push_unmarked(&mut sql, text),
                Segment::Bind(name) => {
                    sql.push_str(BIND_MARKER);
                    args.push(env.resolve(name).unwrap_or(Value::Null));
                }
                Segment::Inline(name) => {
                    let value = env.resolve(name).unwrap_or(Value::Null);
                    push_unmarked(&mut sql, &ctx.converter().convert(&value));
                }
            }
        }
        sql
    }
}

fn push_unmarked(sql: &mut String, text: &str) {
    if text.contains(BIND_MARKER) {
        sql.push_str(&text.replace(BIND_MARKER, ""));
    } else {
        sql.push_str(text);
    }
}
