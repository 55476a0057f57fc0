//! Placeholder rewriting per database dialect
//!
//! Built templates carry [`BIND_MARKER`] at every bind site and
//! [`Dialect::bind`] renders those for the server. Hand-written SQL uses the
//! generic `?` instead, which [`Dialect::rewrite`] numbers outside quoted
//! text and comments.

use crate::ast::{BIND_MARKER, PLACEHOLDER};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Placeholder style of a database server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// `?` markers (MySQL, SQLite, most drivers)
    #[default]
    Generic,
    /// Sequential `$1, $2, ...` markers
    Postgres,
}

impl Dialect {
    /// Infer the dialect from a connection URL scheme
    pub fn from_url(url: &str) -> Self {
        let scheme = url.split(':').next().unwrap_or_default();
        if scheme.eq_ignore_ascii_case("postgres") || scheme.eq_ignore_ascii_case("postgresql") {
            Dialect::Postgres
        } else {
            Dialect::Generic
        }
    }

    /// Rewrite `?` placeholders for this dialect. Markers inside quoted
    /// literals and identifiers, dollar-quoted bodies and comments are left
    /// alone.
    pub fn rewrite(&self, sql: &str) -> String {
        match self {
            Dialect::Generic => sql.to_string(),
            Dialect::Postgres => {
                let mut index = 0;
                map_unquoted(sql, |out, c| {
                    if PLACEHOLDER.starts_with(c) {
                        index += 1;
                        // writing to a String never fails
                        let _ = write!(out, "${index}");
                    } else {
                        out.push(c);
                    }
                })
            }
        }
    }

    /// Render the bind sites of a built template. Every other character,
    /// `?` included, is kept as written.
    pub fn bind(&self, marked: &str) -> String {
        match self {
            Dialect::Generic => marked.replace(BIND_MARKER, PLACEHOLDER),
            Dialect::Postgres => {
                let mut out = String::with_capacity(marked.len() + 8);
                for (i, part) in marked.split(BIND_MARKER).enumerate() {
                    if i > 0 {
                        let _ = write!(out, "${i}");
                    }
                    out.push_str(part);
                }
                out
            }
        }
    }
}

/// Copy `sql`, passing every character outside quotes and comments through `f`.
///
/// Skipped verbatim: `'..'` literals (backslash escapes honoured), `".."`
/// identifiers, `-- ..` line comments, `/* .. */` block comments and
/// `$tag$ .. $tag$` bodies. An unterminated quote or comment runs to the end.
pub(crate) fn map_unquoted(sql: &str, mut f: impl FnMut(&mut String, char)) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut rest = sql;

    while let Some(c) = rest.chars().next() {
        let skipped = match c {
            '\'' => quoted_len(rest, '\'', true),
            '"' => quoted_len(rest, '"', false),
            '-' if rest.starts_with("--") => rest.find('\n').map_or(rest.len(), |i| i + 1),
            '/' if rest.starts_with("/*") => rest[2..].find("*/").map_or(rest.len(), |i| i + 4),
            '$' => dollar_quoted_len(rest).unwrap_or(0),
            _ => 0,
        };
        if skipped > 0 {
            out.push_str(&rest[..skipped]);
            rest = &rest[skipped..];
        } else {
            f(&mut out, c);
            rest = &rest[c.len_utf8()..];
        }
    }
    out
}

/// Byte length of the quoted run opening `s`, closing quote included
fn quoted_len(s: &str, quote: char, backslash_escapes: bool) -> usize {
    let mut chars = s.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        if backslash_escapes && c == '\\' {
            chars.next();
        } else if c == quote {
            return i + 1;
        }
    }
    s.len()
}

/// Byte length of a `$tag$ .. $tag$` body opening `s`, if it is one
fn dollar_quoted_len(s: &str) -> Option<usize> {
    let tag_len = s[1..].find('$')? + 2;
    let tag = &s[..tag_len];
    let name = &tag[1..tag_len - 1];
    let valid = name.chars().all(|c| c.is_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if !valid {
        return None;
    }
    s[tag_len..].find(tag).map(|i| tag_len + i + tag_len)
}
