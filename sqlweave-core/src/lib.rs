//! Sqlweave Core - dynamic SQL templates with declarative transaction propagation
//!
//! Node trees (`Text`, `If`, `Choose`, `When`, `Otherwise`) are evaluated by
//! the [`SqlBuilder`] into SQL plus ordered arguments. A [`Session`] runs the
//! result and tracks nested units of work with Spring-style propagation
//! modes, savepoints, and delegate sessions on independent connections.

pub mod ast;
pub mod builder;
pub mod config;
pub mod dialect;
pub mod env;
pub mod error;
pub mod executor;
pub mod expr;
pub mod factory;
pub mod session;
pub mod tx;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types
pub use ast::{
    eval_nodes, Choose, If, Node, Otherwise, Segment, Text, When, BIND_MARKER, PLACEHOLDER,
};
pub use builder::{BoundSql, SqlBuilder};
pub use config::Config;
pub use dialect::Dialect;
pub use env::{Environment, Params};
pub use error::{Error, Result};
pub use executor::{Database, ExecResult, Row, Transaction};
pub use expr::{ArgConverter, EvalContext, ExpressionEngine, ExpressionError, SqlLiteralConverter};
pub use factory::{SessionFactory, SharedSession};
pub use session::Session;
pub use tx::{Propagation, SavepointStack, TxStack};
pub use value::Value;

#[cfg(any(feature = "postgres", feature = "mysql", feature = "sqlite"))]
pub use executor::sqlx_any::{SqlxDatabase, SqlxTransaction};
