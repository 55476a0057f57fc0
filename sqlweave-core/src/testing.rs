//! Test doubles shared by the unit tests

use crate::executor::{Database, ExecResult, Row, Transaction};
use crate::{Dialect, Environment, ExpressionEngine, ExpressionError, Result, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Minimal expression engine: `true`, `false`, `x == null`, `x != null`,
/// `x == <int>`, `x != 'text'` and bare identifiers. Records every
/// expression it is asked to evaluate.
#[derive(Debug, Default)]
pub(crate) struct ToyEngine {
    seen: Mutex<Vec<String>>,
}

impl ToyEngine {
    pub fn evaluated(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl ExpressionEngine for ToyEngine {
    fn evaluate(&self, expression: &str, env: &Environment) -> std::result::Result<Value, ExpressionError> {
        let expression = expression.split_whitespace().collect::<Vec<_>>().join(" ");
        self.seen.lock().unwrap().push(expression.clone());

        match expression.as_str() {
            "true" => return Ok(Value::Bool(true)),
            "false" => return Ok(Value::Bool(false)),
            _ => {}
        }

        for (op, negate) in [("!=", true), ("==", false)] {
            if let Some((lhs, rhs)) = expression.split_once(op) {
                let lhs = env.resolve(lhs.trim()).unwrap_or(Value::Null);
                let equal = compare(&lhs, rhs.trim())?;
                return Ok(Value::Bool(equal != negate));
            }
        }

        env.resolve(&expression)
            .ok_or_else(|| ExpressionError::new(format!("unknown identifier `{expression}`")))
    }
}

fn compare(lhs: &Value, rhs: &str) -> std::result::Result<bool, ExpressionError> {
    if rhs == "null" {
        return Ok(lhs.is_null());
    }
    if let Ok(n) = rhs.parse::<i64>() {
        return Ok(lhs.as_i64() == Some(n));
    }
    let quoted = rhs
        .strip_prefix('\'')
        .and_then(|r| r.strip_suffix('\''))
        .ok_or_else(|| ExpressionError::new(format!("unsupported operand `{rhs}`")))?;
    Ok(matches!(lhs, Value::String(s) if s == quoted))
}

/// Database double recording every physical operation into a shared log.
///
/// Clones, including the ones handed out by `open_independent`, share the
/// log and the transaction counter, so delegate activity shows up in the
/// same timeline. Transactions are numbered from 1 in begin order.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockDatabase {
    events: Arc<Mutex<Vec<String>>>,
    tx_counter: Arc<AtomicUsize>,
    fail_on: Arc<Mutex<Option<String>>>,
    dialect: Dialect,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Fail any operation whose event text contains `needle`
    pub fn fail_on(&self, needle: &str) {
        *self.fail_on.lock().unwrap() = Some(needle.to_string());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Number of recorded events starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }

    fn record(&self, event: String) -> Result<()> {
        if let Some(needle) = self.fail_on.lock().unwrap().as_deref() {
            if event.contains(needle) {
                return Err(sqlx::Error::Protocol(format!("injected failure at `{event}`")).into());
            }
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    fn rows(sql: &str) -> Vec<Row> {
        vec![Row::new(vec![("sql".to_string(), Some(sql.as_bytes().to_vec()))])]
    }
}

fn describe(sql: &str, args: &[Value]) -> String {
    if args.is_empty() {
        sql.to_string()
    } else {
        format!("{sql} {args:?}")
    }
}

impl Database for MockDatabase {
    type Transaction = MockTransaction;

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn begin(&self) -> Result<MockTransaction> {
        let id = self.tx_counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(format!("begin#{id}"))?;
        Ok(MockTransaction {
            id,
            db: self.clone(),
        })
    }

    async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        self.record(format!("query: {}", describe(sql, args)))?;
        Ok(Self::rows(sql))
    }

    async fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        self.record(format!("exec: {}", describe(sql, args)))?;
        Ok(ExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        })
    }

    async fn open_independent(&self) -> Result<Self> {
        self.record("open_independent".to_string())?;
        Ok(self.clone())
    }

    async fn close(&self) {
        let _ = self.record("close".to_string());
    }
}

#[derive(Debug)]
pub(crate) struct MockTransaction {
    id: usize,
    db: MockDatabase,
}

impl Transaction for MockTransaction {
    async fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        self.db
            .record(format!("query#{}: {}", self.id, describe(sql, args)))?;
        Ok(MockDatabase::rows(sql))
    }

    async fn exec(&mut self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        self.db
            .record(format!("exec#{}: {}", self.id, describe(sql, args)))?;
        Ok(ExecResult {
            last_insert_id: self.id as i64,
            rows_affected: 1,
        })
    }

    async fn commit(self) -> Result<()> {
        self.db.record(format!("commit#{}", self.id))
    }

    async fn rollback(self) -> Result<()> {
        self.db.record(format!("rollback#{}", self.id))
    }

    async fn savepoint(&mut self, name: &str) -> Result<()> {
        self.db.record(format!("savepoint#{}: {name}", self.id))
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.db.record(format!("rollback_to#{}: {name}", self.id))
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.db.record(format!("release#{}: {name}", self.id))
    }
}
