//! Physical connection and transaction interface
//!
//! A [`Database`] is a cheaply clonable handle to a connection source; a
//! [`Transaction`] is one begun physical transaction. Sessions layer the
//! propagation rules on top of these two traits.

use crate::{Dialect, Result, Value};
use std::future::Future;

/// One result row: column names with raw bytes, `None` for SQL NULL.
/// Turning rows into typed structs is left to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: Vec<(String, Option<Vec<u8>>)>,
}

impl Row {
    pub fn new(columns: Vec<(String, Option<Vec<u8>>)>) -> Self {
        Self { columns }
    }

    /// Raw bytes of the named column; `None` if absent or NULL
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .and_then(|(_, value)| value.as_deref())
    }

    /// The named column decoded as UTF-8
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&[u8]>)> {
        self.columns
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Outcome of a statement that returns no rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub last_insert_id: i64,
    pub rows_affected: u64,
}

/// A begun physical transaction
pub trait Transaction: Send {
    /// Execute a query that returns rows
    fn query(
        &mut self,
        sql: &str,
        args: &[Value],
    ) -> impl Future<Output = Result<Vec<Row>>> + Send;

    /// Execute a statement that returns no rows
    fn exec(
        &mut self,
        sql: &str,
        args: &[Value],
    ) -> impl Future<Output = Result<ExecResult>> + Send;

    /// Commit the transaction
    fn commit(self) -> impl Future<Output = Result<()>> + Send
    where
        Self: Sized;

    /// Rollback the transaction
    fn rollback(self) -> impl Future<Output = Result<()>> + Send
    where
        Self: Sized;

    /// Create a savepoint with the given name
    fn savepoint(&mut self, name: &str) -> impl Future<Output = Result<()>> + Send;

    /// Rollback to a savepoint
    fn rollback_to_savepoint(&mut self, name: &str) -> impl Future<Output = Result<()>> + Send;

    /// Release a savepoint
    fn release_savepoint(&mut self, name: &str) -> impl Future<Output = Result<()>> + Send;
}

/// A source of connections and transactions
pub trait Database: Clone + Send + Sync + 'static {
    /// The transaction type begun by this database
    type Transaction: Transaction + 'static;

    /// Placeholder style expected by the server
    fn dialect(&self) -> Dialect;

    /// Physically begin a transaction
    fn begin(&self) -> impl Future<Output = Result<Self::Transaction>> + Send;

    /// Execute a query outside any transaction
    fn query(&self, sql: &str, args: &[Value]) -> impl Future<Output = Result<Vec<Row>>> + Send;

    /// Execute a statement outside any transaction
    fn exec(&self, sql: &str, args: &[Value]) -> impl Future<Output = Result<ExecResult>> + Send;

    /// Open an independent connection to the same server, used by
    /// REQUIRES_NEW and NOT_SUPPORTED delegates
    fn open_independent(&self) -> impl Future<Output = Result<Self>> + Send;

    /// Release the underlying connection(s)
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// SQLx `Any` driver; the concrete backend is picked from the URL
#[cfg(any(feature = "postgres", feature = "mysql", feature = "sqlite"))]
pub mod sqlx_any {
    use super::*;
    use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
    use sqlx::query::Query;
    use sqlx::{Any, AnyPool, Column, Row as _, ValueRef};
    use std::sync::Arc;

    /// Connection pool wrapper implementing [`Database`]
    #[derive(Clone, Debug)]
    pub struct SqlxDatabase {
        inner: AnyPool,
        url: Arc<str>,
        dialect: Dialect,
    }

    impl SqlxDatabase {
        /// Connect a new pool from a connection string
        pub async fn connect(database_url: &str) -> Result<Self> {
            sqlx::any::install_default_drivers();
            let pool = AnyPool::connect(database_url).await?;
            Ok(Self::from_pool(pool, database_url))
        }

        /// Wrap an existing pool; `database_url` is kept for independent connections
        pub fn from_pool(pool: AnyPool, database_url: &str) -> Self {
            Self {
                inner: pool,
                url: Arc::from(database_url),
                dialect: Dialect::from_url(database_url),
            }
        }

        /// Override the placeholder style inferred from the URL
        pub fn with_dialect(mut self, dialect: Dialect) -> Self {
            self.dialect = dialect;
            self
        }

        pub fn pool(&self) -> &AnyPool {
            &self.inner
        }
    }

    impl Database for SqlxDatabase {
        type Transaction = SqlxTransaction;

        fn dialect(&self) -> Dialect {
            self.dialect
        }

        async fn begin(&self) -> Result<Self::Transaction> {
            let txn = self.inner.begin().await?;
            Ok(SqlxTransaction { inner: txn })
        }

        async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
            let rows = bind_values(sqlx::query(sql), args)
                .fetch_all(&self.inner)
                .await?;
            rows.iter().map(decode_row).collect()
        }

        async fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
            let result = bind_values(sqlx::query(sql), args)
                .execute(&self.inner)
                .await?;
            Ok(ExecResult {
                last_insert_id: result.last_insert_id().unwrap_or_default(),
                rows_affected: result.rows_affected(),
            })
        }

        async fn open_independent(&self) -> Result<Self> {
            let pool = AnyPoolOptions::new()
                .max_connections(1)
                .connect(&self.url)
                .await?;
            Ok(Self {
                inner: pool,
                url: Arc::clone(&self.url),
                dialect: self.dialect,
            })
        }

        async fn close(&self) {
            self.inner.close().await;
        }
    }

    /// SQLx transaction wrapper
    pub struct SqlxTransaction {
        inner: sqlx::Transaction<'static, Any>,
    }

    impl Transaction for SqlxTransaction {
        async fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
            let rows = bind_values(sqlx::query(sql), args)
                .fetch_all(&mut *self.inner)
                .await?;
            rows.iter().map(decode_row).collect()
        }

        async fn exec(&mut self, sql: &str, args: &[Value]) -> Result<ExecResult> {
            let result = bind_values(sqlx::query(sql), args)
                .execute(&mut *self.inner)
                .await?;
            Ok(ExecResult {
                last_insert_id: result.last_insert_id().unwrap_or_default(),
                rows_affected: result.rows_affected(),
            })
        }

        async fn commit(self) -> Result<()> {
            self.inner.commit().await?;
            Ok(())
        }

        async fn rollback(self) -> Result<()> {
            self.inner.rollback().await?;
            Ok(())
        }

        async fn savepoint(&mut self, name: &str) -> Result<()> {
            let sql = format!("SAVEPOINT {name}");
            sqlx::query(&sql).execute(&mut *self.inner).await?;
            Ok(())
        }

        async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
            let sql = format!("ROLLBACK TO SAVEPOINT {name}");
            sqlx::query(&sql).execute(&mut *self.inner).await?;
            Ok(())
        }

        async fn release_savepoint(&mut self, name: &str) -> Result<()> {
            let sql = format!("RELEASE SAVEPOINT {name}");
            sqlx::query(&sql).execute(&mut *self.inner).await?;
            Ok(())
        }
    }

    /// Bind sqlweave Values to a SQLx query
    fn bind_values<'q>(
        mut query: Query<'q, Any, AnyArguments<'q>>,
        params: &[Value],
    ) -> Query<'q, Any, AnyArguments<'q>> {
        for param in params {
            query = match param {
                Value::Null => query.bind(None::<i32>),
                Value::Bool(b) => query.bind(*b),
                Value::I32(i) => query.bind(*i),
                Value::I64(i) => query.bind(*i),
                Value::F32(f) => query.bind(*f),
                Value::F64(f) => query.bind(*f),
                Value::String(s) => query.bind(s.clone()),
                Value::Bytes(b) => query.bind(b.clone()),
                // JSON and arrays travel as JSON text
                Value::Json(_) | Value::Array(_) => query.bind(param.to_json().to_string()),
            };
        }
        query
    }

    fn decode_row(row: &AnyRow) -> Result<Row> {
        let mut columns = Vec::with_capacity(row.len());
        for (index, column) in row.columns().iter().enumerate() {
            columns.push((column.name().to_string(), decode_column(row, index)?));
        }
        Ok(Row::new(columns))
    }

    /// Any exposes typed values only, so try the common kinds in turn and
    /// keep the textual form, falling back to raw blob bytes. SQL NULL is
    /// `None` whatever the column's declared type.
    fn decode_column(row: &AnyRow, index: usize) -> Result<Option<Vec<u8>>> {
        if row.try_get_raw(index)?.is_null() {
            return Ok(None);
        }
        if let Ok(text) = row.try_get::<Option<String>, _>(index) {
            return Ok(text.map(String::into_bytes));
        }
        if let Ok(n) = row.try_get::<Option<i64>, _>(index) {
            return Ok(n.map(|n| n.to_string().into_bytes()));
        }
        if let Ok(n) = row.try_get::<Option<i32>, _>(index) {
            return Ok(n.map(|n| n.to_string().into_bytes()));
        }
        if let Ok(n) = row.try_get::<Option<i16>, _>(index) {
            return Ok(n.map(|n| n.to_string().into_bytes()));
        }
        if let Ok(f) = row.try_get::<Option<f64>, _>(index) {
            return Ok(f.map(|f| f.to_string().into_bytes()));
        }
        if let Ok(f) = row.try_get::<Option<f32>, _>(index) {
            return Ok(f.map(|f| f.to_string().into_bytes()));
        }
        if let Ok(b) = row.try_get::<Option<bool>, _>(index) {
            return Ok(b.map(|b| b.to_string().into_bytes()));
        }
        Ok(row.try_get::<Option<Vec<u8>>, _>(index)?)
    }

}
