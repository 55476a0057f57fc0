//! Sessions: one unit of work over one connection
//!
//! A session owns a propagation stack and, lazily, a savepoint stack. For
//! REQUIRES_NEW and NOT_SUPPORTED it opens an independent connection and
//! routes everything to a delegate session until that delegate's unit of
//! work completes. Sessions are not internally synchronized; callers must
//! not drive the same session from two tasks at once.

use crate::executor::{Database, ExecResult, Row, Transaction};
use crate::tx::{Propagation, SavepointStack, TxStack};
use crate::{BoundSql, Dialect, Error, Result, Value};
use futures::future::BoxFuture;
use uuid::Uuid;

/// Where operations on a session end up
enum Route<D: Database> {
    Direct,
    Delegated(Box<Session<D>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Commit,
    Rollback,
}

impl Completion {
    fn as_str(self) -> &'static str {
        match self {
            Completion::Commit => "commit",
            Completion::Rollback => "rollback",
        }
    }
}

/// How a statement marks its bind sites
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Markers {
    /// Hand-written SQL with `?` placeholders
    Placeholders,
    /// Builder output carrying bind markers
    Bound,
}

/// Last statement template and its dialect-rewritten form
#[derive(Debug, Clone)]
struct PreparedStatement {
    markers: Markers,
    template: String,
    sql: String,
}

pub struct Session<D: Database> {
    id: String,
    database: Option<D>,
    owns_connection: bool,
    dialect: Dialect,
    default_propagation: Propagation,
    tx_stack: TxStack<D::Transaction>,
    savepoints: Option<SavepointStack>,
    route: Route<D>,
    prepared: Option<PreparedStatement>,
}

impl<D: Database> Session<D> {
    /// Open a session over a shared database handle. Closing the session
    /// does not close the handle.
    pub fn new(database: D) -> Self {
        let dialect = database.dialect();
        Self {
            id: Uuid::new_v4().to_string(),
            database: Some(database),
            owns_connection: false,
            dialect,
            default_propagation: Propagation::default(),
            tx_stack: TxStack::new(),
            savepoints: None,
            route: Route::Direct,
            prepared: None,
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_default_propagation(mut self, propagation: Propagation) -> Self {
        self.default_propagation = propagation;
        self
    }

    fn delegate_of(parent: &Self, database: D) -> Self {
        let mut session = Self::new(database)
            .with_dialect(parent.dialect)
            .with_default_propagation(parent.default_propagation);
        session.owns_connection = true;
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_closed(&self) -> bool {
        self.database.is_none()
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Open frames on this session's own stack, delegates excluded
    pub fn depth(&self) -> usize {
        self.tx_stack.len()
    }

    pub fn has_delegate(&self) -> bool {
        matches!(self.route, Route::Delegated(_))
    }

    /// Propagation of the innermost open frame, following delegates
    pub fn last_propagation(&self) -> Option<Propagation> {
        match &self.route {
            Route::Direct => self.tx_stack.last_propagation(),
            Route::Delegated(child) => child.last_propagation(),
        }
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.is_closed() {
            return Err(Error::session_closed(operation));
        }
        Ok(())
    }

    fn connection(&self, operation: &'static str) -> Result<&D> {
        self.database
            .as_ref()
            .ok_or_else(|| Error::session_closed(operation))
    }

    /// The session operations currently run on
    fn active_mut(&mut self) -> &mut Self {
        match self.route {
            Route::Direct => self,
            Route::Delegated(ref mut child) => child.active_mut(),
        }
    }

    /// Run raw SQL returning rows, without placeholder rewriting
    pub async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        self.ensure_open("query")?;
        self.active_mut().run_query(sql, &[]).await
    }

    /// Run raw SQL returning no rows, without placeholder rewriting
    pub async fn exec(&mut self, sql: &str) -> Result<ExecResult> {
        self.ensure_open("exec")?;
        self.active_mut().run_exec(sql, &[]).await
    }

    /// Rewrite `?` markers for the dialect and run with bound arguments
    pub async fn query_prepared(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        self.ensure_open("query_prepared")?;
        let active = self.active_mut();
        let sql = active.prepare(Markers::Placeholders, sql);
        active.run_query(&sql, args).await
    }

    pub async fn exec_prepared(&mut self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        self.ensure_open("exec_prepared")?;
        let active = self.active_mut();
        let sql = active.prepare(Markers::Placeholders, sql);
        active.run_exec(&sql, args).await
    }

    /// Run the output of [`crate::SqlBuilder::build`]. Only its bind sites
    /// are rendered for the dialect.
    pub async fn query_bound(&mut self, bound: &BoundSql) -> Result<Vec<Row>> {
        self.ensure_open("query_bound")?;
        let active = self.active_mut();
        let sql = active.prepare(Markers::Bound, bound.marked());
        active.run_query(&sql, bound.args()).await
    }

    pub async fn exec_bound(&mut self, bound: &BoundSql) -> Result<ExecResult> {
        self.ensure_open("exec_bound")?;
        let active = self.active_mut();
        let sql = active.prepare(Markers::Bound, bound.marked());
        active.run_exec(&sql, bound.args()).await
    }

    fn prepare(&mut self, markers: Markers, template: &str) -> String {
        if let Some(prepared) = &self.prepared {
            if prepared.markers == markers && prepared.template == template {
                return prepared.sql.clone();
            }
        }
        let sql = match markers {
            Markers::Placeholders => self.dialect.rewrite(template),
            Markers::Bound => self.dialect.bind(template),
        };
        self.prepared = Some(PreparedStatement {
            markers,
            template: template.to_string(),
            sql: sql.clone(),
        });
        sql
    }

    async fn run_query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        tracing::debug!(session = %self.id, sql, args = args.len(), "query");
        let result = match self.tx_stack.active_mut() {
            Some(tx) => tx.query(sql, args).await,
            None => self.connection("query")?.query(sql, args).await,
        };
        result.map_err(|e| e.within("Session"))
    }

    async fn run_exec(&mut self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        tracing::debug!(session = %self.id, sql, args = args.len(), "exec");
        let result = match self.tx_stack.active_mut() {
            Some(tx) => tx.exec(sql, args).await,
            None => self.connection("exec")?.exec(sql, args).await,
        };
        result.map_err(|e| e.within("Session"))
    }

    /// Begin a unit of work under the session's default propagation
    pub async fn begin_default(&mut self) -> Result<()> {
        let propagation = self.default_propagation;
        self.begin(propagation).await
    }

    /// Begin a unit of work. While a delegate is open the call goes to it.
    pub async fn begin(&mut self, propagation: Propagation) -> Result<()> {
        self.ensure_open("begin")?;
        self.active_mut().begin_here(propagation).await
    }

    async fn begin_here(&mut self, propagation: Propagation) -> Result<()> {
        tracing::debug!(
            session = %self.id,
            %propagation,
            depth = self.tx_stack.len(),
            "begin"
        );
        let active = self.tx_stack.has_active();

        match propagation {
            Propagation::Required => {
                if !self.tx_stack.push_join(propagation) {
                    self.begin_physical(propagation).await?;
                }
            }
            Propagation::Supports => {
                if active {
                    self.begin_physical(propagation).await?;
                } else {
                    self.tx_stack.push_idle(propagation);
                }
            }
            Propagation::Mandatory => {
                if !active {
                    return Err(Error::propagation_conflict(
                        propagation,
                        "no transaction is active",
                    ));
                }
                self.begin_physical(propagation).await?;
            }
            Propagation::RequiresNew | Propagation::NotSupported => {
                self.open_delegate(propagation).await?;
            }
            Propagation::Never => {
                if active {
                    return Err(Error::propagation_conflict(
                        propagation,
                        "a transaction is already active",
                    ));
                }
                self.tx_stack.push_idle(propagation);
            }
            Propagation::Nested => {
                if active {
                    self.begin_savepoint().await?;
                } else {
                    self.begin_physical(Propagation::Required).await?;
                }
            }
            Propagation::NotRequired => {
                if active {
                    return Err(Error::propagation_conflict(
                        propagation,
                        "a transaction is already active",
                    ));
                }
                self.begin_physical(propagation).await?;
            }
        }
        Ok(())
    }

    async fn begin_physical(&mut self, propagation: Propagation) -> Result<()> {
        let tx = self
            .connection("begin")?
            .begin()
            .await
            .map_err(|e| e.within("Session"))?;
        self.tx_stack.push_new(tx, propagation);
        tracing::info!(session = %self.id, %propagation, "transaction begun");
        Ok(())
    }

    async fn begin_savepoint(&mut self) -> Result<()> {
        let name = SavepointStack::name_for(self.tx_stack.len());
        tracing::debug!(session = %self.id, savepoint = %name, "savepoint created");

        if let Some(tx) = self.tx_stack.active_mut() {
            tx.savepoint(&name)
                .await
                .map_err(|e| e.within("Session"))?;
        }
        self.tx_stack.push_join(Propagation::Nested);
        self.savepoints
            .get_or_insert_with(SavepointStack::new)
            .push(name);
        Ok(())
    }

    async fn open_delegate(&mut self, propagation: Propagation) -> Result<()> {
        let database = self
            .connection("begin")?
            .open_independent()
            .await
            .map_err(|e| e.within("Session"))?;
        let mut delegate = Self::delegate_of(self, database);

        if propagation == Propagation::RequiresNew {
            if let Err(e) = delegate.begin_physical(propagation).await {
                if let Err(close_err) = delegate.close().await {
                    tracing::warn!(
                        session = %self.id,
                        delegate = %delegate.id,
                        error = %close_err,
                        "delegate close failed"
                    );
                }
                return Err(e);
            }
        } else {
            delegate.tx_stack.push_idle(propagation);
        }

        tracing::debug!(
            session = %self.id,
            delegate = %delegate.id,
            %propagation,
            "delegate opened"
        );
        self.route = Route::Delegated(Box::new(delegate));
        Ok(())
    }

    /// Complete the innermost unit of work
    pub fn commit(&mut self) -> BoxFuture<'_, Result<()>> {
        self.complete(Completion::Commit)
    }

    /// Abandon the innermost unit of work
    pub fn rollback(&mut self) -> BoxFuture<'_, Result<()>> {
        self.complete(Completion::Rollback)
    }

    fn complete(&mut self, completion: Completion) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.ensure_open(completion.as_str())?;

            let delegated = match &mut self.route {
                Route::Delegated(child) => {
                    let result = child.complete(completion).await;
                    let finished = result.is_err() || child.tx_stack.is_empty();
                    Some((result, finished))
                }
                Route::Direct => None,
            };
            if let Some((result, finished)) = delegated {
                if finished {
                    if let Err(e) = self.close_delegate().await {
                        tracing::warn!(session = %self.id, error = %e, "delegate close failed");
                    }
                }
                return result;
            }

            self.complete_here(completion).await
        })
    }

    async fn complete_here(&mut self, completion: Completion) -> Result<()> {
        let Some(popped) = self.tx_stack.pop() else {
            tracing::debug!(session = %self.id, "{} with no open frame", completion.as_str());
            return Ok(());
        };
        tracing::debug!(
            session = %self.id,
            propagation = %popped.propagation,
            depth = self.tx_stack.len(),
            "{}",
            completion.as_str()
        );

        if popped.propagation == Propagation::Nested {
            self.finish_savepoint(completion).await?;
        }

        if let Some(tx) = popped.released {
            let result = match completion {
                Completion::Commit => tx.commit().await,
                Completion::Rollback => tx.rollback().await,
            };
            result.map_err(|e| e.within("Session"))?;
            tracing::info!(session = %self.id, "transaction {}", completion.as_str());
        }
        Ok(())
    }

    async fn finish_savepoint(&mut self, completion: Completion) -> Result<()> {
        let Some(name) = self.savepoints.as_mut().and_then(SavepointStack::pop) else {
            return Ok(());
        };
        tracing::debug!(session = %self.id, savepoint = %name, "savepoint {}", completion.as_str());

        let Some(tx) = self.tx_stack.active_mut() else {
            return Ok(());
        };
        let result = match completion {
            Completion::Commit => tx.release_savepoint(&name).await,
            Completion::Rollback => tx.rollback_to_savepoint(&name).await,
        };
        result.map_err(|e| e.within("Session"))
    }

    async fn close_delegate(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.route, Route::Direct) {
            Route::Delegated(mut child) => child.close().await,
            Route::Direct => Ok(()),
        }
    }

    /// Tear the session down: close any delegate, roll back every open
    /// transaction newest first, drop the prepared statement and release
    /// the connection. Teardown runs to the end; the first failure is
    /// returned.
    pub fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.ensure_open("close")?;
            tracing::debug!(session = %self.id, depth = self.tx_stack.len(), "close");

            let mut outcome = self.close_delegate().await;
            self.prepared = None;

            for tx in self.tx_stack.drain() {
                if let Err(e) = tx.rollback().await {
                    tracing::warn!(session = %self.id, error = %e, "rollback on close failed");
                    if outcome.is_ok() {
                        outcome = Err(e.within("Session"));
                    }
                }
            }
            self.savepoints = None;

            if let Some(database) = self.database.take() {
                if self.owns_connection {
                    database.close().await;
                }
            }
            outcome
        })
    }
}
