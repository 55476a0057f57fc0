//! Session registry
//!
//! Hands out sessions keyed by id. Each session sits behind its own async
//! mutex, so one task at a time drives it; the map itself is guarded by a
//! short-lived std mutex that is never held across an await.

use crate::executor::Database;
use crate::{Config, Error, ExpressionEngine, Result, Session, SqlBuilder};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// A registered session
pub type SharedSession<D> = Arc<tokio::sync::Mutex<Session<D>>>;

pub struct SessionFactory<D: Database> {
    database: D,
    config: Config,
    sessions: Mutex<HashMap<String, SharedSession<D>>>,
}

impl<D: Database> SessionFactory<D> {
    pub fn new(database: D) -> Self {
        Self::with_config(database, Config::default())
    }

    pub fn with_config(database: D, config: Config) -> Self {
        Self {
            database,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &D {
        &self.database
    }

    /// A builder honouring the configured logging switch
    pub fn sql_builder(&self, engine: Arc<dyn ExpressionEngine>) -> SqlBuilder {
        let mut builder = SqlBuilder::new(engine);
        builder.set_enable_log(self.config.enable_log);
        builder
    }

    /// Open and register a new session
    pub fn new_session(&self) -> SharedSession<D> {
        let mut session = Session::new(self.database.clone())
            .with_default_propagation(self.config.default_propagation);
        if let Some(dialect) = self.config.dialect {
            session = session.with_dialect(dialect);
        }
        let id = session.id().to_string();
        tracing::debug!(session = %id, "session opened");

        let shared = Arc::new(tokio::sync::Mutex::new(session));
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::clone(&shared));
        shared
    }

    pub fn get_session(&self, id: &str) -> Option<SharedSession<D>> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Remove a session from the registry and close it
    pub async fn close_session(&self, id: &str) -> Result<()> {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        let shared = removed.ok_or_else(|| Error::session_not_found(id))?;

        let mut session = shared.lock().await;
        if !session.is_closed() {
            session.close().await?;
        }
        Ok(())
    }

    /// Close every registered session; the first failure is returned
    pub async fn close_all(&self) -> Result<()> {
        let drained: Vec<_> = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, shared)| shared)
            .collect();

        let mut outcome = Ok(());
        for shared in drained {
            let mut session = shared.lock().await;
            if session.is_closed() {
                continue;
            }
            if let Err(e) = session.close().await {
                tracing::warn!(session = %session.id(), error = %e, "close failed");
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }
        outcome
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDatabase;
    use crate::{Dialect, Propagation};

    #[tokio::test]
    async fn test_register_lookup_and_close() {
        let db = MockDatabase::new();
        let factory = SessionFactory::new(db.clone());
        let shared = factory.new_session();
        let id = shared.lock().await.id().to_string();

        assert_eq!(factory.len(), 1);
        let found = factory.get_session(&id).unwrap();
        assert!(Arc::ptr_eq(&found, &shared));

        found.lock().await.begin(Propagation::Required).await.unwrap();
        factory.close_session(&id).await.unwrap();

        assert!(factory.is_empty());
        assert!(factory.get_session(&id).is_none());
        assert!(shared.lock().await.is_closed());
        assert_eq!(db.events(), vec!["begin#1", "rollback#1"]);
    }

    #[tokio::test]
    async fn test_close_unknown_session() {
        let factory = SessionFactory::new(MockDatabase::new());
        let err = factory.close_session("missing").await.unwrap_err();
        assert!(matches!(err, Error::SessionNotFound { ref id } if id == "missing"));
    }

    #[tokio::test]
    async fn test_close_already_closed_session_unregisters_it() {
        let factory = SessionFactory::new(MockDatabase::new());
        let shared = factory.new_session();
        let id = shared.lock().await.id().to_string();
        shared.lock().await.close().await.unwrap();

        factory.close_session(&id).await.unwrap();
        assert!(factory.is_empty());
    }

    #[tokio::test]
    async fn test_close_all() {
        let db = MockDatabase::new();
        let factory = SessionFactory::new(db.clone());
        let first = factory.new_session();
        let second = factory.new_session();
        second.lock().await.begin(Propagation::Required).await.unwrap();

        factory.close_all().await.unwrap();
        assert!(factory.is_empty());
        assert!(first.lock().await.is_closed());
        assert!(second.lock().await.is_closed());
        assert_eq!(db.count("rollback#"), 1);
    }

    #[tokio::test]
    async fn test_sessions_follow_config() {
        let config = Config {
            enable_log: false,
            dialect: Some(Dialect::Postgres),
            default_propagation: Propagation::Nested,
        };
        let factory = SessionFactory::with_config(MockDatabase::new(), config);
        let shared = factory.new_session();
        let mut session = shared.lock().await;
        assert_eq!(session.dialect(), Dialect::Postgres);

        session.begin_default().await.unwrap();
        // NESTED without a transaction starts a REQUIRED one
        assert_eq!(session.last_propagation(), Some(Propagation::Required));
    }

    #[test]
    fn test_sql_builder_follows_config() {
        let config = Config {
            enable_log: true,
            ..Config::default()
        };
        let factory = SessionFactory::with_config(MockDatabase::new(), config);
        let builder = factory.sql_builder(Arc::new(crate::testing::ToyEngine::default()));
        assert!(builder.enable_log());
    }

    #[test]
    fn test_session_handles_are_send() {
        fn assert_send<T: Send + Sync>() {}
        assert_send::<SharedSession<MockDatabase>>();
        assert_send::<SessionFactory<MockDatabase>>();
    }
}
