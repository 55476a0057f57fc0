use sqlweave_core::{
    Environment, ExpressionError, Node, Params, Propagation, SessionFactory, SqlxDatabase, Value,
};
use sqlx::any::AnyPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Understands only `name != null` style tests, enough for this demo
fn engine(expression: &str, env: &Environment) -> Result<Value, ExpressionError> {
    match expression.split_once("!=") {
        Some((name, rhs)) if rhs.trim() == "null" => {
            let value = env.resolve(name.trim()).unwrap_or(Value::Null);
            Ok(Value::Bool(!value.is_null()))
        }
        _ => Err(ExpressionError::new(format!("unsupported test `{expression}`"))),
    }
}

fn params(pairs: &[(&str, Value)]) -> Params {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[tokio::main]
async fn main() -> sqlweave_core::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sqlweave_core=debug")))
        .init();

    // one connection keeps a single in-memory database alive
    sqlx::any::install_default_drivers();
    let pool = AnyPoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let database = SqlxDatabase::from_pool(pool, "sqlite::memory:");
    let factory = SessionFactory::new(database);
    let builder = factory.sql_builder(Arc::new(engine));

    let shared = factory.new_session();
    let session_id = shared.lock().await.id().to_string();
    {
        let mut session = shared.lock().await;
        session
            .exec("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, status TEXT)")
            .await?;

        session.begin(Propagation::Required).await?;
        for (id, name) in [(1, "alice"), (2, "bob"), (3, "carol")] {
            session
                .exec_prepared(
                    "INSERT INTO users (id, name, status) VALUES (?, ?, 'active')",
                    &[Value::I32(id), Value::from(name)],
                )
                .await?;
        }

        // a savepoint-scoped change that gets undone
        session.begin(Propagation::Nested).await?;
        session.exec("DELETE FROM users").await?;
        session.rollback().await?;
        session.commit().await?;
    }

    let template = vec![
        Node::text("SELECT id, name FROM users WHERE 1=1 "),
        Node::if_("id != null", vec![Node::text(" AND id = #{id}")]),
        Node::if_("status != null", vec![Node::text(" AND status = #{status}")]),
    ];

    for call in [
        params(&[("id", Value::I32(2))]),
        params(&[("id", Value::Null), ("status", Value::from("active"))]),
    ] {
        let bound = builder.build(&call, &template)?;
        println!("{} {:?}", bound.sql(), bound.args());

        let rows = shared.lock().await.query_bound(&bound).await?;
        for row in rows {
            println!(
                "  id={} name={}",
                row.get_str("id").unwrap_or("?"),
                row.get_str("name").unwrap_or("?")
            );
        }
    }

    factory.close_session(&session_id).await?;
    Ok(())
}
