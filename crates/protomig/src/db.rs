//! The database boundary: introspection and transactional execution.

use crate::{ConnectionExt, Error, Result, introspect_schema};
use protomig_schema::Schema;
use std::future::Future;
use tokio_postgres::{Client, NoTls};

/// Schema used when none is configured.
pub const DEFAULT_SCHEMA: &str = "public";

/// What the migration pipeline needs from a database.
pub trait Database {
    /// Read the current structure of the database.
    fn introspect(&mut self) -> impl Future<Output = Result<Schema>>;

    /// Apply `statements` in order, all or nothing.
    fn execute(&mut self, statements: &[String]) -> impl Future<Output = Result<()>>;
}

/// A Postgres database, scoped to one schema.
pub struct PgDatabase {
    client: Client,
    schema: String,
}

impl PgDatabase {
    /// Wrap an already connected client.
    pub fn new(client: Client, schema: impl Into<String>) -> Self {
        Self {
            client,
            schema: schema.into(),
        }
    }

    /// Connect to `url` (a libpq-style connection string or URL).
    ///
    /// The connection is driven by a spawned task for as long as the client
    /// lives.
    pub async fn connect(url: &str, schema: impl Into<String>) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(url, NoTls)
            .await
            .map_err(Error::Connection)?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "database connection error");
            }
        });

        Ok(Self::new(client, schema))
    }

    /// The schema this database is scoped to.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// The underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl Database for PgDatabase {
    async fn introspect(&mut self) -> Result<Schema> {
        introspect_schema(&self.client, &self.schema)
            .await
            .map_err(Error::Introspection)
    }

    async fn execute(&mut self, statements: &[String]) -> Result<()> {
        let tx = self.client.transaction().await.map_err(Error::Transaction)?;

        if self.schema != DEFAULT_SCHEMA {
            let search_path = format!(
                "SET LOCAL search_path TO {}",
                protomig_sql::quote_ident(&self.schema)
            );
            tx.traced()
                .batch_execute(&search_path)
                .await
                .map_err(Error::Transaction)?;
        }

        for (i, statement) in statements.iter().enumerate() {
            if let Err(source) = tx.traced().batch_execute(statement).await {
                tracing::error!(
                    index = i,
                    statement = %statement,
                    error = %source,
                    "statement failed, rolling back"
                );
                // Dropping the transaction rolls it back.
                return Err(Error::Execution {
                    statement: statement.clone(),
                    source: source.into(),
                });
            }
        }

        tx.commit().await.map_err(Error::Transaction)?;
        tracing::debug!(statements = statements.len(), "transaction committed");
        Ok(())
    }
}
