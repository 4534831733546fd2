use std::time::Duration;

use async_trait::async_trait;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio::{task, task::JoinHandle, time::timeout};
pub use tokio_postgres::types::{ToSql, Type as PgType};
use tokio_postgres::{config::SslMode, Client, Config, Error as PgError};
use tracing::{debug, error, warn};

use crate::manifest::db::ConnectionParams;

#[derive(thiserror::Error, Debug)]
pub enum PostgresConnectionError {
    #[error("Can not connect to the database please make sure your connection details are correct: {0}")]
    CanNotConnectToDatabase(PgError),

    #[error("Timed out after {0:?} connecting to the database")]
    ConnectTimeout(Duration),

    #[error("Could not create tls connector")]
    CouldNotCreateTlsConnector,
}

#[derive(thiserror::Error, Debug)]
pub enum PostgresError {
    #[error("PgError {0}")]
    PgError(#[from] PgError),

    #[error("The database connection has been closed")]
    ConnectionClosed,
}

/// A live connection used serially by one load call.
///
/// `execute` opens a transaction on first use and `commit` ends it, so each batch is applied as
/// one unit. Dropping the connection releases it; an uncommitted transaction is then rolled back
/// by the server.
#[async_trait]
pub trait Connection: Send {
    async fn execute(
        &mut self,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, PostgresError>;

    async fn commit(&mut self) -> Result<(), PostgresError>;

    /// Closes the connection gracefully, waiting for the server to acknowledge.
    async fn close(self)
    where
        Self: Sized,
    {
    }
}

/// Opens a fresh physical connection on every call.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    type Connection: Connection;

    async fn connect(&self) -> Result<Self::Connection, PostgresConnectionError>;
}

pub struct PostgresConnection {
    client: Client,
    connection_handle: JoinHandle<()>,
    in_transaction: bool,
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn execute(
        &mut self,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, PostgresError> {
        if self.client.is_closed() {
            return Err(PostgresError::ConnectionClosed);
        }

        if !self.in_transaction {
            self.client.batch_execute("BEGIN").await?;
            self.in_transaction = true;
        }

        self.client.execute(statement, params).await.map_err(PostgresError::PgError)
    }

    async fn commit(&mut self) -> Result<(), PostgresError> {
        if self.in_transaction {
            self.client.batch_execute("COMMIT").await?;
            self.in_transaction = false;
        }

        Ok(())
    }

    async fn close(self) {
        if self.in_transaction {
            warn!("Closing a connection with an uncommitted transaction, it will be rolled back");
        }

        drop(self.client);
        if let Err(e) = self.connection_handle.await {
            warn!("Connection task did not shut down cleanly: {}", e);
        }
    }
}

pub struct PostgresConnectionProvider {
    params: ConnectionParams,
}

impl PostgresConnectionProvider {
    pub fn new(params: ConnectionParams) -> Self {
        PostgresConnectionProvider { params }
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    async fn open(&self, config: &Config) -> Result<PostgresConnection, PostgresConnectionError> {
        let connector = TlsConnector::builder()
            .build()
            .map_err(|_| PostgresConnectionError::CouldNotCreateTlsConnector)?;
        let tls_connector = MakeTlsConnector::new(connector);

        let connect_timeout = self.params.connect_timeout();
        let connecting = config.connect(tls_connector);
        let (client, connection) = match timeout(connect_timeout, connecting).await {
            Ok(Ok((client, connection))) => (client, connection),
            Ok(Err(e)) => {
                error!("Error connecting to database: {}", e);
                return Err(PostgresConnectionError::CanNotConnectToDatabase(e));
            }
            Err(e) => {
                error!("Timeout connecting to database: {}", e);
                return Err(PostgresConnectionError::ConnectTimeout(connect_timeout));
            }
        };

        // The connection future drives the socket and resolves once the client is dropped
        let connection_handle = task::spawn(async move {
            if let Err(e) = connection.await {
                error!("Postgres connection error: {}", e);
            }
        });

        Ok(PostgresConnection { client, connection_handle, in_transaction: false })
    }
}

#[async_trait]
impl ConnectionProvider for PostgresConnectionProvider {
    type Connection = PostgresConnection;

    async fn connect(&self) -> Result<PostgresConnection, PostgresConnectionError> {
        let config = self.params.pg_config();

        match self.open(config).await {
            Ok(connection) => {
                debug!("Opened database connection");
                Ok(connection)
            }
            // retry without ssl if ssl has been attempted and failed
            Err(PostgresConnectionError::CanNotConnectToDatabase(e))
                if self.params.allows_plaintext_fallback() =>
            {
                warn!("Could not connect with SSL ({}), retrying without SSL", e);
                let mut config = config.clone();
                config.ssl_mode(SslMode::Disable);
                self.open(&config).await
            }
            Err(e) => Err(e),
        }
    }
}
