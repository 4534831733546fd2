use std::{env, time::Duration};

use dotenv::dotenv;
use serde::{Deserialize, Serialize};
use tokio_postgres::{config::SslMode as PgSslMode, Config};

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
}

impl From<SslMode> for PgSslMode {
    fn from(mode: SslMode) -> Self {
        match mode {
            SslMode::Disable => PgSslMode::Disable,
            SslMode::Prefer => PgSslMode::Prefer,
            SslMode::Require => PgSslMode::Require,
        }
    }
}

/// The `DB` section of the config file.
///
/// Either `url` or the discrete keys are used; when `url` is present the other keys are ignored.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct DbDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, alias = "database", skip_serializing_if = "Option::is_none")]
    pub dbname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sslmode: Option<SslMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_name: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConnectionParamsError {
    #[error("The database connection string is wrong please check your environment: {0}")]
    DatabaseConnectionConfigWrong(#[from] env::VarError),

    #[error("Could not parse connection string make sure it is correctly formatted")]
    CouldNotParseConnectionString,

    #[error("The DB section needs either a url or a host")]
    MissingHost,
}

pub fn connection_string() -> Result<String, env::VarError> {
    dotenv().ok();
    let connection = env::var("DATABASE_URL")?;
    Ok(connection)
}

/// Immutable connection parameters, built once at startup and handed to the connection provider.
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    config: Config,
    connect_timeout: Duration,
    ssl_mode_explicit: bool,
}

impl ConnectionParams {
    pub fn from_url(url: &str) -> Result<Self, ConnectionParamsError> {
        let config: Config =
            url.parse().map_err(|_| ConnectionParamsError::CouldNotParseConnectionString)?;

        Ok(Self {
            connect_timeout: config
                .get_connect_timeout()
                .copied()
                .unwrap_or(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)),
            ssl_mode_explicit: url.contains("sslmode="),
            config,
        })
    }

    /// Reads `DATABASE_URL` (loading `.env` first).
    pub fn from_env() -> Result<Self, ConnectionParamsError> {
        let url = connection_string()?;
        Self::from_url(&url)
    }

    pub fn from_details(details: &DbDetails) -> Result<Self, ConnectionParamsError> {
        if let Some(url) = &details.url {
            return Self::from_url(url);
        }

        let host = details.host.as_deref().ok_or(ConnectionParamsError::MissingHost)?;

        let mut config = Config::new();
        config.host(host);

        if let Some(port) = details.port {
            config.port(port);
        }
        if let Some(user) = &details.user {
            config.user(user);
        }
        if let Some(password) = &details.password {
            config.password(password);
        }
        if let Some(dbname) = &details.dbname {
            config.dbname(dbname);
        }
        if let Some(application_name) = &details.application_name {
            config.application_name(application_name);
        }
        config.ssl_mode(details.sslmode.unwrap_or_default().into());

        let connect_timeout = Duration::from_secs(
            details.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        );
        config.connect_timeout(connect_timeout);

        Ok(Self { config, connect_timeout, ssl_mode_explicit: details.sslmode.is_some() })
    }

    pub fn pg_config(&self) -> &Config {
        &self.config
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Whether a failed TLS attempt may be retried without SSL.
    pub fn allows_plaintext_fallback(&self) -> bool {
        !self.ssl_mode_explicit && self.config.get_ssl_mode() == PgSslMode::Prefer
    }
}

impl TryFrom<&DbDetails> for ConnectionParams {
    type Error = ConnectionParamsError;

    fn try_from(details: &DbDetails) -> Result<Self, Self::Error> {
        Self::from_details(details)
    }
}
