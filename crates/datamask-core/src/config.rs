use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Role of a named connection in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    Source,
    Destination,
    Catalog,
}

impl ConnectionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionRole::Source => "source",
            ConnectionRole::Destination => "destination",
            ConnectionRole::Catalog => "catalog",
        }
    }
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for one relational connection.
///
/// Either `url` or the `host`/`username`/`database` triple must be set.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConnectionConfig {
    #[serde(default = "default_driver")]
    pub driver: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Namespace holding the tables (Postgres schema).
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Prefix prepended to every logical table name on this connection.
    #[serde(default)]
    pub prefix: String,
}

fn default_driver() -> String {
    "postgres".to_string()
}

fn default_schema() -> String {
    "public".to_string()
}

impl ConnectionConfig {
    /// Build the connection URL, failing on missing parameters.
    pub fn connection_url(&self, role: ConnectionRole) -> Result<String> {
        if self.driver != "postgres" && self.driver != "postgresql" {
            return Err(Error::Unsupported(format!(
                "{role} connection driver '{}'",
                self.driver
            )));
        }
        if let Some(url) = &self.url {
            if url.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("{role} connection url is empty")));
            }
            return Ok(url.clone());
        }

        let host = required(role, "host", self.host.as_deref())?;
        let username = required(role, "username", self.username.as_deref())?;
        let database = required(role, "database", self.database.as_deref())?;
        let auth = match self.password.as_deref() {
            Some(password) if !password.is_empty() => format!("{username}:{password}"),
            _ => username.to_string(),
        };
        let port = self.port.map(|port| format!(":{port}")).unwrap_or_default();
        Ok(format!("postgres://{auth}@{host}{port}/{database}"))
    }
}

fn required<'a>(role: ConnectionRole, field: &str, value: Option<&'a str>) -> Result<&'a str> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::InvalidConfig(format!(
            "{role} connection requires '{field}'"
        ))),
    }
}

/// The three named connections a run needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ConnectionsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ConnectionConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<ConnectionConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<ConnectionConfig>,
}

impl ConnectionsConfig {
    pub fn get(&self, role: ConnectionRole) -> Result<&ConnectionConfig> {
        let config = match role {
            ConnectionRole::Source => self.source.as_ref(),
            ConnectionRole::Destination => self.destination.as_ref(),
            ConnectionRole::Catalog => self.catalog.as_ref(),
        };
        config.ok_or_else(|| Error::InvalidConfig(format!("missing {role} connection")))
    }

    /// Check that every connection is present and complete.
    pub fn validate(&self) -> Result<()> {
        for role in [
            ConnectionRole::Source,
            ConnectionRole::Destination,
            ConnectionRole::Catalog,
        ] {
            self.get(role)?.connection_url(role)?;
        }
        Ok(())
    }
}
