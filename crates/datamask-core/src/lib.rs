//! Core contracts and helpers for Datamask.
//!
//! This crate defines the row/value model, the relational collaborator
//! traits implemented by store adapters, connection configuration, and
//! utilities shared across the anonymizer engine and the CLI.

pub mod config;
pub mod error;
pub mod redaction;
pub mod schema;
pub mod store;
pub mod value;

pub use config::{ConnectionConfig, ConnectionRole, ConnectionsConfig};
pub use error::{Error, Result};
pub use redaction::{RedactedConnection, redact_connection_string};
pub use schema::{ColumnDefinition, IdentityGeneration, QualifiedName, TableDefinition, quote_ident};
pub use store::{Catalog, DataStore, SelectQuery, Window};
pub use value::{Row, Value};
