//! Relational table anonymization engine for Datamask.
//!
//! Tables are declared through an [`Anonymizer`] (per-column rules), turned
//! into a callback [`Registry`], and driven chunk by chunk by the [`Manager`]
//! from a source [`DataStore`](datamask_core::DataStore) into a destination.

pub mod anonymizer;
pub mod checker;
pub mod config;
pub mod errors;
pub mod faker;
pub mod functions;
pub mod helpers;
pub mod manager;
pub mod memory;
pub mod prepare;
pub mod registry;
pub mod report;
pub mod row_modifier;
pub mod rules;
pub mod schema_sync;
pub mod staged;
pub mod transform;

pub use anonymizer::{Anonymizer, ChunkState, MAX_CHUNK_SIZE, RuleBuilder};
pub use checker::Checker;
pub use config::{ColumnConfig, RunSettings, TableConfig};
pub use errors::{AnonymizeError, Result};
pub use faker::{FakeKind, FakeSource, ValueSource};
pub use functions::Functions;
pub use manager::{ConnectionSet, Manager};
pub use memory::{MemoryCatalog, MemoryStore};
pub use registry::Registry;
pub use report::{
    CheckReport, DuplicatePair, FailurePolicy, ReconcileReport, RunReport, RunStatus, TableReport,
    WriteMode,
};
pub use row_modifier::RowModifier;
pub use rules::{ColumnContext, DateUnit, Rule};
pub use schema_sync::SchemaReconciler;

/// Builder traits needed for the fluent declaration API.
pub mod prelude {
    pub use crate::anonymizer::RuleBuilder;
    pub use crate::functions::Functions;
}
