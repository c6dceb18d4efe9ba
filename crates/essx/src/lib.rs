//! 🧬 essx — keeps Elasticsearch indices, templates and ingest pipelines looking
//! the way someone wrote them down.
//!
//! The core is [`reconciler::Reconciler`]: hand it a desired object, a resolved
//! connection, the last status and the lifecycle, get back what to persist and
//! when to look again. [`host`] is a small file-backed host that drives it. 🦆

pub mod admission;
pub mod app_config;
pub mod common;
pub mod compat;
pub mod connection;
pub mod engine;
pub mod finalizer;
pub mod gateway;
pub mod host;
pub mod reconciler;
pub mod schema;
pub mod status;
