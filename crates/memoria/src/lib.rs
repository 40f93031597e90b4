//! Memoria - multi-tenant memory subsystem for agent workloads
//!
//! Provides short-term ephemeral recall with expiry, a long-term
//! semantic archive with similarity search, a deduplicating ingestion
//! pipeline, and per-tenant policy enforcement. The boundary is a
//! callable interface; hosts own any transport in front of it.

pub mod archivist;
pub mod config;
pub mod coordinator;
pub mod embedding;
pub mod error;
pub mod librarian;
pub mod logging;
pub mod memory;
pub mod policy;
pub mod scribe;
pub mod service;
pub mod testing;

pub use error::MemoriaError;
