//! sharekeep-custody: session key-part store, key builders, custody facade
//! and the legacy-to-SSS migration job

pub mod builder;
pub mod factory;
pub mod keypart;
pub mod memory;
pub mod migration;
pub mod service;

pub use builder::{BuilderKind, KeyBuilder, PlainBuilder, SessionBuilder};
pub use factory::KeyCustodyFactory;
pub use keypart::{KeyPartStore, MemoryKeyPartStore};
pub use memory::{MemoryProjectRepository, MemoryShareRepository};
pub use migration::{
    ExclusiveGuard, ExclusiveRunner, LocalExclusive, MigrationJob, MigrationOutcome,
};
pub use service::{CustodyService, KeySource};
