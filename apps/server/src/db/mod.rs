//! Database access: the staging-store batch writer.

pub mod staging;

pub use staging::StagingStore;
