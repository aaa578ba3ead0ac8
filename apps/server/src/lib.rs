//! Silo — FHIR Bundle staging pipeline.
//!
//! Ingests FHIR Bundles over HTTP, normalizes Patient/Encounter/Observation
//! resources into flat rows (see the `silo-bundle` crate), and persists them
//! into a Postgres staging schema through an asynchronous, idempotent batch
//! upsert driven by a Postgres-backed job queue.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod queue;
pub mod services;
pub mod state;
pub mod workers;

pub use error::{Error, Result};
