//! Normalization of FHIR Bundle entries into flat staging rows.
//!
//! This crate is the pure core of the staging pipeline: it turns the
//! heterogeneous `entry` array of an inbound Bundle into typed Patient,
//! Encounter, and Observation rows, and joins Observations onto their owning
//! Encounter as a name-keyed JSON mapping. It performs no I/O and has no async
//! surface; queueing and persistence live in the server crate.
//!
//! Extraction is deliberately lenient: a record that lacks a required field is
//! dropped silently (a data-quality filter, not an error), and a missing
//! nested field never aborts processing of sibling records.

pub mod entry;
pub mod link;
pub mod normalize;
pub mod reference;
pub mod rows;

pub use entry::{resource_of, ResourceKind};
pub use link::link_observations;
pub use normalize::{normalize, NormalizedBundle};
pub use reference::local_id;
pub use rows::{Batch, EncounterRow, ObservationRecord, PatientRow};
