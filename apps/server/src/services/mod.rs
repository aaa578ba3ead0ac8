pub mod ingest;

pub use ingest::{IngestReceipt, IngestService};
