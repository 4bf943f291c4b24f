//! Persistence for ingested records.
//!
//! - [`sink`]: the date-partitioned [`sink::PartitionSink`] both pipelines write to

pub mod sink;
