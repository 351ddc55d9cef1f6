//! Entity extraction for Sluice workflows.
//!
//! Extractors run over every ASR hypothesis of a turn, then agree on a single
//! scored list with [`consensus`] and one post-filter. Two extractors ship
//! here:
//!
//! - [`ServiceEntityPlugin`] asks an [`EntityService`] (such as a
//!   [`DucklingClient`]) to parse each hypothesis, then types the answers as
//!   time, number, people, currency or duration entities.
//! - [`ListEntityPlugin`] matches a table of keyword patterns.
//!
//! Two plugins post-process the reconciled entities:
//! [`CombineDateTimePlugin`] completes a date or time with the half tracked
//! from an earlier turn, and [`CanonicalizationPlugin`] masks entity spans
//! in transcripts for classifiers.

mod canonicalization;
mod column;
mod combine_date_time;
mod duckling;
mod extractor;
mod list;
mod scoring;
pub mod service;

pub use canonicalization::{CanonicalizationConfig, CanonicalizationPlugin};
pub use column::TransformColumns;
pub use combine_date_time::{CombineDateTimeConfig, CombineDateTimePlugin};
pub use duckling::{DucklingClient, DucklingConfig};
pub use extractor::{MAX_IN_FLIGHT, ServiceEntityConfig, ServiceEntityPlugin};
pub use list::{CandidateTable, ListEntityConfig, ListEntityPlugin};
pub use scoring::{Scoring, consensus, temporal_filter, threshold_filter};
pub use service::{EntityService, ParseQuery, RawEntity, decode};
