//! fristwatch -- Response-time compliance analytics for emergency dispatch data.
//!
//! This crate provides the core library for dispatch record preprocessing,
//! compliance KPIs, statistical anomaly detection, pattern detection, and
//! severity-ranked insight generation.

pub mod analysis;
pub mod config;
pub mod detect;
pub mod records;

pub use config::EngineConfig;
pub use detect::engine::InsightEngine;
pub use detect::insight::{Insight, InsightBundle};
pub use records::DispatchRecord;

/// Run the full detection pass over a batch with default thresholds.
///
/// The engine is a pure function of its input: the same batch always yields
/// the same ordered bundle. Detectors that lack a sufficient sample simply
/// contribute nothing.
pub fn generate_insights(records: &[DispatchRecord], max_insights: usize) -> InsightBundle {
    InsightEngine::new(EngineConfig::default()).generate(records, max_insights)
}
