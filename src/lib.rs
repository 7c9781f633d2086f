//! Reconciles two exam sittings for a cohort and derives statistics, risk
//! predictions and templated feedback per student.

pub mod aggregate;
pub mod analytics;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod feedback;
pub mod models;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod risk;
pub mod sheet;

pub use config::ScoringConfig;
pub use pipeline::{analyze_grids, analyze_records, AnalysisResult, StudentAnalysis};
