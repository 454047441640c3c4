//! Lead scoring for rental CRM batches.
//!
//! A run derives quality signals from each lead, turns them into weak labels,
//! trains a bagged forest and a boosted ensemble on a stratified split, keeps
//! the better one by held-out AUC and scores the whole batch 0-100 with a
//! Cold/Warm/Hot tier.
pub mod config;
pub mod error;
pub mod explain;
pub mod features;
pub mod io;
pub mod labels;
pub mod model;
pub mod pipeline;
pub mod preprocess;
pub mod report;
pub mod score;
pub mod usage;

pub use config::PipelineConfig;
pub use error::{LeadScoreError, Result};
pub use io::{LeadRecord, LeadTable};
pub use pipeline::{run, run_with_usage};
pub use report::ScoringReport;
