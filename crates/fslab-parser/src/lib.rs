//! Run-outcome classification and metrics extraction for FS planner trials.
//!
//! A trial leaves three artifacts in its run directory: the driver log, the
//! solver log and the JSON results report. [`Pipeline`] reads them in a fixed
//! order, accumulates attributes, classifies the outcome and emits a
//! finalized [`TrialRecord`]. The [`batch`] module runs
//! the pipeline over every run directory of an experiment in parallel.

pub mod batch;
pub mod config;
pub mod error;
pub mod normalize;
pub mod outcome;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod rules;

pub use batch::{
    discover_runs, parse_batch, parse_trial, write_batch_properties, write_properties, BatchSummary,
    TrialFailure, TrialResult,
};
pub use config::{ArtifactNames, ParserConfig, TotalTimeSource};
pub use error::{ParseError, Result};
pub use outcome::{classify, ErrorKind, Failure, Outcome, ResourceUsage, SolvedRun};
pub use pipeline::{Pipeline, Stage, TrialArtifacts, TrialRecord};
pub use record::{attr, PropValue, Properties};
pub use report::{decode_report, PlannerReport, ReportState};
pub use rules::{rules, Aggregation, Artifact, ExtractionRule};
