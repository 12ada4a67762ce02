//! Outcome classification.
//!
//! `classify` is the single place where `error` and `coverage` are decided.
//! The checks form a short-circuiting chain; the first one that applies wins.

use serde::Serialize;
use std::fmt;

use crate::config::TotalTimeSource;
use crate::record::{attr, Properties};
use crate::report::{PlannerReport, ReportState};

/// Closed error taxonomy written to the `error` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ErrorKind {
    #[serde(rename = "all-good")]
    AllGood,
    #[serde(rename = "unsolvable-or-error")]
    UnsolvableOrError,
    #[serde(rename = "json-output-is-empty")]
    JsonOutputIsEmpty,
    #[serde(rename = "json-output-parse-error")]
    JsonOutputParseError,
    #[serde(rename = "out-of-memory")]
    OutOfMemory,
    #[serde(rename = "invalid-plan")]
    InvalidPlan,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::AllGood,
        ErrorKind::UnsolvableOrError,
        ErrorKind::JsonOutputIsEmpty,
        ErrorKind::JsonOutputParseError,
        ErrorKind::OutOfMemory,
        ErrorKind::InvalidPlan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AllGood => "all-good",
            ErrorKind::UnsolvableOrError => "unsolvable-or-error",
            ErrorKind::JsonOutputIsEmpty => "json-output-is-empty",
            ErrorKind::JsonOutputParseError => "json-output-parse-error",
            ErrorKind::OutOfMemory => "out-of-memory",
            ErrorKind::InvalidPlan => "invalid-plan",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Memory and timing figures reported by a trial that ran to completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceUsage {
    pub memory: Option<i64>,
    pub search_time: Option<f64>,
    pub total_time: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolvedRun {
    pub usage: ResourceUsage,
    pub plan_length: Option<i64>,
    pub expansions: Option<i64>,
    pub generations: Option<i64>,
    pub evaluations: Option<i64>,
    pub plan: Option<Vec<String>>,
    pub gen_per_second: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    PlannerError { exit_code: i64 },
    ReportEmpty,
    ReportMalformed { message: String },
    OutOfMemory,
    InvalidPlan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Solved(SolvedRun),
    /// The planner finished without a plan and without running out of memory.
    Unsolvable(ResourceUsage),
    Failed(Failure),
}

impl Outcome {
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            Outcome::Solved(_) | Outcome::Unsolvable(_) => ErrorKind::AllGood,
            Outcome::Failed(Failure::PlannerError { .. }) => ErrorKind::UnsolvableOrError,
            Outcome::Failed(Failure::ReportEmpty) => ErrorKind::JsonOutputIsEmpty,
            Outcome::Failed(Failure::ReportMalformed { .. }) => ErrorKind::JsonOutputParseError,
            Outcome::Failed(Failure::OutOfMemory) => ErrorKind::OutOfMemory,
            Outcome::Failed(Failure::InvalidPlan) => ErrorKind::InvalidPlan,
        }
    }

    pub fn coverage(&self) -> bool {
        matches!(self, Outcome::Solved(_))
    }

    pub fn unsolvable(&self) -> bool {
        matches!(self, Outcome::Unsolvable(_))
    }

    pub fn usage(&self) -> Option<&ResourceUsage> {
        match self {
            Outcome::Solved(run) => Some(&run.usage),
            Outcome::Unsolvable(usage) => Some(usage),
            Outcome::Failed(_) => None,
        }
    }

    pub(crate) fn usage_mut(&mut self) -> Option<&mut ResourceUsage> {
        match self {
            Outcome::Solved(run) => Some(&mut run.usage),
            Outcome::Unsolvable(usage) => Some(usage),
            Outcome::Failed(_) => None,
        }
    }

    /// Writes the outcome attributes over `props`. Report values replace any
    /// provisional value extracted from the logs.
    pub fn write_into(&self, props: &mut Properties) {
        props.set(attr::ERROR, self.error_kind().as_str());
        props.set(attr::COVERAGE, i64::from(self.coverage()));

        match self {
            Outcome::Failed(Failure::PlannerError { .. }) | Outcome::Failed(Failure::ReportEmpty) => {}
            Outcome::Failed(Failure::ReportMalformed { message }) => {
                props.set(attr::JSON_OUTPUT_ERROR, message.as_str());
            }
            Outcome::Failed(Failure::OutOfMemory) => {
                props.set(attr::OUT_OF_MEMORY, true);
            }
            Outcome::Failed(Failure::InvalidPlan) => {
                props.set(attr::OUT_OF_MEMORY, false);
            }
            Outcome::Unsolvable(usage) => {
                props.set(attr::OUT_OF_MEMORY, false);
                props.set(attr::UNSOLVABLE, true);
                usage.write_into(props);
            }
            Outcome::Solved(run) => {
                props.set(attr::OUT_OF_MEMORY, false);
                props.set(attr::UNSOLVABLE, false);
                run.usage.write_into(props);
                set_opt(props, attr::PLAN_LENGTH, run.plan_length);
                set_opt(props, attr::EXPANSIONS, run.expansions);
                set_opt(props, attr::GENERATIONS, run.generations);
                set_opt(props, attr::EVALUATIONS, run.evaluations);
                if let Some(plan) = &run.plan {
                    props.set(attr::PLAN, plan.join(", "));
                }
                set_opt(props, attr::NODE_GENERATION_RATE, run.gen_per_second);
            }
        }
    }
}

impl ResourceUsage {
    fn write_into(&self, props: &mut Properties) {
        set_opt(props, attr::MEMORY, self.memory);
        set_opt(props, attr::SEARCH_TIME, self.search_time);
        set_opt(props, attr::TOTAL_TIME, self.total_time);
    }
}

fn set_opt<T: Into<crate::record::PropValue>>(props: &mut Properties, key: &str, value: Option<T>) {
    if let Some(value) = value {
        props.set(key, value);
    }
}

/// Resolves the outcome from the attributes gathered so far and the decoded
/// report.
pub fn classify(props: &Properties, report: &ReportState, total_time: TotalTimeSource) -> Outcome {
    if let Some(exit_code) = props.get_i64(attr::PLANNER_EXIT_CODE) {
        if exit_code != 0 {
            return Outcome::Failed(Failure::PlannerError { exit_code });
        }
    }

    let report = match report {
        ReportState::Empty => return Outcome::Failed(Failure::ReportEmpty),
        ReportState::Malformed(message) => {
            return Outcome::Failed(Failure::ReportMalformed {
                message: message.clone(),
            })
        }
        ReportState::Decoded(report) => report,
    };

    if report.out_of_memory == Some(true) {
        return Outcome::Failed(Failure::OutOfMemory);
    }

    match report.valid {
        Some(false) => return Outcome::Failed(Failure::InvalidPlan),
        Some(true) => {}
        None => {
            return Outcome::Failed(Failure::ReportMalformed {
                message: "missing field `valid`".to_string(),
            })
        }
    }

    let usage = ResourceUsage {
        memory: report.memory,
        search_time: report.search_time,
        total_time: resolve_total_time(report, props, total_time),
    };

    if report.solved != Some(true) {
        return Outcome::Unsolvable(usage);
    }

    Outcome::Solved(SolvedRun {
        usage,
        plan_length: report.plan_length,
        expansions: report.expanded,
        generations: report.generated,
        evaluations: report.evaluated,
        plan: report.plan.clone(),
        gen_per_second: report.gen_per_second,
    })
}

fn resolve_total_time(report: &PlannerReport, props: &Properties, source: TotalTimeSource) -> Option<f64> {
    let combined = || {
        report
            .time_backend
            .map(|backend| backend + props.get_f64(attr::TIME_FRONTEND).unwrap_or(0.0))
    };
    match source {
        TotalTimeSource::Report => report.total_time,
        TotalTimeSource::FrontendPlusBackend => combined(),
        TotalTimeSource::Auto => report.total_time.or_else(combined),
    }
}
