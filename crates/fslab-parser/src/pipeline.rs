//! Ordered extraction pipeline for one trial.
//!
//! Stages run in declaration order over one shared attribute accumulator.
//! Each stage reads exactly one artifact. After the last stage the outcome is
//! classified, timings are normalized and the record is frozen into a
//! [`TrialRecord`].

use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;

use tracing::debug;

use crate::config::{ArtifactNames, ParserConfig, TotalTimeSource};
use crate::error::{ParseError, Result};
use crate::normalize::{normalize_timings, MIN_TIME};
use crate::outcome::{classify, ErrorKind, Outcome};
use crate::record::{attr, Properties};
use crate::report::{decode_report, ReportState};
use crate::rules::{rules_for, Artifact};

/// Raw artifact contents. A missing file is `None`.
#[derive(Debug, Clone, Default)]
pub struct TrialArtifacts {
    pub driver_log: Option<String>,
    pub solver_log: Option<String>,
    pub report: Option<String>,
}

impl TrialArtifacts {
    /// Reads the artifacts of `run_dir`. Absent files are not an error.
    pub fn load(run_dir: &Path, names: &ArtifactNames) -> Result<Self> {
        Ok(Self {
            driver_log: read_optional(&run_dir.join(names.file_name(Artifact::DriverLog)))?,
            solver_log: read_optional(&run_dir.join(names.file_name(Artifact::SolverLog)))?,
            report: read_optional(&run_dir.join(names.file_name(Artifact::Report)))?,
        })
    }

    pub fn get(&self, artifact: Artifact) -> Option<&str> {
        match artifact {
            Artifact::DriverLog => self.driver_log.as_deref(),
            Artifact::SolverLog => self.solver_log.as_deref(),
            Artifact::Report => self.report.as_deref(),
        }
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
        Err(e) => Err(ParseError::io(path, e)),
    }
}

#[derive(Debug, Default)]
struct PropertyRecord {
    attributes: Properties,
    report: Option<ReportState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Applies every rule bound to the artifact, in table order.
    Extract(Artifact),
    DecodeReport,
}

impl Stage {
    pub fn artifact(&self) -> Artifact {
        match self {
            Stage::Extract(artifact) => *artifact,
            Stage::DecodeReport => Artifact::Report,
        }
    }

    pub fn writes(&self) -> Vec<&'static str> {
        match self {
            Stage::Extract(artifact) => rules_for(*artifact).flat_map(|r| r.attributes()).collect(),
            Stage::DecodeReport => Vec::new(),
        }
    }

    fn apply(&self, artifacts: &TrialArtifacts, record: &mut PropertyRecord) -> Result<()> {
        let content = artifacts.get(self.artifact());
        match self {
            Stage::Extract(artifact) => {
                let text = content.unwrap_or("");
                for rule in rules_for(*artifact) {
                    rule.apply(text, &mut record.attributes)?;
                }
            }
            Stage::DecodeReport => {
                record.report = Some(decode_report(content));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
    min_time: f64,
    total_time: TotalTimeSource,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            stages: vec![
                Stage::Extract(Artifact::DriverLog),
                Stage::Extract(Artifact::SolverLog),
                Stage::DecodeReport,
            ],
            min_time: MIN_TIME,
            total_time: TotalTimeSource::default(),
        }
    }
}

impl Pipeline {
    pub fn from_config(config: &ParserConfig) -> Self {
        Self {
            min_time: config.min_time,
            total_time: config.total_time,
            ..Self::default()
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn run(&self, artifacts: &TrialArtifacts) -> Result<TrialRecord> {
        let mut record = PropertyRecord::default();
        for stage in &self.stages {
            stage.apply(artifacts, &mut record)?;
            debug!(stage = ?stage, attributes = record.attributes.len(), "stage complete");
        }

        let report = record.report.take().unwrap_or(ReportState::Empty);
        let mut outcome = classify(&record.attributes, &report, self.total_time);
        normalize_timings(&mut outcome, self.min_time);

        let mut attributes = record.attributes;
        outcome.write_into(&mut attributes);
        Ok(TrialRecord {
            attributes,
            outcome,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecord {
    attributes: Properties,
    outcome: Outcome,
}

impl TrialRecord {
    pub fn attributes(&self) -> &Properties {
        &self.attributes
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn error_kind(&self) -> ErrorKind {
        self.outcome.error_kind()
    }

    pub fn coverage(&self) -> bool {
        self.outcome.coverage()
    }

    pub fn node(&self) -> Option<&str> {
        self.attributes.get_str(attr::NODE)
    }

    pub fn into_attributes(self) -> Properties {
        self.attributes
    }
}
