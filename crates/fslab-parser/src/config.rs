use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ParseError, Result};
use crate::normalize::MIN_TIME;
use crate::rules::Artifact;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactNames {
    pub driver_log: String,
    pub solver_log: String,
    pub report: String,
}

impl Default for ArtifactNames {
    fn default() -> Self {
        Self {
            driver_log: "driver.log".to_string(),
            solver_log: "run.log".to_string(),
            report: "results.json".to_string(),
        }
    }
}

impl ArtifactNames {
    pub fn file_name(&self, artifact: Artifact) -> &str {
        match artifact {
            Artifact::DriverLog => &self.driver_log,
            Artifact::SolverLog => &self.solver_log,
            Artifact::Report => &self.report,
        }
    }
}

/// How `total_time` is obtained from the results report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalTimeSource {
    Report,
    /// `time_backend` plus the `time_frontend` extracted from the solver log.
    FrontendPlusBackend,
    /// `total_time` when present, otherwise frontend plus backend.
    #[default]
    Auto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub artifacts: ArtifactNames,
    pub properties_file: String,
    pub static_properties_file: String,
    pub min_time: f64,
    pub total_time: TotalTimeSource,
    /// Worker threads for batch parsing; 0 uses one per logical CPU.
    pub jobs: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            artifacts: ArtifactNames::default(),
            properties_file: "properties".to_string(),
            static_properties_file: "static-properties".to_string(),
            min_time: MIN_TIME,
            total_time: TotalTimeSource::default(),
            jobs: 0,
        }
    }
}

impl ParserConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let data = fs::read_to_string(path).map_err(|e| ParseError::io(path, e))?;
                serde_yaml::from_str::<ParserConfig>(&data).map_err(|e| {
                    ParseError::Config(format!("{}: {}", path.display(), e))
                })?
            }
            None => ParserConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.min_time.is_finite() || self.min_time <= 0.0 {
            return Err(ParseError::Config(format!(
                "min_time must be a positive number, got {}",
                self.min_time
            )));
        }
        let names = [
            ("artifacts.driver_log", self.artifacts.driver_log.as_str()),
            ("artifacts.solver_log", self.artifacts.solver_log.as_str()),
            ("artifacts.report", self.artifacts.report.as_str()),
            ("properties_file", self.properties_file.as_str()),
            ("static_properties_file", self.static_properties_file.as_str()),
        ];
        let mut errors = Vec::new();
        for (field, name) in names {
            if name.trim().is_empty() {
                errors.push(format!("{} must not be empty", field));
            } else if name.contains('/') || name.contains('\\') {
                errors.push(format!("{} must be a plain file name: {}", field, name));
            }
        }
        if !errors.is_empty() {
            return Err(ParseError::Config(errors.join("; ")));
        }
        Ok(())
    }
}
