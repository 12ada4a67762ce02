//! Declarative extraction rules for the free-text artifacts.
//!
//! Each rule is one regular expression bound to one artifact. Captured groups
//! map positionally onto [`Capture`] slots. A rule either keeps the last match
//! in document order or sums every match; that choice belongs to the rule.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::error::{ParseError, Result};
use crate::record::{attr, PropValue, Properties};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    DriverLog,
    SolverLog,
    Report,
}

impl Artifact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Artifact::DriverLog => "driver_log",
            Artifact::SolverLog => "solver_log",
            Artifact::Report => "report",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Most recent occurrence wins.
    Last,
    /// Every occurrence is added up.
    Sum,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decoder {
    Int,
    Float,
    Text,
    /// Integer multiplied by a constant factor.
    Scaled(i64),
    /// Process exit status. Out-of-range values saturate and stay non-zero.
    ExitStatus,
}

impl Decoder {
    pub fn decode(&self, raw: &str) -> Option<PropValue> {
        let raw = raw.trim();
        match self {
            Decoder::Int => raw.parse::<i64>().ok().map(PropValue::Int),
            Decoder::Float => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(PropValue::Float),
            Decoder::Text if raw.is_empty() => None,
            Decoder::Text => Some(PropValue::Str(raw.to_string())),
            Decoder::Scaled(factor) => raw
                .parse::<i64>()
                .ok()
                .and_then(|v| v.checked_mul(*factor))
                .map(PropValue::Int),
            Decoder::ExitStatus => raw
                .parse::<i64>()
                .ok()
                .or_else(|| {
                    let digits = raw.strip_prefix('-').unwrap_or(raw);
                    (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
                        .then(|| if raw.starts_with('-') { i64::MIN } else { i64::MAX })
                })
                .map(PropValue::Int),
        }
    }
}

/// Value written when an optional rule does not match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fallback {
    Absent,
    Int(i64),
    Float(f64),
    Text(&'static str),
    Bool(bool),
}

impl Fallback {
    fn value(&self) -> Option<PropValue> {
        match self {
            Fallback::Absent => None,
            Fallback::Int(v) => Some(PropValue::Int(*v)),
            Fallback::Float(v) => Some(PropValue::Float(*v)),
            Fallback::Text(v) => Some(PropValue::Str((*v).to_string())),
            Fallback::Bool(v) => Some(PropValue::Bool(*v)),
        }
    }
}

#[derive(Debug)]
pub struct Capture {
    pub attribute: &'static str,
    pub decoder: Decoder,
    pub fallback: Fallback,
}

const fn capture(attribute: &'static str, decoder: Decoder, fallback: Fallback) -> Capture {
    Capture {
        attribute,
        decoder,
        fallback,
    }
}

#[derive(Debug)]
pub struct RuleSpec {
    pub name: &'static str,
    pub artifact: Artifact,
    pub pattern: &'static str,
    pub captures: &'static [Capture],
    pub aggregation: Aggregation,
    pub mandatory: bool,
}

static RULE_TABLE: &[RuleSpec] = &[
    RuleSpec {
        name: "node",
        artifact: Artifact::DriverLog,
        pattern: r"(?m)node: (.+)$",
        captures: &[capture(attr::NODE, Decoder::Text, Fallback::Absent)],
        aggregation: Aggregation::Last,
        mandatory: true,
    },
    RuleSpec {
        name: "planner_exit_code",
        artifact: Artifact::DriverLog,
        pattern: r"(?m)run-planner exit code: (-?\d+)",
        captures: &[capture(attr::PLANNER_EXIT_CODE, Decoder::ExitStatus, Fallback::Absent)],
        aggregation: Aggregation::Last,
        mandatory: false,
    },
    RuleSpec {
        name: "generation_rate",
        artifact: Artifact::SolverLog,
        pattern: r"Node generation rate after (\d+)K generations \(nodes/sec\.\): (\d+(?:\.\d+)?)\. Memory consumption: (\d+)\s*kB\.",
        captures: &[
            capture(attr::LAST_RECORDED_GENERATIONS, Decoder::Scaled(1000), Fallback::Absent),
            capture(attr::NODE_GENERATION_RATE, Decoder::Float, Fallback::Absent),
            capture(attr::MEMORY, Decoder::Int, Fallback::Absent),
        ],
        aggregation: Aggregation::Last,
        mandatory: false,
    },
    RuleSpec {
        name: "mem_before_mt",
        artifact: Artifact::SolverLog,
        pattern: r"\[WATCHPOINT\] Memory consumption before match-tree construction: (\d+)\s*kB",
        captures: &[capture(attr::MEM_BEFORE_MT, Decoder::Int, Fallback::Absent)],
        aggregation: Aggregation::Last,
        mandatory: false,
    },
    RuleSpec {
        name: "mem_before_search",
        artifact: Artifact::SolverLog,
        pattern: r"\[WATCHPOINT\] Memory consumption before search: (\d+)\s*kB",
        captures: &[capture(attr::MEM_BEFORE_SEARCH, Decoder::Int, Fallback::Absent)],
        aggregation: Aggregation::Last,
        mandatory: false,
    },
    RuleSpec {
        name: "last_recorded_time",
        artifact: Artifact::SolverLog,
        pattern: r"(?m)^\[[A-Z]+\]\s*\[\s*(\d+(?:\.\d+)?)\]",
        captures: &[capture(attr::LAST_RECORDED_TIME, Decoder::Float, Fallback::Absent)],
        aggregation: Aggregation::Last,
        mandatory: false,
    },
    RuleSpec {
        name: "reachability",
        artifact: Artifact::SolverLog,
        pattern: r"Reachability analysis: (\d+(?:\.\d+)?)s, (\d+)\s*kB",
        captures: &[
            capture(attr::TIME_REACHABILITY, Decoder::Float, Fallback::Absent),
            capture(attr::MEM_REACHABILITY, Decoder::Int, Fallback::Absent),
        ],
        aggregation: Aggregation::Last,
        mandatory: false,
    },
    RuleSpec {
        name: "frontend",
        artifact: Artifact::SolverLog,
        pattern: r"Preprocessing frontend: (\d+(?:\.\d+)?)s, (\d+)\s*kB",
        captures: &[
            capture(attr::TIME_FRONTEND, Decoder::Float, Fallback::Absent),
            capture(attr::MEM_FRONTEND, Decoder::Int, Fallback::Absent),
        ],
        aggregation: Aggregation::Last,
        mandatory: false,
    },
    RuleSpec {
        name: "successor_generator",
        artifact: Artifact::SolverLog,
        pattern: r"(?m)Successor generator: (\S+)",
        captures: &[capture(attr::SUCCESSOR_GENERATOR, Decoder::Text, Fallback::Text("unknown"))],
        aggregation: Aggregation::Last,
        mandatory: false,
    },
    RuleSpec {
        name: "num_reach_actions",
        artifact: Artifact::SolverLog,
        pattern: r"Number of reachable actions: (\d+)",
        captures: &[capture(attr::NUM_REACH_ACTIONS, Decoder::Int, Fallback::Absent)],
        aggregation: Aggregation::Last,
        mandatory: false,
    },
    RuleSpec {
        name: "num_state_vars",
        artifact: Artifact::SolverLog,
        pattern: r"Number of state variables: (\d+)",
        captures: &[capture(attr::NUM_STATE_VARS, Decoder::Int, Fallback::Absent)],
        aggregation: Aggregation::Last,
        mandatory: false,
    },
    RuleSpec {
        name: "sdd_sizes",
        artifact: Artifact::SolverLog,
        pattern: r"SDD compiled: size=(\d+), theory vars=(\d+), theory constraints=(\d+)",
        captures: &[
            capture(attr::SDD_SIZES, Decoder::Int, Fallback::Int(0)),
            capture(attr::SDD_THEORY_VARS, Decoder::Int, Fallback::Int(0)),
            capture(attr::SDD_THEORY_CONSTRAINTS, Decoder::Int, Fallback::Int(0)),
        ],
        aggregation: Aggregation::Sum,
        mandatory: false,
    },
];

#[derive(Debug)]
pub struct ExtractionRule {
    pub spec: &'static RuleSpec,
    regex: Regex,
}

static COMPILED_RULES: LazyLock<Vec<ExtractionRule>> = LazyLock::new(|| {
    RULE_TABLE
        .iter()
        .map(|spec| ExtractionRule {
            spec,
            regex: Regex::new(spec.pattern).expect("Invalid extraction rule pattern"),
        })
        .collect()
});

pub fn rules() -> &'static [ExtractionRule] {
    &COMPILED_RULES
}

pub fn rules_for(artifact: Artifact) -> impl Iterator<Item = &'static ExtractionRule> {
    rules().iter().filter(move |r| r.spec.artifact == artifact)
}

impl ExtractionRule {
    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    pub fn attributes(&self) -> impl Iterator<Item = &'static str> {
        self.spec.captures.iter().map(|c| c.attribute)
    }

    /// Applies the rule to `text`, writing only this rule's attributes.
    pub fn apply(&self, text: &str, props: &mut Properties) -> Result<()> {
        let values = match self.spec.aggregation {
            Aggregation::Last => self.last_match(text)?,
            Aggregation::Sum => self.summed_matches(text)?,
        };

        let Some(values) = values else {
            if self.spec.mandatory {
                return Err(ParseError::MissingMandatory {
                    rule: self.spec.name,
                    artifact: self.spec.artifact.as_str(),
                });
            }
            for capture in self.spec.captures {
                if let Some(value) = capture.fallback.value() {
                    props.set(capture.attribute, value);
                }
            }
            return Ok(());
        };

        for (capture, value) in self.spec.captures.iter().zip(values) {
            if let Some(value) = value.or_else(|| capture.fallback.value()) {
                props.set(capture.attribute, value);
            }
        }
        Ok(())
    }

    fn last_match(&self, text: &str) -> Result<Option<Vec<Option<PropValue>>>> {
        match self.regex.captures_iter(text).last() {
            Some(caps) => Ok(Some(self.decode_groups(&caps)?)),
            None => Ok(None),
        }
    }

    fn summed_matches(&self, text: &str) -> Result<Option<Vec<Option<PropValue>>>> {
        let mut totals: Option<Vec<Option<PropValue>>> = None;
        for caps in self.regex.captures_iter(text) {
            let decoded = self.decode_groups(&caps)?;
            totals = Some(match totals {
                None => decoded,
                Some(acc) => acc
                    .into_iter()
                    .zip(decoded)
                    .map(|(sum, next)| match (sum, next) {
                        (Some(sum), Some(next)) => sum.checked_add(&next).or(Some(sum)),
                        (sum, next) => sum.or(next),
                    })
                    .collect(),
            });
        }
        Ok(totals)
    }

    fn decode_groups(&self, caps: &regex::Captures<'_>) -> Result<Vec<Option<PropValue>>> {
        let mut out = Vec::with_capacity(self.spec.captures.len());
        for (idx, capture) in self.spec.captures.iter().enumerate() {
            let raw = caps.get(idx + 1).map(|m| m.as_str()).unwrap_or("");
            let value = capture.decoder.decode(raw);
            if value.is_none() {
                if self.spec.mandatory {
                    return Err(ParseError::BadCapture {
                        rule: self.spec.name,
                        attribute: capture.attribute,
                        raw: raw.to_string(),
                    });
                }
                warn!(
                    rule = self.spec.name,
                    attribute = capture.attribute,
                    raw,
                    "undecodable capture, using rule default"
                );
            }
            out.push(value);
        }
        Ok(out)
    }
}
