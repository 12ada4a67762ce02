use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Attribute vocabulary shared by the rule table, the classifier and reports.
pub mod attr {
    pub const NODE: &str = "node";
    pub const PLANNER_EXIT_CODE: &str = "planner_exit_code";

    pub const NODE_GENERATION_RATE: &str = "node_generation_rate";
    pub const MEMORY: &str = "memory";
    pub const LAST_RECORDED_GENERATIONS: &str = "last_recorded_generations";
    pub const MEM_BEFORE_MT: &str = "mem_before_mt";
    pub const MEM_BEFORE_SEARCH: &str = "mem_before_search";
    pub const LAST_RECORDED_TIME: &str = "last_recorded_time";
    pub const TIME_REACHABILITY: &str = "time_reachability";
    pub const MEM_REACHABILITY: &str = "mem_reachability";
    pub const TIME_FRONTEND: &str = "time_frontend";
    pub const MEM_FRONTEND: &str = "mem_frontend";
    pub const SUCCESSOR_GENERATOR: &str = "successor_generator";
    pub const NUM_REACH_ACTIONS: &str = "num_reach_actions";
    pub const NUM_STATE_VARS: &str = "num_state_vars";
    pub const SDD_SIZES: &str = "sdd_sizes";
    pub const SDD_THEORY_VARS: &str = "sdd_theory_vars";
    pub const SDD_THEORY_CONSTRAINTS: &str = "sdd_theory_constraints";

    pub const ERROR: &str = "error";
    pub const COVERAGE: &str = "coverage";
    pub const UNSOLVABLE: &str = "unsolvable";
    pub const OUT_OF_MEMORY: &str = "out_of_memory";
    pub const JSON_OUTPUT_ERROR: &str = "json_output_error";

    pub const SEARCH_TIME: &str = "search_time";
    pub const TOTAL_TIME: &str = "total_time";
    pub const PLAN_LENGTH: &str = "plan_length";
    pub const EXPANSIONS: &str = "expansions";
    pub const GENERATIONS: &str = "generations";
    pub const EVALUATIONS: &str = "evaluations";
    pub const PLAN: &str = "plan";

    /// Attributes that only exist on a solved trial.
    pub const SOLVED_ONLY: [&str; 5] = [PLAN, PLAN_LENGTH, EXPANSIONS, GENERATIONS, EVALUATIONS];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<String>),
}

impl PropValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Integers widen to floats; everything else is `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropValue::Int(v) => Some(*v as f64),
            PropValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric sum used by summing rules. Mixed int/float promotes to float.
    pub fn checked_add(&self, other: &PropValue) -> Option<PropValue> {
        match (self, other) {
            (PropValue::Int(a), PropValue::Int(b)) => Some(PropValue::Int(a.saturating_add(*b))),
            (a, b) => Some(PropValue::Float(a.as_f64()? + b.as_f64()?)),
        }
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        PropValue::Bool(v)
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        PropValue::Int(v)
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        PropValue::Float(v)
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        PropValue::Str(v)
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        PropValue::Str(v.to_string())
    }
}

impl From<Vec<String>> for PropValue {
    fn from(v: Vec<String>) -> Self {
        PropValue::List(v)
    }
}

/// Flat attribute map for one trial. Keys are unique; a later write replaces
/// an earlier one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, PropValue>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `value` under `key` and returns the value it replaced.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Option<PropValue> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.0.get(key)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(PropValue::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(PropValue::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(PropValue::as_bool)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PropValue::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
