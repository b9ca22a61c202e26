pub mod catalog;
pub mod synth;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::RemediationError;

pub use catalog::{ActionTemplate, Catalog, ParamKind};
pub use synth::Synthesizer;

/// The closed set of remediations the agent knows how to propose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    HighCpu,
    HighMemory,
    CleanupTemp,
    CleanupRecycleBin,
}

impl ActionKind {
    pub const ALL: [ActionKind; 4] = [
        ActionKind::HighCpu,
        ActionKind::HighMemory,
        ActionKind::CleanupTemp,
        ActionKind::CleanupRecycleBin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::HighCpu => "high_cpu",
            ActionKind::HighMemory => "high_memory",
            ActionKind::CleanupTemp => "cleanup_temp",
            ActionKind::CleanupRecycleBin => "cleanup_recycle",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = RemediationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| RemediationError::UnknownKind(s.to_string()))
    }
}

/// A single primitive value bound to a template placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Number(f64),
    Path(PathBuf),
}

/// Parameters for one synthesis. Built fresh per triggering event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionParams {
    values: BTreeMap<String, ParamValue>,
}

impl ActionParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: impl Into<String>) -> Self {
        self.values
            .insert(name.to_string(), ParamValue::Text(value.into()));
        self
    }

    pub fn number(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_string(), ParamValue::Number(value));
        self
    }

    pub fn path(mut self, name: &str, value: impl AsRef<Path>) -> Self {
        self.values.insert(
            name.to_string(),
            ParamValue::Path(value.as_ref().to_path_buf()),
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }
}

/// A proposed remediation waiting for an operator decision.
#[derive(Debug, Clone, PartialEq)]
pub struct RemediationAction {
    pub description: String,
    pub kind: ActionKind,
    pub source: String,
}
