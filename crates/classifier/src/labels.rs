//! Class label table

use serde::Serialize;
use std::collections::HashSet;

use crate::config::DEFAULT_LABELS;
use crate::StartupError;

/// Ordered category names; index `i` is the model's `i`-th output unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ClassLabelTable {
    labels: Vec<String>,
}

impl ClassLabelTable {
    pub fn new(labels: Vec<String>) -> Result<Self, StartupError> {
        if labels.is_empty() {
            return Err(StartupError::Config("Label table is empty".into()));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = labels.iter().find(|&l| !seen.insert(l.as_str())) {
            return Err(StartupError::Config(format!("Duplicate label: {}", dup)));
        }

        Ok(Self { labels })
    }

    /// Check the table length against the model's output dimensionality
    pub fn check_outputs(&self, outputs: Option<usize>) -> Result<(), StartupError> {
        match outputs {
            Some(n) if n != self.labels.len() => Err(StartupError::LabelMismatch {
                labels: self.labels.len(),
                outputs: n,
            }),
            _ => Ok(()),
        }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

impl Default for ClassLabelTable {
    fn default() -> Self {
        Self {
            labels: DEFAULT_LABELS.iter().map(|l| l.to_string()).collect(),
        }
    }
}
