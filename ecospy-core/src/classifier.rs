//! Allow-list based recyclability check.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Outcome of classifying one label.
pub enum Recyclability {
    /// Label is on the allow-list.
    Recyclable,
    /// Anything else.
    NonRecyclable,
}

impl fmt::Display for Recyclability {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Recyclable => "Recyclable",
            Self::NonRecyclable => "Non-Recyclable",
        };
        formatter.write_str(text)
    }
}

/// Case-insensitive membership test against a configured set of accepted labels.
#[derive(Debug, Clone)]
pub struct RecyclabilityClassifier {
    accepted: BTreeSet<String>,
}

impl RecyclabilityClassifier {
    /// Build a classifier from the configured allow-list.
    #[must_use]
    pub fn new<I, S>(accepted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let accepted = accepted
            .into_iter()
            .map(|label| label.as_ref().trim().to_lowercase())
            .filter(|label| !label.is_empty())
            .collect();
        Self { accepted }
    }

    /// Classify a label.
    #[must_use]
    pub fn classify(&self, label: &str) -> Recyclability {
        if self.accepted.contains(&label.trim().to_lowercase()) {
            Recyclability::Recyclable
        } else {
            Recyclability::NonRecyclable
        }
    }

    /// Shorthand for `classify(label) == Recyclable`.
    #[must_use]
    pub fn is_recyclable(&self, label: &str) -> bool {
        self.classify(label) == Recyclability::Recyclable
    }

    /// Accepted labels in sorted order.
    pub fn accepted(&self) -> impl Iterator<Item = &str> {
        self.accepted.iter().map(String::as_str)
    }
}
