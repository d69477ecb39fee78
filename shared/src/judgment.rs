//! Judgment labels, their score values and the accuracy band mapping.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Slack added to every band threshold so values that land on a boundary
/// after float arithmetic (`1.0 - 0.05` is not exactly `0.95`) stay inclusive.
const BAND_EPSILON: f64 = 1e-9;

/// Upper bounds on `|accuracy - 1|` for each band, tightest first.
const BANDS: [(f64, Judgment); 5] = [
    (0.05, Judgment::Excellent),
    (0.15, Judgment::VeryGood),
    (0.25, Judgment::Good),
    (0.35, Judgment::Fair),
    (0.45, Judgment::Poor),
];

/// Ordered from worst to best, so the derived `Ord` ranks judgments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Judgment {
    #[serde(rename = "No Credit")]
    NoCredit,
    Poor,
    Fair,
    Good,
    #[serde(rename = "Very Good")]
    VeryGood,
    Excellent,
}

impl Judgment {
    pub const ALL: [Judgment; 6] = [
        Judgment::Excellent,
        Judgment::VeryGood,
        Judgment::Good,
        Judgment::Fair,
        Judgment::Poor,
        Judgment::NoCredit,
    ];

    /// Maps an accuracy scalar onto a judgment using symmetric bands around 1.0.
    pub fn from_accuracy(accuracy: f64) -> Self {
        let deviation = (accuracy - 1.0).abs();
        BANDS
            .iter()
            .find(|(limit, _)| deviation <= limit + BAND_EPSILON)
            .map(|(_, judgment)| *judgment)
            .unwrap_or(Judgment::NoCredit)
    }

    pub fn score(self) -> u32 {
        match self {
            Judgment::NoCredit => 0,
            Judgment::Poor => 100,
            Judgment::Fair => 200,
            Judgment::Good => 300,
            Judgment::VeryGood => 400,
            Judgment::Excellent => 500,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Judgment::NoCredit => "No Credit",
            Judgment::Poor => "Poor",
            Judgment::Fair => "Fair",
            Judgment::Good => "Good",
            Judgment::VeryGood => "Very Good",
            Judgment::Excellent => "Excellent",
        }
    }

    pub fn is_miss(self) -> bool {
        self == Judgment::NoCredit
    }

    /// Ordinal comparison between two independently computed judgments.
    ///
    /// The reconciler keeps the first non-miss that arrives and never calls
    /// this; it is here for callers that want a "better of two" policy.
    pub fn is_better_than(self, other: Judgment) -> bool {
        self > other
    }
}

impl fmt::Display for Judgment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Judgment {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Judgment::ALL
            .iter()
            .copied()
            .find(|judgment| judgment.label() == s)
            .ok_or_else(|| ProtocolError::InvalidJudgmentLabel(s.to_string()))
    }
}

/// Serde adapter for chart files, where an unset judgment is the empty string.
pub mod optional_label {
    use super::Judgment;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Judgment>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.map(Judgment::label).unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Judgment>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse().map(Some).map_err(de::Error::custom)
    }
}
