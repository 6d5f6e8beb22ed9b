//! M4 benchmark frequency groups.
//!
//! Only the three groups the NBEATS ensemble is tuned for are supported.

use crate::error::EnsembleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sampling frequency of an M4 subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Frequency {
    Yearly,
    Quarterly,
    Monthly,
}

/// Benchmark metadata for one frequency group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrequencyGroup {
    pub name: &'static str,
    pub horizon: usize,
    pub seasonality: usize,
    pub code: &'static str,
}

impl Frequency {
    pub const ALL: [Frequency; 3] = [Frequency::Yearly, Frequency::Quarterly, Frequency::Monthly];

    /// Horizon, seasonality and naming as fixed by the M4 competition.
    pub fn group(self) -> FrequencyGroup {
        match self {
            Frequency::Yearly => FrequencyGroup {
                name: "Yearly",
                horizon: 6,
                seasonality: 1,
                code: "Y",
            },
            Frequency::Quarterly => FrequencyGroup {
                name: "Quarterly",
                horizon: 8,
                seasonality: 4,
                code: "Q",
            },
            Frequency::Monthly => FrequencyGroup {
                name: "Monthly",
                horizon: 18,
                seasonality: 12,
                code: "M",
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        self.group().name
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = EnsembleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Yearly" => Ok(Frequency::Yearly),
            "Quarterly" => Ok(Frequency::Quarterly),
            "Monthly" => Ok(Frequency::Monthly),
            other => Err(EnsembleError::UnsupportedFrequency(other.to_string())),
        }
    }
}

impl TryFrom<String> for Frequency {
    type Error = EnsembleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Frequency> for String {
    fn from(value: Frequency) -> Self {
        value.as_str().to_string()
    }
}
