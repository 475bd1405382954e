//! The closed exit-destination label set.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SchemaError;

/// Predicted (or terminal) exit destination of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    /// Emergency shelter
    Es,
    Other,
    /// Permanent housing
    Perm,
    /// Temporary housing
    Temp,
    Unknown,
    /// Terminal marker: the episode has a recorded exit. Never produced by a model.
    Exited,
}

impl Label {
    /// Model output ordering. Class index `i` of a classifier maps to `PREDICTABLE[i]`.
    pub const PREDICTABLE: [Label; 5] = [
        Label::Es,
        Label::Other,
        Label::Perm,
        Label::Temp,
        Label::Unknown,
    ];

    /// Map a classifier class index onto the fixed label ordering.
    pub fn from_class_index(index: usize) -> Option<Label> {
        Self::PREDICTABLE.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Es => "es",
            Label::Other => "other",
            Label::Perm => "perm",
            Label::Temp => "temp",
            Label::Unknown => "unknown",
            Label::Exited => "exited",
        }
    }

    /// True for the terminal `exited` marker.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Label::Exited)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "es" => Ok(Label::Es),
            "other" => Ok(Label::Other),
            "perm" => Ok(Label::Perm),
            "temp" => Ok(Label::Temp),
            "unknown" => Ok(Label::Unknown),
            "exited" => Ok(Label::Exited),
            other => Err(SchemaError::invalid_value(format!(
                "unknown exit destination label '{}'",
                other
            ))),
        }
    }
}
