//! Per-row results of store-mutating stages.

use serde::Serialize;
use std::fmt;

/// What happened to one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum RowOutcome {
    Applied,
    Skipped(SkipReason),
    Failed(FailureKind),
}

/// Why a row was left untouched. None of these stop the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No episode in the store has the prediction's key
    MissingEpisode,
    /// The episode has exited since the features were extracted
    EpisodeClosed,
    /// The terminal marker is written by the retire pass only
    TerminalLabel,
    /// The stored value is already a token
    AlreadyEncrypted,
    /// The stored value has no recognisable trailing group
    Malformed,
}

/// Why a row could not be processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The store rejected the row's statement
    Store,
    /// The value could not be encrypted
    Encryption,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::MissingEpisode => "missing episode",
            SkipReason::EpisodeClosed => "episode closed",
            SkipReason::TerminalLabel => "terminal label",
            SkipReason::AlreadyEncrypted => "already encrypted",
            SkipReason::Malformed => "malformed value",
        };
        f.write_str(s)
    }
}
