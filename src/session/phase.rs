//! Turn phase payload.
//!
//! The shape of a phase (storyteller clue, submitted cards, votes, scores)
//! belongs to the phase renderers; the session layer only stores and replaces
//! it.

use serde::{Deserialize, Serialize};

/// Opaque snapshot of the current turn's phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhaseSnapshot(serde_json::Value);

impl PhaseSnapshot {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// GraphQL type name of the phase, e.g. `"TurnScoringPhase"`.
    pub fn kind(&self) -> Option<&str> {
        self.0.get("__typename").and_then(|v| v.as_str())
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for PhaseSnapshot {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}
