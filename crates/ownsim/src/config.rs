//! Simulator configuration

use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Runtime configuration. Every field has a default, so `{}` is a valid
/// configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Stop executing after the first driver-misuse violation
    pub halt_on_fatal: bool,
    /// Run the full invariant suite after every op (slow)
    pub check_invariants: bool,
    /// Log every op and its result
    pub trace_ops: bool,
    /// OpLog bound
    pub max_log_events: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            halt_on_fatal: true,
            check_invariants: false,
            trace_ops: false,
            max_log_events: ownsim_axiom::oplog::MAX_OPLOG_EVENTS,
        }
    }
}

impl SimConfig {
    /// Decode a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, SimError> {
        serde_json::from_str(json).map_err(SimError::config)
    }

    /// Configuration for debugging a command log: trace and check everything
    pub fn strict() -> Self {
        Self {
            check_invariants: true,
            trace_ops: true,
            ..Self::default()
        }
    }
}
