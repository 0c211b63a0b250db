//! JSON command logs
//!
//! A command log is either a bare array of ops or an object carrying a
//! configuration alongside the ops:
//!
//! ```json
//! { "config": { "trace_ops": true },
//!   "ops": [ { "op": "enter" },
//!            { "op": "declare", "name": "v", "value": { "kind": "heap", "len": 3 } } ] }
//! ```

use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use ownsim_core::Op;

use crate::config::SimConfig;
use crate::error::SimError;

/// A decoded command log
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLog {
    #[serde(default)]
    pub config: SimConfig,
    pub ops: Vec<Op>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLog {
    Ops(Vec<Op>),
    Full(CommandLog),
}

/// Decode a command log in either accepted shape
pub fn load_command_log(json: &str) -> Result<CommandLog, SimError> {
    let raw: RawLog = serde_json::from_str(json).map_err(SimError::command_log)?;
    Ok(match raw {
        RawLog::Ops(ops) => CommandLog {
            config: SimConfig::default(),
            ops,
        },
        RawLog::Full(log) => log,
    })
}

/// Decode just the ops of a command log
pub fn load_ops(json: &str) -> Result<Vec<Op>, SimError> {
    load_command_log(json).map(|log| log.ops)
}
