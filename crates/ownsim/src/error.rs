//! Runtime errors
//!
//! Violations of the modeled program are results, not errors. `SimError`
//! covers failures of the runtime itself.

use alloc::string::{String, ToString};
use core::fmt;

/// Errors returned by the runtime
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimError {
    /// Configuration JSON could not be decoded
    Config(String),
    /// Command log JSON could not be decoded
    CommandLog(String),
    /// The run already stopped on a fatal violation at this op index
    Halted { at: usize },
    /// Report could not be encoded
    Report(String),
}

impl SimError {
    pub(crate) fn config(err: serde_json::Error) -> Self {
        SimError::Config(err.to_string())
    }

    pub(crate) fn command_log(err: serde_json::Error) -> Self {
        SimError::CommandLog(err.to_string())
    }
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::Config(msg) => write!(f, "invalid config: {}", msg),
            SimError::CommandLog(msg) => write!(f, "invalid command log: {}", msg),
            SimError::Halted { at } => write!(f, "run halted at op #{}", at),
            SimError::Report(msg) => write!(f, "report encoding failed: {}", msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            SimError::Halted { at: 3 }.to_string(),
            "run halted at op #3"
        );
        assert!(SimError::Config("eof".to_string())
            .to_string()
            .starts_with("invalid config"));
    }

    #[test]
    fn test_from_json_error() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(matches!(SimError::command_log(err), SimError::CommandLog(_)));
    }
}
