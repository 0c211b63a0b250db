//! ownsim Runtime
//!
//! Thin wrapper around the pure core:
//! - Every operation flows through the [`AxiomGateway`] (OpLog + CommitLog)
//! - Diagnostics go to the host through [`HAL::debug_write`]
//! - Behaviour is tuned by a [`SimConfig`]
//!
//! ```text
//!   JSON command log ──▶ load_command_log ──▶ Simulator::run
//!                                               │
//!                             ┌─────────────────┼──────────────────┐
//!                             ▼                 ▼                  ▼
//!                        AxiomGateway    ownsim_core::step     HAL logging
//!                                               │
//!                                               ▼
//!                                      Simulator::finish ──▶ RunReport
//! ```

#![no_std]
extern crate alloc;

pub mod commands;
pub mod config;
pub mod error;
pub mod simulator;

pub use commands::{load_command_log, load_ops, CommandLog};
pub use config::SimConfig;
pub use error::SimError;
pub use simulator::{RunReport, Simulator};

pub use ownsim_axiom::{replay_and_verify, AxiomGateway, CommitLog, GatewayState, OpLog, ReplayError};
pub use ownsim_core::{
    validate, DeclValue, Leak, Op, Outcome, Place, SimState, ValidationReport, Violation,
    ViolationKind,
};
pub use ownsim_hal::HAL;
