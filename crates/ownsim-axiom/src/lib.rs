//! ownsim Axiom Layer
//!
//! The Axiom layer provides:
//! - **OpLog**: Audit trail of every driver operation (request + response)
//! - **CommitLog**: Hash-chained record of every state mutation
//! - **AxiomGateway**: Entry point every operation passes through
//! - **Replay**: Re-execution of the OpLog against a fresh state
//!
//! # Core Guarantee
//!
//! > Same OpLog always produces the same CommitLog head.

#![no_std]
extern crate alloc;

pub mod commitlog;
pub mod gateway;
pub mod oplog;
pub mod replay;
pub mod types;

pub use commitlog::{Commit, CommitLog};
pub use gateway::{AxiomGateway, GatewayState};
pub use oplog::{OpEvent, OpEventType, OpLog};
pub use replay::{replay, replay_and_verify, ReplayError, ReplayResult};
pub use types::*;
