//! Operation Event Log (OpLog)
//!
//! Records every driver operation (request + response) for the audit trail.
//! This is separate from CommitLog: OpLog records what was asked and what
//! was answered, CommitLog records what actually changed.

use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use ownsim_core::{Op, Outcome, Violation};

use crate::types::EventId;

/// An operation event (request or response).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpEvent {
    /// Unique event ID (monotonic)
    pub id: EventId,
    /// Timestamp (nanos)
    pub timestamp: u64,
    /// Event type (request or response)
    pub event_type: OpEventType,
}

/// Type of operation event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum OpEventType {
    /// Operation submitted by the driver
    Request { op: Op },
    /// Result handed back to the driver
    Response {
        /// ID of the request this responds to
        request_id: EventId,
        result: Result<Outcome, Violation>,
    },
}

/// Default maximum number of events kept in memory
pub const MAX_OPLOG_EVENTS: usize = 10000;

/// Operation log for auditing.
///
/// Events are append-only with monotonic IDs. Once `max_events` is exceeded
/// the oldest events are dropped; IDs keep counting.
pub struct OpLog {
    events: Vec<OpEvent>,
    next_id: EventId,
    max_events: usize,
}

impl OpLog {
    /// Create a new empty OpLog with the default bound.
    pub fn new() -> Self {
        Self::with_max_events(MAX_OPLOG_EVENTS)
    }

    /// Create a new empty OpLog keeping at most `max_events` events.
    pub fn with_max_events(max_events: usize) -> Self {
        Self {
            events: Vec::new(),
            next_id: 0,
            max_events: max_events.max(2),
        }
    }

    /// Log an operation request.
    ///
    /// Returns the event ID for correlating with the response.
    pub fn log_request(&mut self, op: Op, timestamp: u64) -> EventId {
        self.push(timestamp, OpEventType::Request { op })
    }

    /// Log an operation response.
    pub fn log_response(
        &mut self,
        request_id: EventId,
        result: Result<Outcome, Violation>,
        timestamp: u64,
    ) {
        self.push(timestamp, OpEventType::Response { request_id, result });
    }

    fn push(&mut self, timestamp: u64, event_type: OpEventType) -> EventId {
        let id = self.next_id;
        self.next_id += 1;
        self.events.push(OpEvent {
            id,
            timestamp,
            event_type,
        });
        self.trim_if_needed();
        id
    }

    /// Get all events.
    pub fn events(&self) -> &[OpEvent] {
        &self.events
    }

    /// Requests in submission order, with their timestamps.
    pub fn requests(&self) -> impl Iterator<Item = (&Op, u64)> {
        self.events.iter().filter_map(|e| match &e.event_type {
            OpEventType::Request { op } => Some((op, e.timestamp)),
            OpEventType::Response { .. } => None,
        })
    }

    /// Get events in an ID range.
    pub fn get_range(&self, start_id: EventId, end_id: EventId) -> Vec<&OpEvent> {
        self.events
            .iter()
            .filter(|e| e.id >= start_id && e.id < end_id)
            .collect()
    }

    /// Get the most recent N events.
    pub fn get_recent(&self, count: usize) -> Vec<&OpEvent> {
        self.events.iter().rev().take(count).collect()
    }

    /// Whether old events have been dropped.
    pub fn is_truncated(&self) -> bool {
        self.events.first().map_or(self.next_id > 0, |e| e.id > 0)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Get the next event ID.
    pub fn next_id(&self) -> EventId {
        self.next_id
    }

    fn trim_if_needed(&mut self) {
        if self.events.len() > self.max_events {
            let drain_count = self.events.len() - self.max_events;
            self.events.drain(0..drain_count);
        }
    }
}

impl Default for OpLog {
    fn default() -> Self {
        Self::new()
    }
}
