//! The simulator runtime
//!
//! `Simulator` owns the pure [`SimState`] and the [`AxiomGateway`]. All
//! mutation goes through [`Simulator::execute`], which stamps the op with
//! the HAL clock, records it in the OpLog, runs `step`, and appends the
//! resulting commits.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use ownsim_axiom::{short_id, AxiomGateway, GatewayState, OpLog};
use ownsim_core::{check_all_invariants, leak_report, step, Leak, Op, Outcome, SimState, Violation};
use ownsim_hal::HAL;

use crate::config::SimConfig;
use crate::error::SimError;

/// Final report of a run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    /// One result per executed op, in order
    pub outcomes: Vec<Result<Outcome, Violation>>,
    /// Index of the fatal op that stopped the run
    pub halted_at: Option<usize>,
    /// Allocations still live when the run finished (informational)
    pub leaks: Vec<Leak>,
    /// Invariant failures observed with `check_invariants` on
    pub invariant_failures: Vec<String>,
    /// Number of commits recorded, genesis included
    pub commits: u64,
    /// Short hex of the CommitLog head
    pub commit_head: String,
    /// Host time spent between construction and `finish`
    pub elapsed_ns: u64,
}

impl RunReport {
    /// Every rejected op with its index
    pub fn violations(&self) -> Vec<(usize, &Violation)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().err().map(|v| (i, v)))
            .collect()
    }

    /// No violations and no invariant failures (leaks are allowed)
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(|r| r.is_ok()) && self.invariant_failures.is_empty()
    }

    /// Encode as pretty JSON
    pub fn to_json(&self) -> Result<String, SimError> {
        serde_json::to_string_pretty(self).map_err(|e| SimError::Report(format!("{}", e)))
    }
}

/// The simulator, generic over the host.
pub struct Simulator<H: HAL> {
    hal: H,
    config: SimConfig,
    state: SimState,
    axiom: AxiomGateway,
    outcomes: Vec<Result<Outcome, Violation>>,
    halted_at: Option<usize>,
    invariant_failures: Vec<String>,
    start_time: u64,
}

impl<H: HAL> Simulator<H> {
    /// Create a simulator with an empty stack and heap
    pub fn new(hal: H, config: SimConfig) -> Self {
        let start_time = hal.now_nanos();
        let oplog = OpLog::with_max_events(config.max_log_events);
        Self {
            hal,
            config,
            state: SimState::new(),
            axiom: AxiomGateway::with_oplog(oplog, start_time),
            outcomes: Vec::new(),
            halted_at: None,
            invariant_failures: Vec::new(),
            start_time,
        }
    }

    /// Execute one operation.
    ///
    /// The inner result is the op's outcome or the violation it triggered.
    /// Fails only when the run has already halted.
    pub fn execute(&mut self, op: Op) -> Result<Result<Outcome, Violation>, SimError> {
        if let Some(at) = self.halted_at {
            return Err(SimError::Halted { at });
        }

        let index = self.outcomes.len();
        let timestamp = self.hal.now_nanos();
        let label = if self.config.trace_ops {
            Some(format!("{}", op))
        } else {
            None
        };

        let state = &mut self.state;
        let (result, commit_ids) = self
            .axiom
            .submit(op, timestamp, |op| step(state, op, timestamp));

        if let Some(label) = label {
            self.hal.debug_write(&format!(
                "[ownsim] #{} {} -> {} ({} commits)",
                index,
                label,
                describe(&result),
                commit_ids.len()
            ));
        }
        self.log_result(index, &result);

        if self.config.check_invariants {
            for v in check_all_invariants(&self.state) {
                let line = format!("op #{}: {}: {}", index, v.invariant, v.description);
                self.hal
                    .debug_write(&format!("[ownsim] invariant violated after {}", line));
                self.invariant_failures.push(line);
            }
        }

        if let Err(v) = &result {
            if v.kind.is_fatal() && self.config.halt_on_fatal {
                self.hal
                    .debug_write(&format!("[ownsim] halting at op #{}: {}", index, v));
                self.halted_at = Some(index);
            }
        }

        self.outcomes.push(result.clone());
        Ok(result)
    }

    /// Execute ops until they run out or the run halts.
    ///
    /// Returns the number of ops executed.
    pub fn run<I>(&mut self, ops: I) -> usize
    where
        I: IntoIterator<Item = Op>,
    {
        let mut executed = 0;
        for op in ops {
            if self.execute(op).is_err() {
                break;
            }
            executed += 1;
            if self.halted_at.is_some() {
                break;
            }
        }
        executed
    }

    /// Finish the run: log leaks and the summary, and build the report.
    ///
    /// Takes `&self` so the host (and its captured log) stays reachable.
    pub fn finish(&self) -> RunReport {
        let leaks = leak_report(&self.state);
        for leak in &leaks {
            let owner = leak.owner.as_deref().unwrap_or("<none>");
            self.hal.debug_write(&format!(
                "[ownsim] leak: {} bytes (capacity {}) at {} owned by {}",
                leak.size, leak.capacity, leak.address, owner
            ));
        }

        let summary = self.axiom.state_summary();
        let violations = self.outcomes.iter().filter(|r| r.is_err()).count();
        self.hal.debug_write(&format!(
            "[ownsim] finished: {} ops, {} violations, {} leaks, head {}",
            self.outcomes.len(),
            violations,
            leaks.len(),
            short_id(&summary.commitlog_head)
        ));

        RunReport {
            outcomes: self.outcomes.clone(),
            halted_at: self.halted_at,
            leaks,
            invariant_failures: self.invariant_failures.clone(),
            commits: summary.commitlog_seq + 1,
            commit_head: short_id(&summary.commitlog_head),
            elapsed_ns: self.hal.now_nanos().saturating_sub(self.start_time),
        }
    }

    fn log_result(&self, index: usize, result: &Result<Outcome, Violation>) {
        match result {
            Ok(Outcome::FrameEntered(frame)) => {
                self.hal
                    .debug_write(&format!("[ownsim] enter frame {}", frame.0));
            }
            Ok(Outcome::FrameExited(frame)) => {
                self.hal
                    .debug_write(&format!("[ownsim] exit frame {}", frame.0));
            }
            Ok(_) => {}
            Err(v) => {
                self.hal
                    .debug_write(&format!("[ownsim] violation at op #{}: {}", index, v));
            }
        }
    }

    // ========================================================================
    // Read-only accessors
    // ========================================================================

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Current simulator state
    pub fn state(&self) -> &SimState {
        &self.state
    }

    /// The audit gateway (OpLog + CommitLog)
    pub fn axiom(&self) -> &AxiomGateway {
        &self.axiom
    }

    pub fn gateway_state(&self) -> GatewayState {
        self.axiom.state_summary()
    }

    pub fn is_halted(&self) -> bool {
        self.halted_at.is_some()
    }

    /// Results so far
    pub fn outcomes(&self) -> &[Result<Outcome, Violation>] {
        &self.outcomes
    }
}

fn describe(result: &Result<Outcome, Violation>) -> String {
    match result {
        Ok(outcome) => format!("{:?}", outcome),
        Err(v) => format!("error: {}", v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;
    use ownsim_core::{DeclValue, ViolationKind};
    use ownsim_hal::TestHal;

    fn name(s: &str) -> String {
        s.to_string()
    }

    #[test]
    fn test_execute_records_in_gateway() {
        let mut sim = Simulator::new(TestHal::new(), SimConfig::default());
        sim.execute(Op::Enter).unwrap().unwrap();
        sim.execute(Op::Declare {
            name: name("x"),
            value: DeclValue::Scalar { value: 1 },
        })
        .unwrap()
        .unwrap();

        let summary = sim.gateway_state();
        assert_eq!(summary.oplog_len, 4);
        assert_eq!(summary.commitlog_seq, 2);
        assert!(sim.axiom().verify_integrity());
    }

    #[test]
    fn test_halts_on_fatal() {
        let mut sim = Simulator::new(TestHal::new(), SimConfig::default());
        let executed = sim.run(vec![Op::Exit, Op::Enter, Op::Exit]);
        assert_eq!(executed, 1);
        assert!(sim.is_halted());
        assert_eq!(sim.execute(Op::Enter), Err(SimError::Halted { at: 0 }));

        let report = sim.finish();
        assert_eq!(report.halted_at, Some(0));
        assert_eq!(report.violations()[0].1.kind, ViolationKind::FrameUnderflow);
    }

    #[test]
    fn test_fatal_does_not_halt_when_disabled() {
        let config = SimConfig {
            halt_on_fatal: false,
            ..SimConfig::default()
        };
        let mut sim = Simulator::new(TestHal::new(), config);
        assert_eq!(sim.run(vec![Op::Exit, Op::Enter, Op::Exit]), 3);
        let report = sim.finish();
        assert!(report.halted_at.is_none());
        assert_eq!(report.violations().len(), 1);
    }

    #[test]
    fn test_report_counts_commits_and_leaks() {
        let mut sim = Simulator::new(TestHal::new(), SimConfig::strict());
        sim.run(vec![
            Op::Enter,
            Op::Declare {
                name: name("v"),
                value: DeclValue::Heap { len: 2, capacity: 2 },
            },
        ]);
        let report = sim.finish();
        assert!(report.is_clean());
        assert_eq!(report.leaks.len(), 1);
        // genesis + frame + declare + allocation
        assert_eq!(report.commits, 4);
        assert_eq!(report.commit_head.len(), 16);
    }
}
