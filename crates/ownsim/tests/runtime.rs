//! End-to-end runs of JSON command logs through the runtime.

use ownsim::{
    load_command_log, replay_and_verify, Op, Outcome, RunReport, SimConfig, Simulator,
    ViolationKind,
};
use ownsim_hal_mock::MockHal;

fn run_json(json: &str) -> (RunReport, Simulator<MockHal>) {
    let log = load_command_log(json).expect("command log should decode");
    let mut sim = Simulator::new(MockHal::with_tick(5), log.config);
    sim.run(log.ops);
    let report = sim.finish();
    (report, sim)
}

fn kinds(report: &RunReport) -> Vec<(usize, ViolationKind)> {
    report
        .violations()
        .into_iter()
        .map(|(i, v)| (i, v.kind))
        .collect()
}

#[test]
fn read_of_exclusively_borrowed_owner_conflicts() {
    let (report, sim) = run_json(
        r#"[
            {"op": "enter"},
            {"op": "declare", "name": "x", "value": {"kind": "heap", "len": 3}},
            {"op": "borrow_exclusive", "owner": "x", "reference": "r1"},
            {"op": "write", "name": "r1"},
            {"op": "read", "name": "x"}
        ]"#,
    );

    assert_eq!(kinds(&report), vec![(4, ViolationKind::ConflictingBorrow)]);
    assert!(sim
        .hal()
        .has_log_containing("[ownsim] violation at op #4: conflicting borrow on `x`"));
}

#[test]
fn drop_after_move_is_a_no_op() {
    let (report, _) = run_json(
        r#"[
            {"op": "enter"},
            {"op": "declare", "name": "x", "value": {"kind": "heap", "len": 2}},
            {"op": "move", "from": "x", "to": "y"},
            {"op": "drop", "name": "x"},
            {"op": "exit"}
        ]"#,
    );

    assert!(report.is_clean());
    assert_eq!(report.outcomes[3], Ok(Outcome::Skipped));
    assert!(report.leaks.is_empty());
}

#[test]
fn grow_leaves_stale_holder_dangling() {
    let (report, _) = run_json(
        r#"[
            {"op": "enter"},
            {"op": "allocate", "name": "v", "size": 3, "capacity": 3},
            {"op": "borrow_shared", "owner": "v", "reference": "p", "place": "contents"},
            {"op": "end_borrow", "reference": "p"},
            {"op": "grow", "name": "v", "capacity": 8},
            {"op": "read", "name": "p"}
        ]"#,
    );

    assert_eq!(kinds(&report), vec![(5, ViolationKind::DanglingReference)]);
    assert_eq!(report.leaks.len(), 1);
    assert_eq!(report.leaks[0].capacity, 8);
    assert_eq!(report.leaks[0].owner.as_deref(), Some("v"));
}

#[test]
fn scope_exit_frees_heap_owner() {
    let (report, sim) = run_json(
        r#"[
            {"op": "enter"},
            {"op": "enter"},
            {"op": "declare", "name": "s", "value": {"kind": "heap", "len": 4}},
            {"op": "exit"},
            {"op": "exit"}
        ]"#,
    );

    assert!(report.is_clean());
    assert!(report.leaks.is_empty());
    let log = sim.hal().get_debug_log();
    assert!(log.iter().any(|l| l == "[ownsim] enter frame 2"));
    assert!(log.iter().any(|l| l == "[ownsim] exit frame 2"));
    assert!(!log.iter().any(|l| l.contains("leak:")));
}

#[test]
fn unfinished_run_reports_leaks() {
    let (report, sim) = run_json(
        r#"[
            {"op": "enter"},
            {"op": "declare", "name": "buf", "value": {"kind": "heap", "len": 16, "capacity": 32}}
        ]"#,
    );

    assert_eq!(report.leaks.len(), 1);
    assert!(sim
        .hal()
        .has_log_containing("leak: 16 bytes (capacity 32)"));
    assert!(sim.hal().has_log_containing("owned by buf"));
}

#[test]
fn fatal_violation_halts_the_run() {
    let (report, sim) = run_json(
        r#"[
            {"op": "enter"},
            {"op": "read", "name": "ghost"},
            {"op": "exit"}
        ]"#,
    );

    assert_eq!(report.halted_at, Some(1));
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(kinds(&report), vec![(1, ViolationKind::UnknownBinding)]);
    assert!(sim.hal().has_log_containing("halting at op #1"));
}

#[test]
fn oversized_allocation_halts_without_allocating() {
    let (report, sim) = run_json(
        r#"[
            {"op": "enter"},
            {"op": "allocate", "name": "huge", "size": 1, "capacity": 1099511627776},
            {"op": "exit"}
        ]"#,
    );

    assert_eq!(report.halted_at, Some(1));
    assert_eq!(kinds(&report), vec![(1, ViolationKind::CapacityOverflow)]);
    assert!(report.leaks.is_empty());
    assert!(sim
        .hal()
        .has_log_containing("capacity overflow on `huge`"));
}

#[test]
fn config_in_command_log_is_applied() {
    let (report, sim) = run_json(
        r#"{
            "config": {"halt_on_fatal": false, "trace_ops": true, "check_invariants": true},
            "ops": [
                {"op": "enter"},
                {"op": "read", "name": "ghost"},
                {"op": "declare", "name": "n", "value": {"kind": "scalar", "value": 7}},
                {"op": "copy", "from": "n", "to": "m"},
                {"op": "exit"}
            ]
        }"#,
    );

    assert!(report.halted_at.is_none());
    assert_eq!(report.outcomes.len(), 5);
    assert!(report.invariant_failures.is_empty());
    assert!(sim.hal().has_log_containing("[ownsim] #3 copy(n -> m)"));
}

#[test]
fn run_is_auditable_and_replayable() {
    let (report, sim) = run_json(
        r#"[
            {"op": "enter"},
            {"op": "declare", "name": "a", "value": {"kind": "heap", "len": 1}},
            {"op": "borrow_exclusive", "owner": "a", "reference": "r"},
            {"op": "reborrow", "reference": "r", "to": "r2"},
            {"op": "write", "name": "r2"},
            {"op": "write", "name": "r"},
            {"op": "end_borrow", "reference": "r"},
            {"op": "move", "from": "a", "to": "b"},
            {"op": "exit"}
        ]"#,
    );

    assert_eq!(kinds(&report), vec![(5, ViolationKind::ConflictingBorrow)]);

    let axiom = sim.axiom();
    assert!(axiom.verify_integrity());
    assert_eq!(axiom.oplog().len(), 2 * report.outcomes.len());

    let rebuilt = replay_and_verify(axiom).expect("replay should reproduce the run");
    assert_eq!(rebuilt.head(), axiom.commitlog().head());
}

#[test]
fn op_timestamps_come_from_the_host_clock() {
    let mut sim = Simulator::new(MockHal::with_tick(10), SimConfig::default());
    sim.run(vec![Op::Enter, Op::Exit]);

    // construction reads the clock once, then once per op
    let stamps: Vec<u64> = sim.axiom().oplog().requests().map(|(_, ts)| ts).collect();
    assert_eq!(stamps, vec![10, 20]);
    assert_eq!(sim.axiom().commitlog().genesis_timestamp(), 0);
}
