//! Command-line runner for ownsim
//!
//! Reads a JSON command log, runs it, prints the report as JSON on stdout
//! and the runtime's log on stderr.
//!
//! ```text
//! ownsim <command-log.json>
//! OWNSIM_TRACE=1 ownsim log.json       # trace every op
//! OWNSIM_CHECK=1 ownsim log.json       # run invariant checks after every op
//! ```
//!
//! Exit status: 0 clean, 1 violations found, 2 bad input.

use std::process::ExitCode;
use std::time::Instant;

use ownsim::{load_command_log, Simulator, HAL};

/// Host backed by the process clock and stderr
struct StdHal {
    start: Instant,
}

impl HAL for StdHal {
    fn now_nanos(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    fn wallclock_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn debug_write(&self, msg: &str) {
        eprintln!("{}", msg);
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

fn main() -> ExitCode {
    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: ownsim <command-log.json>");
        return ExitCode::from(2);
    };

    let json = match std::fs::read_to_string(&path) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("ownsim: cannot read {}: {}", path, e);
            return ExitCode::from(2);
        }
    };

    let mut log = match load_command_log(&json) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("ownsim: {}: {}", path, e);
            return ExitCode::from(2);
        }
    };
    log.config.trace_ops |= env_flag("OWNSIM_TRACE");
    log.config.check_invariants |= env_flag("OWNSIM_CHECK");

    let hal = StdHal {
        start: Instant::now(),
    };
    let mut sim = Simulator::new(hal, log.config);
    sim.run(log.ops);
    let report = sim.finish();

    match report.to_json() {
        Ok(out) => println!("{}", out),
        Err(e) => {
            eprintln!("ownsim: {}", e);
            return ExitCode::from(2);
        }
    }

    if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
