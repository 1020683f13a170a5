#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rust_2018_idioms,
    missing_docs
)]

//! 5C capacity pipeline: decision engine, task composer, router, playbooks.

/// Readings, decisions, tasks, and the capacity vocabulary.
#[path = "../model/main.rs"]
pub mod model;

/// Scoring, guardrail policy, and decision fingerprints.
#[path = "../decision/main.rs"]
pub mod decision;

/// Decision-to-task expansion and the task ledger.
#[path = "../tasks/main.rs"]
pub mod tasks;

/// Decision-to-screen routing with cooldown gating.
#[path = "../router/main.rs"]
pub mod router;

/// Pre-authored response playbooks.
#[path = "../playbook/main.rs"]
pub mod playbook;

/// Pareto frontier over trade-off options.
#[path = "../frontier.rs"]
pub mod frontier;

/// Injectable time source.
#[path = "../clock.rs"]
pub mod clock;

/// TOML configuration.
#[path = "../config.rs"]
pub mod config;

/// Audit log and event sinks.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Capacity runtime entry point.
#[path = "../main.rs"]
pub mod runtime;

#[cfg(test)]
#[path = "../fixtures.rs"]
mod fixtures;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::CapacityConfig;
pub use decision::DecisionEngine;
pub use frontier::{pareto_frontier, rank_frontier, Criterion, Direction, McdaOption, RankedOption};
pub use model::{
    Capacity, CapacityError, DecisionResult, PerCapacity, SignalReading, SprintLevel, Task,
};
pub use playbook::{Playbook, PlaybookRegistry};
pub use router::{CapacityRouter, RouteOptions, RouteResult};
pub use runtime::{CapacityRuntime, CycleOutcome};
pub use tasks::{ledger::TaskLedger, TaskComposer};
pub use telemetry::{CapacityTelemetry, CapacityTelemetryBuilder};
