//! Autonomous runner: paces how often an agent may write to the ledger.
//!
//! The runner wakes on an interval, asks a [`Producer`] for an observation
//! and appends it to the [`ode_ledger::Ledger`]. Only successful appends
//! count against the daily quota; the counter resets whenever the local
//! calendar date moves on, checked at the start of every cycle.

pub mod clock;
pub mod config;
pub mod error;
pub mod observer;
pub mod producer;
pub mod quota;
pub mod runner;

pub use clock::{until_next_midnight, Clock, ManualClock, SystemClock};
pub use config::RunnerConfig;
pub use error::{CycleError, FailureKind, ProducerError, RunnerError};
pub use observer::{SimulatedObserver, WebObserver};
pub use producer::{Observation, Producer};
pub use quota::RunnerState;
pub use runner::{AutonomousRunner, CycleOutcome, CycleReport, RunnerPhase, RunnerStatus};
