//! Background Tasks Module
//!
//! Contains the tasks that keep generated content current while the server runs.
//!
//! # Tasks
//! - Regeneration: sweeps stale records and serves render-side regeneration requests

mod queue;
mod regenerate;

pub use queue::{RegenerationQueue, RegenerationRequest};
pub use regenerate::{
    spawn_regeneration_task, RegenerationOutcome, Regenerator, SweepReport, WorkerConfig,
};
