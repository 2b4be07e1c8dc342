//! Workflow pipelines orchestrating stateless services.

pub mod simulate;
pub mod stages;

pub use simulate::{Simulation, SimulationReport, SimulationRequest};
pub use stages::{evaluate, stage_order, Stage, StageContext, StageOutcome, FILE_STAGES};
