pub use ensemble::{Ensemble, EnsembleReport};
pub use simulation::{
    compute_dynamics, compute_dynamics_thermostatted, compute_dynamics_with_variables,
    DynamicsContext, IntervalHamiltonian, StepRecord, StepReport, TrajectoryReport,
    TrajectoryResult,
};
pub use thermostat::{build_thermostat, Thermostat};

pub mod decoherence;
pub mod dynamic_routines;
pub mod ensemble;
pub mod hop_acceptance;
pub mod hopping_routines;
pub mod overlaps;
pub mod representation;
pub mod schroedinger_integration;
pub mod simulation;
pub mod statistics;
pub mod thermostat;
