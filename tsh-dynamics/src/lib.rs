//! Trajectory surface hopping dynamics on model or tabulated Hamiltonians.
//!
//! A single step of a trajectory runs through the Hamiltonian update
//! ([dynamics::representation]), the propagation of the electronic amplitudes
//! ([dynamics::schroedinger_integration]), the hop proposal
//! ([dynamics::hopping_routines]) and acceptance ([dynamics::hop_acceptance]), the
//! decoherence correction ([dynamics::decoherence]) and the nuclear update
//! ([dynamics::dynamic_routines]). The [dynamics::ensemble::Ensemble] drives many
//! independent trajectories in parallel.

pub mod constants;
pub mod defaults;
pub mod dynamics;
pub mod error;
pub mod initialization;
pub mod interface;
pub mod linalg;
pub mod output;

pub use error::{Anomaly, DynamicsError, Result};

/// Complex double precision number used for all electronic amplitudes.
#[allow(non_camel_case_types)]
pub type c64 = num_complex::Complex<f64>;
