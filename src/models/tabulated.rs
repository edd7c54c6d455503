use ndarray::prelude::*;
use ndarray_npy::read_npy;
use std::path::Path;
use tsh_dynamics::interface::{DiabaticHamiltonian, HamiltonianProvider};
use tsh_dynamics::{DynamicsError, Result};

/// Precomputed diabatic Hamiltonians of a reference trajectory. The Hamiltonian
/// of nuclear step `n` is entry `n mod nsteps`, independent of the coordinates.
/// This is the electronic structure of NBRA runs, where all trajectories follow
/// one nuclear path.
#[derive(Debug, Clone)]
pub struct TabulatedHamiltonian {
    /// nsteps x nstates x nstates
    hamiltonians: Array3<f64>,
    ndof: usize,
}

impl TabulatedHamiltonian {
    pub fn new(hamiltonians: Array3<f64>, ndof: usize) -> Result<Self> {
        let (nsteps, rows, cols) = hamiltonians.dim();
        if nsteps == 0 {
            return Err(DynamicsError::Provider(String::from(
                "the table of hamiltonians is empty",
            )));
        }
        DynamicsError::check_dimension("tabulated hamiltonian columns", rows, cols)?;
        for (step, h) in hamiltonians.outer_iter().enumerate() {
            if h.iter().any(|val| !val.is_finite()) {
                return Err(DynamicsError::Provider(format!(
                    "tabulated hamiltonian {} is not finite",
                    step
                )));
            }
        }
        Ok(Self { hamiltonians, ndof })
    }

    /// Read the table from a .npy file of shape nsteps x nstates x nstates
    pub fn from_npy(path: &Path, ndof: usize) -> Result<Self> {
        let hamiltonians: Array3<f64> = read_npy(path).map_err(|err| DynamicsError::Parse {
            what: "tabulated hamiltonians",
            message: format!("{}: {}", path.display(), err),
        })?;
        Self::new(hamiltonians, ndof)
    }

    pub fn nsteps(&self) -> usize {
        self.hamiltonians.dim().0
    }
}

impl HamiltonianProvider for TabulatedHamiltonian {
    fn nstates(&self) -> usize {
        self.hamiltonians.dim().1
    }

    fn ndof(&self) -> usize {
        self.ndof
    }

    fn evaluate(&self, _coordinates: ArrayView1<f64>, step: usize) -> Result<DiabaticHamiltonian> {
        let n: usize = self.nstates();
        let h: Array2<f64> = self
            .hamiltonians
            .index_axis(Axis(0), step % self.nsteps())
            .to_owned();
        Ok(DiabaticHamiltonian::orthonormal(
            h,
            Array3::zeros((self.ndof, n, n)),
        ))
    }
}
