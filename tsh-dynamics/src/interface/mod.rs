use crate::error::{DynamicsError, Result};
pub use ndarray::prelude::*;

#[cfg(test)]
pub(crate) mod test_models;

/// Electronic structure of a model in the diabatic representation at one nuclear
/// configuration.
#[derive(Debug, Clone)]
pub struct DiabaticHamiltonian {
    /// diabatic Hamiltonian matrix, N x N
    pub hamiltonian: Array2<f64>,
    /// overlap matrix of the diabatic basis functions, N x N
    pub overlap: Array2<f64>,
    /// derivatives of the Hamiltonian along every nuclear degree of freedom, ndof x N x N
    pub gradient: Array3<f64>,
    /// derivative couplings between the diabatic basis functions, ndof x N x N
    pub derivative_couplings: Option<Array3<f64>>,
}

impl DiabaticHamiltonian {
    /// Hamiltonian in an orthonormal, coordinate independent diabatic basis
    pub fn orthonormal(hamiltonian: Array2<f64>, gradient: Array3<f64>) -> Self {
        let nstates: usize = hamiltonian.nrows();
        Self {
            hamiltonian,
            overlap: Array2::eye(nstates),
            gradient,
            derivative_couplings: None,
        }
    }

    pub fn nstates(&self) -> usize {
        self.hamiltonian.nrows()
    }

    pub fn ndof(&self) -> usize {
        self.gradient.dim().0
    }

    /// Verify that all blocks describe `nstates` electronic states and `ndof`
    /// nuclear degrees of freedom.
    pub fn check(&self, nstates: usize, ndof: usize) -> Result<()> {
        let (rows, cols) = self.hamiltonian.dim();
        DynamicsError::check_dimension("diabatic hamiltonian rows", nstates, rows)?;
        DynamicsError::check_dimension("diabatic hamiltonian columns", nstates, cols)?;
        let (rows, cols) = self.overlap.dim();
        DynamicsError::check_dimension("diabatic overlap rows", nstates, rows)?;
        DynamicsError::check_dimension("diabatic overlap columns", nstates, cols)?;
        let (dofs, rows, cols) = self.gradient.dim();
        DynamicsError::check_dimension("hamiltonian gradient dofs", ndof, dofs)?;
        DynamicsError::check_dimension("hamiltonian gradient rows", nstates, rows)?;
        DynamicsError::check_dimension("hamiltonian gradient columns", nstates, cols)?;
        if let Some(dc) = self.derivative_couplings.as_ref() {
            let (dofs, rows, cols) = dc.dim();
            DynamicsError::check_dimension("diabatic derivative coupling dofs", ndof, dofs)?;
            DynamicsError::check_dimension("diabatic derivative coupling rows", nstates, rows)?;
            DynamicsError::check_dimension("diabatic derivative coupling columns", nstates, cols)?;
        }
        Ok(())
    }

    /// Nonadiabatic coupling in time of the diabatic basis, sum_k dc_k v_k
    pub fn time_derivative_coupling(&self, velocities: ArrayView1<f64>) -> Array2<f64> {
        let nstates: usize = self.nstates();
        let mut nact: Array2<f64> = Array2::zeros((nstates, nstates));
        if let Some(dc) = self.derivative_couplings.as_ref() {
            for (dc_k, v_k) in dc.outer_iter().zip(velocities.iter()) {
                nact.scaled_add(*v_k, &dc_k);
            }
        }
        nact
    }
}

/// Trait that provides an interface for the electronic structure of the system.
/// Implementations are queried through a shared reference from many trajectories
/// at once and must not keep mutable state between calls.
pub trait HamiltonianProvider: Send + Sync {
    /// number of electronic states
    fn nstates(&self) -> usize;

    /// number of nuclear degrees of freedom
    fn ndof(&self) -> usize;

    /// Returns the diabatic Hamiltonian, the overlap of the diabatic states, the
    /// gradient of the Hamiltonian and the diabatic derivative couplings at the given
    /// coordinates. `step` is the index of the nuclear step, which is needed by
    /// providers that replay precomputed data.
    fn evaluate(&self, coordinates: ArrayView1<f64>, step: usize) -> Result<DiabaticHamiltonian>;
}
