use crate::c64;
use crate::error::{DynamicsError, Result};
use crate::initialization::Representation;
use crate::linalg::populations;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

/// Classical nuclear degrees of freedom of one trajectory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NuclearState {
    pub positions: Array1<f64>,
    pub momenta: Array1<f64>,
    pub inverse_masses: Array1<f64>,
}

impl NuclearState {
    /// Creates the [NuclearState] from positions, momenta and masses
    pub fn new(positions: Array1<f64>, momenta: Array1<f64>, masses: Array1<f64>) -> Result<Self> {
        let ndof: usize = positions.len();
        DynamicsError::check_dimension("nuclear momenta", ndof, momenta.len())?;
        DynamicsError::check_dimension("nuclear masses", ndof, masses.len())?;
        if masses.iter().any(|&mass| !(mass > 0.0)) {
            return Err(DynamicsError::InvalidConfiguration(String::from(
                "all masses must be positive",
            )));
        }
        Ok(Self {
            positions,
            momenta,
            inverse_masses: masses.mapv(|mass| 1.0 / mass),
        })
    }

    pub fn ndof(&self) -> usize {
        self.positions.len()
    }

    pub fn velocities(&self) -> Array1<f64> {
        &self.momenta * &self.inverse_masses
    }

    pub fn kinetic_energy(&self) -> f64 {
        0.5 * (&self.momenta * &self.momenta * &self.inverse_masses).sum()
    }
}

/// Electronic amplitudes of one trajectory in the propagation representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectronicState {
    pub amplitudes: Array1<c64>,
    pub representation: Representation,
}

impl ElectronicState {
    pub fn new(amplitudes: Array1<c64>, representation: Representation) -> Self {
        Self {
            amplitudes,
            representation,
        }
    }

    pub fn nstates(&self) -> usize {
        self.amplitudes.len()
    }

    pub fn populations(&self) -> Array1<f64> {
        populations(self.amplitudes.view())
    }

    pub fn norm(&self) -> f64 {
        self.populations().sum().sqrt()
    }
}

/// Normalize the state coefficients of the system
pub fn normalize_coefficients(coefficients: ArrayView1<c64>) -> Array1<c64> {
    let norm: f64 = populations(coefficients).sum().sqrt();
    if norm > 0.0 {
        coefficients.mapv(|val| val / norm)
    } else {
        coefficients.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinetic_energy_of_a_single_dof() {
        let state = NuclearState::new(array![-10.0], array![20.0], array![2000.0]).unwrap();
        assert!((state.kinetic_energy() - 0.1).abs() < 1e-14);
        assert!((state.velocities()[0] - 0.01).abs() < 1e-14);
    }

    #[test]
    fn inconsistent_lengths_are_rejected() {
        let result = NuclearState::new(array![0.0, 1.0], array![0.0], array![1.0, 1.0]);
        assert!(matches!(result, Err(DynamicsError::DimensionMismatch { .. })));
    }

    #[test]
    fn coefficients_are_normalized() {
        let c: Array1<c64> = array![c64::new(3.0, 0.0), c64::new(0.0, 4.0)];
        let normalized = normalize_coefficients(c.view());
        assert!((populations(normalized.view()).sum() - 1.0).abs() < 1e-14);
    }
}
