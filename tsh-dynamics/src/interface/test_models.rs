use crate::error::{DynamicsError, Result};
use crate::interface::{DiabaticHamiltonian, HamiltonianProvider};
use ndarray::prelude::*;

/// Two diabatic states that cross linearly at x = 0 with a constant coupling
pub struct LinearCrossing {
    pub slope: f64,
    pub coupling: f64,
    /// evaluations beyond this coordinate fail
    pub limit: f64,
}

impl Default for LinearCrossing {
    fn default() -> Self {
        Self {
            slope: 0.01,
            coupling: 0.005,
            limit: f64::INFINITY,
        }
    }
}

impl HamiltonianProvider for LinearCrossing {
    fn nstates(&self) -> usize {
        2
    }

    fn ndof(&self) -> usize {
        1
    }

    fn evaluate(&self, coordinates: ArrayView1<f64>, _step: usize) -> Result<DiabaticHamiltonian> {
        let x: f64 = coordinates[0];
        if x.abs() > self.limit {
            return Err(DynamicsError::Provider(format!("x = {} outside of the model", x)));
        }
        let h: Array2<f64> = array![
            [self.slope * x, self.coupling],
            [self.coupling, -self.slope * x]
        ];
        let dh: Array3<f64> = array![[[self.slope, 0.0], [0.0, -self.slope]]];
        Ok(DiabaticHamiltonian::orthonormal(h, dh))
    }
}

/// Two displaced harmonic states with a weak constant coupling
pub struct HarmonicPair {
    pub force_constant: f64,
    pub offset: f64,
    pub coupling: f64,
}

impl Default for HarmonicPair {
    fn default() -> Self {
        Self {
            force_constant: 0.01,
            offset: 0.02,
            coupling: 0.001,
        }
    }
}

impl HamiltonianProvider for HarmonicPair {
    fn nstates(&self) -> usize {
        2
    }

    fn ndof(&self) -> usize {
        1
    }

    fn evaluate(&self, coordinates: ArrayView1<f64>, _step: usize) -> Result<DiabaticHamiltonian> {
        let x: f64 = coordinates[0];
        let v: f64 = 0.5 * self.force_constant * x.powi(2);
        let h: Array2<f64> = array![[v, self.coupling], [self.coupling, v + self.offset]];
        let dv: f64 = self.force_constant * x;
        let dh: Array3<f64> = array![[[dv, 0.0], [0.0, dv]]];
        Ok(DiabaticHamiltonian::orthonormal(h, dh))
    }
}
