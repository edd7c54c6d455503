use crate::defaults::*;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use tsh_dynamics::interface::{DiabaticHamiltonian, HamiltonianProvider};
use tsh_dynamics::{DynamicsError, Result};

fn default_a() -> f64 {
    SAC_A
}
fn default_b() -> f64 {
    SAC_B
}
fn default_c() -> f64 {
    SAC_C
}
fn default_d() -> f64 {
    SAC_D
}

/// Parameters of the single avoided crossing model
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SacParameters {
    #[serde(default = "default_a")]
    pub a: f64,
    #[serde(default = "default_b")]
    pub b: f64,
    #[serde(default = "default_c")]
    pub c: f64,
    #[serde(default = "default_d")]
    pub d: f64,
}

impl Default for SacParameters {
    fn default() -> Self {
        Self {
            a: default_a(),
            b: default_b(),
            c: default_c(),
            d: default_d(),
        }
    }
}

/// Diabatic Hamiltonian of the single avoided crossing model and its first and
/// second derivative with respect to x.
///
/// V11 = A (1 - exp(-B x)) for x >= 0 and -A (1 - exp(B x)) for x < 0,
/// V22 = -V11, V12 = V21 = C exp(-D x^2)
pub fn sac_hamiltonian(x: f64, params: &SacParameters) -> (Array2<f64>, Array2<f64>, Array2<f64>) {
    let (v11, dv11, d2v11): (f64, f64, f64) = if x >= 0.0 {
        let e: f64 = (-params.b * x).exp();
        (
            params.a * (1.0 - e),
            params.a * params.b * e,
            -params.a * params.b.powi(2) * e,
        )
    } else {
        let e: f64 = (params.b * x).exp();
        (
            -params.a * (1.0 - e),
            params.a * params.b * e,
            params.a * params.b.powi(2) * e,
        )
    };
    let g: f64 = params.c * (-params.d * x.powi(2)).exp();
    let v12: f64 = g;
    let dv12: f64 = -2.0 * params.d * x * g;
    let d2v12: f64 = (4.0 * params.d.powi(2) * x.powi(2) - 2.0 * params.d) * g;

    (
        array![[v11, v12], [v12, -v11]],
        array![[dv11, dv12], [dv12, -dv11]],
        array![[d2v11, d2v12], [d2v12, -d2v11]],
    )
}

/// Two state single avoided crossing model. Only the first nuclear coordinate
/// enters the Hamiltonian, further coordinates are free particles.
#[derive(Debug, Clone)]
pub struct SingleAvoidedCrossing {
    pub params: SacParameters,
    ndof: usize,
}

impl SingleAvoidedCrossing {
    pub fn new(params: SacParameters, ndof: usize) -> Self {
        Self { params, ndof }
    }
}

impl HamiltonianProvider for SingleAvoidedCrossing {
    fn nstates(&self) -> usize {
        2
    }

    fn ndof(&self) -> usize {
        self.ndof
    }

    fn evaluate(&self, coordinates: ArrayView1<f64>, _step: usize) -> Result<DiabaticHamiltonian> {
        DynamicsError::check_dimension("sac coordinates", self.ndof, coordinates.len())?;
        let x: f64 = coordinates[0];
        if !x.is_finite() {
            return Err(DynamicsError::Provider(format!(
                "sac model evaluated at x = {}",
                x
            )));
        }
        let (hamiltonian, dh, _) = sac_hamiltonian(x, &self.params);
        let mut gradient: Array3<f64> = Array3::zeros((self.ndof, 2, 2));
        gradient.slice_mut(s![0, .., ..]).assign(&dh);

        Ok(DiabaticHamiltonian {
            hamiltonian,
            overlap: Array2::eye(2),
            gradient,
            derivative_couplings: Some(Array3::zeros((self.ndof, 2, 2))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::AbsDiffEq;
    use std::sync::atomic::AtomicBool;
    use tsh_dynamics::dynamics::Ensemble;
    use tsh_dynamics::initialization::DynamicConfiguration;

    pub const EPSILON: f64 = 1e-12;

    #[test]
    fn hamiltonian_at_the_crossing() {
        let params = SacParameters::default();
        let (h, dh, _) = sac_hamiltonian(0.0, &params);
        assert!(h.abs_diff_eq(&array![[0.0, SAC_C], [SAC_C, 0.0]], EPSILON));
        // the slope of V11 is continuous at x = 0
        assert!((dh[[0, 0]] - SAC_A * SAC_B).abs() < EPSILON);
        assert!(dh[[0, 1]].abs() < EPSILON);
    }

    #[test]
    fn asymptotic_limits() {
        let params = SacParameters::default();
        let (h, _, _) = sac_hamiltonian(10.0, &params);
        assert!(h.abs_diff_eq(&array![[SAC_A, 0.0], [0.0, -SAC_A]], 1e-8));
        let (h, _, _) = sac_hamiltonian(-10.0, &params);
        assert!(h.abs_diff_eq(&array![[-SAC_A, 0.0], [0.0, SAC_A]], 1e-8));
    }

    #[test]
    fn derivatives_agree_with_finite_differences() {
        let params = SacParameters::default();
        let delta: f64 = 1e-5;
        for &x in [-2.3, -0.4, 0.7, 1.9].iter() {
            let (_, dh, d2h) = sac_hamiltonian(x, &params);
            let (h_plus, dh_plus, _) = sac_hamiltonian(x + delta, &params);
            let (h_minus, dh_minus, _) = sac_hamiltonian(x - delta, &params);
            let dh_num: Array2<f64> = (&h_plus - &h_minus) / (2.0 * delta);
            let d2h_num: Array2<f64> = (&dh_plus - &dh_minus) / (2.0 * delta);
            assert!(dh.abs_diff_eq(&dh_num, 1e-9), "dH at x = {}", x);
            assert!(d2h.abs_diff_eq(&d2h_num, 1e-8), "d2H at x = {}", x);
        }
    }

    #[test]
    fn provider_uses_the_first_coordinate() {
        let model = SingleAvoidedCrossing::new(SacParameters::default(), 2);
        let diabatic = model.evaluate(array![0.5, 3.0].view(), 0).unwrap();
        let (h, dh, _) = sac_hamiltonian(0.5, &model.params);
        assert!(diabatic.hamiltonian.abs_diff_eq(&h, EPSILON));
        assert!(diabatic.overlap.abs_diff_eq(&Array2::eye(2), EPSILON));
        assert!(diabatic.gradient.slice(s![0, .., ..]).abs_diff_eq(&dh, EPSILON));
        assert!(diabatic.gradient.slice(s![1, .., ..]).iter().all(|val| *val == 0.0));
        assert!(diabatic.derivative_couplings.unwrap().iter().all(|val| *val == 0.0));

        assert!(matches!(
            model.evaluate(array![0.5].view(), 0),
            Err(DynamicsError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn ensemble_transmission_through_the_avoided_crossing() {
        let config = DynamicConfiguration::from_toml(
            "ntraj = 1000\nnstep = 450\nintegration_timestep = 5.0\nseed = 11\n\
             [nuclear]\npositions = [-10.0]\nmomenta = [20.0]\nmasses = [2000.0]",
        )
        .unwrap();
        let model = SingleAvoidedCrossing::new(SacParameters::default(), 1);
        let report = Ensemble::new(&config, &model)
            .unwrap()
            .run(&AtomicBool::new(false))
            .unwrap();

        assert_eq!(report.nfinished(), 1000);
        let transmission = &report.observables.transmission;
        // with 0.1 Ha of kinetic energy both surfaces are open
        assert!(transmission.transmitted.sum() > 0.99);
        let upper: f64 = transmission.state_fraction(1);
        assert!(
            upper >= 0.45 && upper <= 0.75,
            "upper state fraction {}",
            upper
        );
    }
}
