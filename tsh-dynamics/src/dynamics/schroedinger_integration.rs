use crate::c64;
use crate::dynamics::overlaps::nact_from_overlap;
use crate::error::{DynamicsError, Result};
use crate::linalg::{inverse_sqrt, propagator, to_complex};
use log::warn;
use ndarray::prelude::*;

/// Amplitudes and Hamiltonians of one propagation interval [t - dt, t] in the
/// adiabatic basis. The hopping schemes integrate the population flux over the
/// stored points.
#[derive(Debug, Clone)]
pub struct PropagationRecord {
    /// amplitudes at the ends of every segment, the first entry is c(t - dt)
    pub amplitudes: Vec<Array1<c64>>,
    /// vibronic Hamiltonians at the same points as the amplitudes
    pub hamiltonians: Vec<Array2<c64>>,
    /// propagator of the full interval, c(t) = P c(t - dt)
    pub propagator: Array2<c64>,
    /// length of one segment
    pub timestep: f64,
}

impl PropagationRecord {
    pub fn initial(&self) -> ArrayView1<'_, c64> {
        self.amplitudes[0].view()
    }

    pub fn last(&self) -> ArrayView1<'_, c64> {
        self.amplitudes[self.amplitudes.len() - 1].view()
    }

    pub fn nsegments(&self) -> usize {
        self.amplitudes.len() - 1
    }

    /// Record of an interval that is described by a single propagator,
    /// the flux is evaluated at both ends only
    pub fn two_point(
        initial: Array1<c64>,
        h_start: Array2<c64>,
        h_end: Array2<c64>,
        step_propagator: Array2<c64>,
        dt: f64,
    ) -> Self {
        let last: Array1<c64> = step_propagator.dot(&initial);
        Self {
            amplitudes: vec![initial, last],
            hamiltonians: vec![h_start, h_end],
            propagator: step_propagator,
            timestep: dt,
        }
    }
}

/// Vibronic Hamiltonian H_vib = diag(E) - i NACT
pub fn vibronic_hamiltonian(energies: ArrayView1<f64>, nact: ArrayView2<f64>) -> Array2<c64> {
    let mut h_vib: Array2<c64> = nact.mapv(|val| c64::new(0.0, -val));
    for (i, energy) in energies.iter().enumerate() {
        h_vib[[i, i]] += c64::from(*energy);
    }
    h_vib
}

/// Linear interpolation between the Hamiltonians at both ends of the interval
fn interpolate(h_start: ArrayView2<c64>, h_end: ArrayView2<c64>, fraction: f64) -> Array2<c64> {
    &h_start * c64::from(1.0 - fraction) + &h_end * c64::from(fraction)
}

fn check_dimensions(
    amplitudes: ArrayView1<c64>,
    h_start: ArrayView2<c64>,
    h_end: ArrayView2<c64>,
) -> Result<()> {
    let nstates: usize = amplitudes.len();
    let start: &'static str = "hamiltonian at the start of the step";
    let end: &'static str = "hamiltonian at the end of the step";
    DynamicsError::check_dimension(start, nstates, h_start.nrows())?;
    DynamicsError::check_dimension(start, nstates, h_start.ncols())?;
    DynamicsError::check_dimension(end, nstates, h_end.nrows())?;
    DynamicsError::check_dimension(end, nstates, h_end.ncols())?;
    Ok(())
}

fn check_norm(amplitudes: ArrayView1<c64>) {
    let norm: f64 = amplitudes.iter().map(|c| c.norm_sqr()).sum();
    if (norm - 1.0).abs() > 1.0e-6 {
        warn!("Norm of electronic coefficients not conserved! Norm = {:.8}", norm);
    }
}

/// Solve the electronic Schroedinger equation with the matrix exponential of the
/// Hamiltonian at the midpoint of every substep.
pub fn propagate_exact(
    amplitudes: ArrayView1<c64>,
    h_start: ArrayView2<c64>,
    h_end: ArrayView2<c64>,
    dt: f64,
    substeps: usize,
) -> Result<PropagationRecord> {
    check_dimensions(amplitudes, h_start, h_end)?;
    let nstates: usize = amplitudes.len();
    let delta: f64 = dt / substeps as f64;

    let mut record = PropagationRecord {
        amplitudes: vec![amplitudes.to_owned()],
        hamiltonians: vec![h_start.to_owned()],
        propagator: Array2::eye(nstates),
        timestep: delta,
    };
    let mut coefficients: Array1<c64> = amplitudes.to_owned();
    for n in 0..substeps {
        let h_mid: Array2<c64> = interpolate(h_start, h_end, (n as f64 + 0.5) / substeps as f64);
        let u_mat: Array2<c64> = propagator(h_mid.view(), delta)?;
        coefficients = u_mat.dot(&coefficients);
        record.propagator = u_mat.dot(&record.propagator);
        record.amplitudes.push(coefficients.clone());
        record
            .hamiltonians
            .push(interpolate(h_start, h_end, (n + 1) as f64 / substeps as f64));
    }
    check_norm(coefficients.view());
    Ok(record)
}

/// Obtain the new coefficients of the states by utilizing a Runge-Kutta 4th order
/// scheme. The propagator of every substep is integrated as a matrix, so that the
/// record also holds the propagator of the full step.
pub fn propagate_runge_kutta(
    amplitudes: ArrayView1<c64>,
    h_start: ArrayView2<c64>,
    h_end: ArrayView2<c64>,
    dt: f64,
    substeps: usize,
) -> Result<PropagationRecord> {
    check_dimensions(amplitudes, h_start, h_end)?;
    let nstates: usize = amplitudes.len();
    let delta_rk: f64 = dt / substeps as f64;

    let mut record = PropagationRecord {
        amplitudes: vec![amplitudes.to_owned()],
        hamiltonians: vec![h_start.to_owned()],
        propagator: Array2::eye(nstates),
        timestep: delta_rk,
    };
    let mut coefficients: Array1<c64> = amplitudes.to_owned();
    for n in 0..substeps {
        let t_i: f64 = n as f64 * delta_rk;
        let u_mat: Array2<c64> = runge_kutta_integration(t_i, delta_rk, dt, h_start, h_end);
        coefficients = u_mat.dot(&coefficients);
        record.propagator = u_mat.dot(&record.propagator);
        record.amplitudes.push(coefficients.clone());
        record
            .hamiltonians
            .push(interpolate(h_start, h_end, (n + 1) as f64 / substeps as f64));
    }
    check_norm(coefficients.view());
    Ok(record)
}

/// Calculate one step of the 4th order Runge-Kutta method for dU/dt = -i H(t) U
/// with U(time) = 1
fn runge_kutta_integration(
    time: f64,
    delta_rk: f64,
    dt: f64,
    h_start: ArrayView2<c64>,
    h_end: ArrayView2<c64>,
) -> Array2<c64> {
    let identity: Array2<c64> = Array2::eye(h_start.nrows());
    let half: c64 = c64::from(0.5 * delta_rk);
    let full: c64 = c64::from(delta_rk);

    let k_1: Array2<c64> = runge_kutta_helper(time, identity.view(), dt, h_start, h_end);
    let tmp: Array2<c64> = &identity + &(&k_1 * half);
    let k_2: Array2<c64> =
        runge_kutta_helper(time + 0.5 * delta_rk, tmp.view(), dt, h_start, h_end);
    let tmp: Array2<c64> = &identity + &(&k_2 * half);
    let k_3: Array2<c64> =
        runge_kutta_helper(time + 0.5 * delta_rk, tmp.view(), dt, h_start, h_end);
    let tmp: Array2<c64> = &identity + &(&k_3 * full);
    let k_4: Array2<c64> = runge_kutta_helper(time + delta_rk, tmp.view(), dt, h_start, h_end);

    identity + (k_1 + k_2 * c64::from(2.0) + k_3 * c64::from(2.0) + k_4) * c64::from(delta_rk / 6.0)
}

/// Right hand side -i H(t) U of the Schroedinger equation
fn runge_kutta_helper(
    time: f64,
    state: ArrayView2<c64>,
    dt: f64,
    h_start: ArrayView2<c64>,
    h_end: ArrayView2<c64>,
) -> Array2<c64> {
    let h: Array2<c64> = interpolate(h_start, h_end, time / dt);
    h.dot(&state) * c64::new(0.0, -1.0)
}

/// The coefficients of the electronic wavefunction are propagated
/// in the local diabatic basis as explained in
/// [1]  JCP 114, 10608 (2001) and
/// [2]  JCP 137, 22A514 (2012)
/// `time_overlap` is St_ij = <i(t - dt)|j(t)>. The propagator of the interpolated
/// Hamiltonian is exact, so no substeps are needed.
pub fn propagate_local_diabatization(
    amplitudes: ArrayView1<c64>,
    energies_last: ArrayView1<f64>,
    energies: ArrayView1<f64>,
    time_overlap: ArrayView2<f64>,
    dt: f64,
) -> Result<PropagationRecord> {
    let nstates: usize = amplitudes.len();
    DynamicsError::check_dimension("energies of the previous step", nstates, energies_last.len())?;
    DynamicsError::check_dimension("energies of the current step", nstates, energies.len())?;
    DynamicsError::check_dimension("time overlap", nstates, time_overlap.nrows())?;
    DynamicsError::check_dimension("time overlap", nstates, time_overlap.ncols())?;

    // Loewdin orthogonalization of the S matrix
    // see eqns. (B5) and (B6) in [2]
    let s_ts: Array2<f64> = time_overlap.t().dot(&time_overlap);
    // unitary transformation matrix, see eqn. (B5) in [1]
    let t: Array2<f64> = time_overlap.dot(&inverse_sqrt(s_ts.view())?);

    // diabatic hamiltonian H(t) in the basis of the states at t - dt
    let h: Array2<f64> = t.dot(&Array::from_diag(&energies).dot(&t.t()));
    let mut h_interp: Array2<f64> = (Array::from_diag(&energies_last) + h) / 2.0;

    // subtract lowest energy from diagonal
    let h_00_val: f64 = h_interp[[0, 0]];
    for ii in 0..nstates {
        h_interp[[ii, ii]] -= h_00_val;
    }

    // propagator in diabatic basis, see eqn. (11) in [1]
    let u_mat: Array2<c64> = propagator(to_complex(h_interp.view()).view(), dt)?;
    // at the beginning of the time step the adiabatic and diabatic basis is assumed
    // to coincide, the new coefficients are transformed into the adiabatic basis at t
    let step_propagator: Array2<c64> = to_complex(t.t()).dot(&u_mat);

    let nact: Array2<f64> = nact_from_overlap(time_overlap, dt);
    let record = PropagationRecord::two_point(
        amplitudes.to_owned(),
        vibronic_hamiltonian(energies_last, nact.view()),
        vibronic_hamiltonian(energies, nact.view()),
        step_propagator,
        dt,
    );
    check_norm(record.last());
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::populations;

    pub const EPSILON: f64 = 1e-10;

    fn coupled_hamiltonian() -> Array2<c64> {
        vibronic_hamiltonian(
            array![-0.01, 0.01].view(),
            array![[0.0, 0.002], [-0.002, 0.0]].view(),
        )
    }

    #[test]
    fn exact_propagation_of_uncoupled_states_only_changes_phases() {
        let h: Array2<c64> = vibronic_hamiltonian(
            array![-0.5, 0.25].view(),
            Array2::<f64>::zeros((2, 2)).view(),
        );
        let c0: Array1<c64> = array![c64::new(0.6, 0.0), c64::new(0.8, 0.0)];
        let record = propagate_exact(c0.view(), h.view(), h.view(), 2.0, 4).unwrap();
        assert_eq!(record.amplitudes.len(), 5);
        let last = record.last();
        assert!((last[0] - c64::new(0.6, 0.0) * c64::new(0.0, 1.0).exp()).norm() < EPSILON);
        assert!((last[1] - c64::new(0.8, 0.0) * c64::new(0.0, -0.5).exp()).norm() < EPSILON);
    }

    #[test]
    fn propagation_conserves_the_norm() {
        let h: Array2<c64> = coupled_hamiltonian();
        let c0: Array1<c64> = array![c64::new(1.0, 0.0), c64::new(0.0, 0.0)];
        let exact = propagate_exact(c0.view(), h.view(), h.view(), 20.0, 10).unwrap();
        let rk = propagate_runge_kutta(c0.view(), h.view(), h.view(), 20.0, 10).unwrap();
        for record in [exact, rk].iter() {
            for c in record.amplitudes.iter() {
                assert!((populations(c.view()).sum() - 1.0).abs() < 1e-8);
            }
        }
    }

    #[test]
    fn runge_kutta_agrees_with_exact_propagation() {
        let h_start: Array2<c64> = coupled_hamiltonian();
        let h_end: Array2<c64> = vibronic_hamiltonian(
            array![-0.012, 0.011].view(),
            array![[0.0, 0.003], [-0.003, 0.0]].view(),
        );
        let c0: Array1<c64> = array![c64::new(0.8, 0.0), c64::new(0.0, 0.6)];
        let exact = propagate_exact(c0.view(), h_start.view(), h_end.view(), 10.0, 50).unwrap();
        let rk = propagate_runge_kutta(c0.view(), h_start.view(), h_end.view(), 10.0, 50).unwrap();
        for (a, b) in exact.last().iter().zip(rk.last().iter()) {
            assert!((a - b).norm() < 1e-6, "{} {}", a, b);
        }
    }

    #[test]
    fn record_propagator_maps_initial_onto_final_amplitudes() {
        let h: Array2<c64> = coupled_hamiltonian();
        let c0: Array1<c64> = array![c64::new(0.0, 1.0), c64::new(0.0, 0.0)];
        let record = propagate_runge_kutta(c0.view(), h.view(), h.view(), 5.0, 3).unwrap();
        let mapped: Array1<c64> = record.propagator.dot(&c0);
        for (a, b) in mapped.iter().zip(record.last().iter()) {
            assert!((a - b).norm() < EPSILON);
        }
    }

    #[test]
    fn local_diabatization_without_rotation_is_a_phase() {
        let energies: Array1<f64> = array![-0.01, 0.01];
        let st: Array2<f64> = Array2::eye(2);
        let c0: Array1<c64> = array![c64::new(0.6, 0.0), c64::new(0.8, 0.0)];
        let record = propagate_local_diabatization(
            c0.view(),
            energies.view(),
            energies.view(),
            st.view(),
            10.0,
        )
        .unwrap();
        let pops: Array1<f64> = populations(record.last());
        assert!((pops[0] - 0.36).abs() < EPSILON && (pops[1] - 0.64).abs() < EPSILON);
    }

    #[test]
    fn local_diabatization_follows_a_state_crossing() {
        // the diabatic character of the states is exchanged within one step
        let energies: Array1<f64> = array![-0.01, 0.01];
        let st: Array2<f64> = array![[0.0, 1.0], [-1.0, 0.0]];
        let c0: Array1<c64> = array![c64::new(1.0, 0.0), c64::new(0.0, 0.0)];
        let record = propagate_local_diabatization(
            c0.view(),
            energies.view(),
            energies.view(),
            st.view(),
            1.0,
        )
        .unwrap();
        let pops: Array1<f64> = populations(record.last());
        assert!((pops[1] - 1.0).abs() < EPSILON);
    }

    #[test]
    fn mismatching_hamiltonian_is_rejected() {
        let h: Array2<c64> = Array2::zeros((3, 3));
        let c0: Array1<c64> = array![c64::new(1.0, 0.0), c64::new(0.0, 0.0)];
        assert!(matches!(
            propagate_exact(c0.view(), h.view(), h.view(), 1.0, 1),
            Err(DynamicsError::DimensionMismatch { .. })
        ));
    }
}
