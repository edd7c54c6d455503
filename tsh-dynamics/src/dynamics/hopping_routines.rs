use crate::c64;
use crate::constants::K_BOLTZMANN;
use crate::dynamics::schroedinger_integration::PropagationRecord;
use crate::error::{Anomaly, DynamicsError, Result};
use crate::initialization::HopScheme;
use crate::linalg::populations;
use log::debug;
use ndarray::prelude::*;

/// Probabilities to leave the active state towards every other state within one
/// step. The probability to stay is 1 - sum of all entries.
#[derive(Debug, Clone, PartialEq)]
pub struct HopProposal {
    pub active: usize,
    pub probabilities: Array1<f64>,
    pub anomalies: Vec<Anomaly>,
}

impl HopProposal {
    /// Proposal without any hop
    pub fn none(active: usize, nstates: usize) -> Self {
        Self {
            active,
            probabilities: Array1::zeros(nstates),
            anomalies: Vec::new(),
        }
    }

    pub fn stay_probability(&self) -> f64 {
        1.0 - self.probabilities.sum()
    }
}

/// Compute the hopping probabilities out of the `active` state for the interval
/// that is described by the propagation record. If a temperature is given, the
/// probabilities of upward hops are scaled by the Boltzmann factor exp(-dE/kT).
/// The dish scheme needs the probabilities of a decoherence event on every
/// state within the interval, all other schemes ignore them.
pub fn propose_hops(
    scheme: HopScheme,
    active: usize,
    record: &PropagationRecord,
    energies: ArrayView1<f64>,
    boltzmann_temperature: Option<f64>,
    decoherence_events: Option<ArrayView1<f64>>,
) -> Result<HopProposal> {
    let nstates: usize = energies.len();
    if active >= nstates {
        return Err(DynamicsError::DimensionMismatch {
            context: "active state index",
            expected: nstates,
            found: active,
        });
    }
    for amplitudes in record.amplitudes.iter() {
        DynamicsError::check_dimension("propagated amplitudes", nstates, amplitudes.len())?;
    }
    DynamicsError::check_dimension(
        "hamiltonians of the propagation record",
        record.amplitudes.len(),
        record.hamiltonians.len(),
    )?;

    let raw: Array1<f64> = match scheme {
        HopScheme::Adiabatic => Array1::zeros(nstates),
        HopScheme::Fssh => fssh_probabilities(active, record),
        HopScheme::Gfsh => gfsh_probabilities(active, record),
        HopScheme::Mssh => mssh_probabilities(active, record),
        HopScheme::LocalDiabatization => local_diabatization_probabilities(active, record),
        HopScheme::Dish => {
            let events: ArrayView1<f64> = decoherence_events.ok_or_else(|| {
                DynamicsError::InvalidConfiguration(String::from(
                    "dish hops need the decoherence event probabilities",
                ))
            })?;
            DynamicsError::check_dimension("decoherence event probabilities", nstates, events.len())?;
            dish_probabilities(record, events)
        }
    };
    Ok(finalize_probabilities(
        active,
        raw,
        energies,
        boltzmann_temperature,
    ))
}

/// Fewest switches probabilities, J. C. Tully, J. Chem. Phys. 93, 1061 (1990).
/// The population flux F_ab = 2 Im(H_ba rho_ab) / rho_aa is integrated with the
/// trapezoidal rule over the segments of the record.
fn fssh_probabilities(active: usize, record: &PropagationRecord) -> Array1<f64> {
    let nstates: usize = record.initial().len();
    let flux = |point: usize| -> Array1<f64> {
        let c: ArrayView1<c64> = record.amplitudes[point].view();
        let h: &Array2<c64> = &record.hamiltonians[point];
        let rho_aa: f64 = c[active].norm_sqr();
        let mut f: Array1<f64> = Array1::zeros(nstates);
        if rho_aa > 0.0 {
            for b in 0..nstates {
                if b != active {
                    let rho_ab = c[active] * c[b].conj();
                    f[b] = 2.0 * (h[[b, active]] * rho_ab).im / rho_aa;
                }
            }
        }
        f
    };

    let mut probabilities: Array1<f64> = Array1::zeros(nstates);
    let mut f_last: Array1<f64> = flux(0);
    for point in 1..record.amplitudes.len() {
        let f_next: Array1<f64> = flux(point);
        probabilities.scaled_add(0.5 * record.timestep, &(&f_last + &f_next));
        f_last = f_next;
    }
    probabilities
}

/// Global flux surface hopping, L. Wang, D. Trivedi, O. V. Prezhdo,
/// J. Chem. Theory Comput. 10, 3598 (2014). Only states that gain population
/// can be reached and only if the active state loses population.
fn gfsh_probabilities(active: usize, record: &PropagationRecord) -> Array1<f64> {
    let old_occupations: Array1<f64> = populations(record.initial());
    let occupations: Array1<f64> = populations(record.last());
    let nstates: usize = occupations.len();
    let derivatives: Array1<f64> = &occupations - &old_occupations;

    let mut hopping_probabilities: Array1<f64> = Array1::zeros(nstates);
    if derivatives[active] < 0.0 && old_occupations[active] > 0.0 {
        let probability: f64 = derivatives
            .iter()
            .filter(|&&val| val > 0.0)
            .sum();
        for state in 0..nstates {
            if derivatives[state] > 0.0 {
                hopping_probabilities[state] =
                    -1.0 * (derivatives[active] / old_occupations[active]) * derivatives[state]
                        / probability;
            }
        }
    }
    hopping_probabilities
}

/// Markov state surface hopping, S. Akimov, J. Phys. Chem. Lett. 9, 6096 (2018).
/// The probability of a state is its population after the step.
fn mssh_probabilities(active: usize, record: &PropagationRecord) -> Array1<f64> {
    let mut probabilities: Array1<f64> = populations(record.last());
    probabilities[active] = 0.0;
    probabilities
}

/// Decoherence induced surface hopping, H. M. Jaeger, S. Fischer, O. V. Prezhdo,
/// J. Chem. Phys. 137, 22A545 (2012). A decoherence event on state j happens
/// with probability q_j and collapses the wavefunction onto j with probability
/// |c_j|^2, so the hop into j is proposed with |c_j|^2 q_j.
fn dish_probabilities(record: &PropagationRecord, events: ArrayView1<f64>) -> Array1<f64> {
    let mut probabilities: Array1<f64> = populations(record.last());
    probabilities *= &events.mapv(|q| q.clamp(0.0, 1.0));
    probabilities
}

/// Hopping probabilities of the local diabatization scheme, eqn. (19) in
/// G. Granucci, M. Persico, A. Toniolo, J. Chem. Phys. 114, 10608 (2001)
fn local_diabatization_probabilities(active: usize, record: &PropagationRecord) -> Array1<f64> {
    let c_0 = record.initial();
    let c_1 = record.last();
    let p = &record.propagator;
    let nstates: usize = c_0.len();
    let mut probabilities: Array1<f64> = Array1::zeros(nstates);

    let rho_aa_old: f64 = c_0[active].norm_sqr();
    let rho_aa: f64 = c_1[active].norm_sqr();
    if rho_aa_old <= 0.0 || rho_aa >= rho_aa_old {
        return probabilities;
    }
    let denominator: f64 =
        rho_aa_old - (c_1[active] * p[[active, active]].conj() * c_0[active].conj()).re;
    if denominator.abs() < f64::EPSILON {
        return probabilities;
    }
    let loss: f64 = (rho_aa_old - rho_aa) / rho_aa_old;
    for b in 0..nstates {
        if b != active {
            let transfer: f64 = (c_1[b] * p[[b, active]].conj() * c_0[active].conj()).re;
            probabilities[b] = loss * transfer / denominator;
        }
    }
    probabilities
}

/// Negative values are floored to zero, all values are clamped to [0, 1] and the
/// vector is rescaled if the total probability to leave exceeds one.
fn finalize_probabilities(
    active: usize,
    mut probabilities: Array1<f64>,
    energies: ArrayView1<f64>,
    boltzmann_temperature: Option<f64>,
) -> HopProposal {
    let mut anomalies: Vec<Anomaly> = Vec::new();
    for (state, prob) in probabilities.iter_mut().enumerate() {
        if state == active || !prob.is_finite() {
            *prob = 0.0;
            continue;
        }
        if *prob < 0.0 {
            let anomaly = Anomaly::NegativeProbability {
                from: active,
                to: state,
                value: *prob,
            };
            debug!("{}", anomaly);
            anomalies.push(anomaly);
            *prob = 0.0;
        }
        *prob = prob.min(1.0);
        if let Some(temperature) = boltzmann_temperature {
            let delta_e: f64 = energies[state] - energies[active];
            if delta_e > 0.0 {
                *prob *= (-delta_e / (K_BOLTZMANN * temperature)).exp();
            }
        }
    }
    let total: f64 = probabilities.sum();
    if total > 1.0 {
        probabilities /= total;
    }
    HopProposal {
        active,
        probabilities,
        anomalies,
    }
}
