use crate::c64;
use crate::dynamics::hop_acceptance::{HopOutcome, HopState};
use crate::initialization::system::normalize_coefficients;
use crate::initialization::{CollapseOption, DecoherenceScheme, DynamicConfiguration, ResetTrigger};
use crate::linalg::populations;
use log::debug;
use ndarray::prelude::*;

/// Correction of the overcoherence of the electronic amplitudes. All operations
/// act on adiabatic amplitudes and return a normalized vector.
#[derive(Debug, Clone)]
pub struct DecoherenceCorrector {
    pub scheme: DecoherenceScheme,
    pub reset_trigger: ResetTrigger,
    pub collapse: CollapseOption,
    pub c_param: f64,
    pub eps_param: f64,
    /// dephasing rates r_ij between the adiabatic states
    pub rates: Option<Array2<f64>>,
}

impl DecoherenceCorrector {
    pub fn new(config: &DynamicConfiguration) -> Self {
        let n: usize = config.decoherence.rates.len();
        let rates: Option<Array2<f64>> = Array2::from_shape_vec(
            (n, n),
            config.decoherence.rates.iter().flatten().copied().collect(),
        )
        .ok()
        .filter(|_| n > 0);
        Self {
            scheme: config.decoherence_scheme,
            reset_trigger: config.decoherence.reset_trigger,
            collapse: config.decoherence.collapse,
            c_param: config.decoherence.c_param,
            eps_param: config.decoherence.eps_param,
            rates,
        }
    }

    /// Apply the configured scheme after the hop decision of the step
    pub fn apply(
        &self,
        amplitudes: ArrayView1<c64>,
        active: usize,
        hop: &HopState,
        energies: ArrayView1<f64>,
        kinetic_energy: f64,
        dt: f64,
    ) -> Array1<c64> {
        match self.scheme {
            DecoherenceScheme::None => amplitudes.to_owned(),
            DecoherenceScheme::Reset => {
                let triggered: bool = match self.reset_trigger {
                    ResetTrigger::Accepted => hop.is_accepted(),
                    ResetTrigger::Attempted => hop.is_attempt(),
                };
                if triggered {
                    debug!("amplitudes collapsed onto state {}", active);
                    collapse_onto(amplitudes, active, self.collapse)
                } else {
                    amplitudes.to_owned()
                }
            }
            DecoherenceScheme::Damped => energy_based_damping(
                amplitudes,
                active,
                energies,
                kinetic_energy,
                dt,
                self.c_param,
                self.eps_param,
            ),
            DecoherenceScheme::Rates => {
                let rates: Array1<f64> = self
                    .rate_row(active, amplitudes.len())
                    .unwrap_or_else(|| Array1::zeros(amplitudes.len()));
                rate_damping(amplitudes, active, rates.view(), dt)
            }
        }
    }

    /// Row of the user rate matrix that belongs to the active state
    fn rate_row(&self, active: usize, nstates: usize) -> Option<Array1<f64>> {
        self.rates
            .as_ref()
            .filter(|rates| rates.nrows() == nstates && active < nstates)
            .map(|rates| rates.row(active).to_owned())
    }

    /// Dephasing rates of all states with respect to the active one. The user
    /// matrix is used if it is given, the energy based rates otherwise.
    pub fn decoherence_rates(
        &self,
        active: usize,
        energies: ArrayView1<f64>,
        kinetic_energy: f64,
    ) -> Array1<f64> {
        self.rate_row(active, energies.len()).unwrap_or_else(|| {
            energy_based_rates(active, energies, kinetic_energy, self.c_param, self.eps_param)
        })
    }

    /// Probabilities q_j = 1 - exp(-r_j dt) of a decoherence event on state j
    /// within one step, zero for the active state
    pub fn event_probabilities(
        &self,
        active: usize,
        energies: ArrayView1<f64>,
        kinetic_energy: f64,
        dt: f64,
    ) -> Array1<f64> {
        let mut events: Array1<f64> = self
            .decoherence_rates(active, energies, kinetic_energy)
            .mapv(|rate| -(-rate * dt).exp_m1());
        if active < events.len() {
            events[active] = 0.0;
        }
        events
    }
}

/// Instantaneous decoherence: all population is moved into the active state
pub fn collapse_onto(
    amplitudes: ArrayView1<c64>,
    active: usize,
    collapse: CollapseOption,
) -> Array1<c64> {
    let mut new_coefficients: Array1<c64> = Array1::zeros(amplitudes.len());
    let c_a: c64 = amplitudes[active];
    new_coefficients[active] = match collapse {
        CollapseOption::PreservePhase if c_a.norm() > 0.0 => c_a / c_a.norm(),
        _ => c64::from(1.0),
    };
    new_coefficients
}

/// Remove one state from the wavefunction and renormalize the rest. If nothing
/// is left, the amplitudes collapse onto the active state.
fn project_out(
    amplitudes: ArrayView1<c64>,
    state: usize,
    active: usize,
    collapse: CollapseOption,
) -> Array1<c64> {
    let mut new_coefficients: Array1<c64> = amplitudes.to_owned();
    new_coefficients[state] = c64::from(0.0);
    if populations(new_coefficients.view()).sum() > 0.0 {
        normalize_coefficients(new_coefficients.view())
    } else {
        collapse_onto(amplitudes, active, collapse)
    }
}

/// Decoherence events of the decoherence induced surface hopping,
/// H. M. Jaeger, S. Fischer, O. V. Prezhdo, J. Chem. Phys. 137, 22A545 (2012).
/// An event on state j collapses the wavefunction onto j with probability
/// |c_j|^2 and projects j out of the wavefunction otherwise. The collapse is the
/// hop that was proposed towards j, a frustrated one ends as a projection.
/// The projections use the draw of the hop selection, their intervals of width
/// (1 - |c_j|^2) q_j follow the interval [0, hop_total) of the hops.
pub fn dish_projection(
    amplitudes: ArrayView1<c64>,
    active: usize,
    outcome: &HopOutcome,
    hop_total: f64,
    events: ArrayView1<f64>,
    collapse: CollapseOption,
) -> Array1<c64> {
    match outcome.state {
        HopState::AcceptedEnergyOk { to, .. } | HopState::AcceptedRescaled { to, .. } => {
            debug!("decoherence event, collapse onto state {}", to);
            collapse_onto(amplitudes, to, collapse)
        }
        HopState::RejectedFrustrated { to, .. } => {
            debug!("decoherence event, state {} is projected out", to);
            project_out(amplitudes, to, active, collapse)
        }
        HopState::Proposed { .. } | HopState::Unchanged => {
            let c: Array1<c64> = normalize_coefficients(amplitudes);
            let mut upper: f64 = hop_total;
            for (state, q) in events.iter().enumerate() {
                if state == active {
                    continue;
                }
                upper += (1.0 - c[state].norm_sqr()).max(0.0) * q;
                if outcome.draw < upper {
                    debug!("decoherence event, state {} is projected out", state);
                    return project_out(c.view(), state, active, collapse);
                }
            }
            c
        }
    }
}

/// Rates r_j = |E_j - E_K| / (C + eps / KE) of the energy based decoherence, see
/// [`energy_based_damping`]. Without kinetic energy no state decoheres.
pub fn energy_based_rates(
    active: usize,
    energies: ArrayView1<f64>,
    kinetic_energy: f64,
    c_param: f64,
    eps_param: f64,
) -> Array1<f64> {
    Array1::from_shape_fn(energies.len(), |state| {
        let gap: f64 = (energies[state] - energies[active]).abs();
        if state == active || kinetic_energy <= 0.0 || gap <= 0.0 {
            0.0
        } else {
            gap / (c_param + eps_param / kinetic_energy)
        }
    })
}

/// Damp every inactive amplitude by exp(-r_j dt) and give the lost population
/// to the active state, whose phase is kept
pub fn rate_damping(
    amplitudes: ArrayView1<c64>,
    active: usize,
    rates: ArrayView1<f64>,
    dt: f64,
) -> Array1<c64> {
    let mut new_coefficients: Array1<c64> = normalize_coefficients(amplitudes);
    let mut sm: f64 = 0.0;
    for state in 0..new_coefficients.len() {
        if state == active {
            continue;
        }
        new_coefficients[state] *= (-dt * rates[state]).exp();
        sm += new_coefficients[state].norm_sqr();
    }
    let tmp: f64 = new_coefficients[active].norm_sqr();
    let remaining: f64 = (1.0 - sm).max(0.0);
    if tmp > 0.0 {
        new_coefficients[active] *= (remaining / tmp).sqrt();
    } else {
        new_coefficients[active] = c64::from(remaining.sqrt());
    }
    new_coefficients
}

/// decoherence correction according to eqn. (17) in
/// G. Granucci, M. Persico,
/// "Critical appraisal of the fewest switches algorithm for surface hopping",
/// J. Chem. Phys. 126, 134114 (2007)
/// If the trajectory is in the current state K, the coefficients of the other
/// states J != K are made to decay exponentially, C'_J = exp(-dt/tau_JK) C_J.
/// The decay time is proportional to the inverse of the energy gap |E_J-E_K|,
/// so that the coherences C_J*C_K decay very quickly if the energy gap between
/// the two states is large. The electronic transitions become irreversible.
pub fn energy_based_damping(
    amplitudes: ArrayView1<c64>,
    active: usize,
    energies: ArrayView1<f64>,
    kinetic_energy: f64,
    dt: f64,
    c_param: f64,
    eps_param: f64,
) -> Array1<c64> {
    let rates: Array1<f64> =
        energy_based_rates(active, energies, kinetic_energy, c_param, eps_param);
    rate_damping(amplitudes, active, rates.view(), dt)
}
