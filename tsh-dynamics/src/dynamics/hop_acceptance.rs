use crate::constants::K_BOLTZMANN;
use crate::dynamics::hopping_routines::HopProposal;
use crate::error::Anomaly;
use crate::initialization::{
    DynamicConfiguration, FrustratedHopPolicy, HopAcceptance, NuclearState, RescalingDirection,
};
use log::{debug, info};
use ndarray::prelude::*;
use rand::distributions::Standard;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// States of a hop attempt within one step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum HopState {
    /// a target state was selected, the energy test is pending
    Proposed { from: usize, to: usize },
    /// the hop was realized without changing the momenta
    AcceptedEnergyOk { from: usize, to: usize },
    /// the hop was realized and p' = p - scaling * n
    AcceptedRescaled { from: usize, to: usize, scaling: f64 },
    /// the hop was rejected, the momentum along n was reversed if `reversed`
    RejectedFrustrated { from: usize, to: usize, reversed: bool },
    /// no hop was selected
    Unchanged,
}

impl HopState {
    /// Active state after the transition
    pub fn active_state(&self, current: usize) -> usize {
        match *self {
            HopState::AcceptedEnergyOk { to, .. } | HopState::AcceptedRescaled { to, .. } => to,
            _ => current,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(
            self,
            HopState::AcceptedEnergyOk { .. } | HopState::AcceptedRescaled { .. }
        )
    }

    /// true for every selected hop, accepted or frustrated
    pub fn is_attempt(&self) -> bool {
        !matches!(self, HopState::Unchanged)
    }
}

/// Result of the acceptance test of one step
#[derive(Debug, Clone, PartialEq)]
pub struct HopOutcome {
    pub state: HopState,
    pub draw: f64,
    pub anomaly: Option<Anomaly>,
}

/// Decides whether a proposed hop is realized and adjusts the nuclear momenta
#[derive(Debug, Clone)]
pub struct HopAcceptor {
    pub acceptance: HopAcceptance,
    pub direction: RescalingDirection,
    pub frustrated_policy: FrustratedHopPolicy,
    pub energy_tolerance: f64,
    pub temperature: f64,
    pub quantum_dofs: Option<Vec<usize>>,
}

impl HopAcceptor {
    pub fn new(config: &DynamicConfiguration) -> Self {
        Self {
            acceptance: config.hopping.acceptance,
            direction: config.rescaling_direction,
            frustrated_policy: config.frustrated_hop_policy,
            energy_tolerance: config.hopping.energy_tolerance,
            temperature: config.hopping.temperature,
            quantum_dofs: config.hopping.quantum_dofs.clone(),
        }
    }

    /// Select the target state by comparing the draw with the cumulative
    /// probabilities in ascending state order.
    pub fn select(&self, proposal: &HopProposal, draw: f64) -> HopState {
        let mut sum: f64 = 0.0;
        for (state, prob) in proposal.probabilities.iter().enumerate() {
            if state == proposal.active || *prob <= 0.0 {
                continue;
            }
            sum += prob;
            if draw < sum {
                return HopState::Proposed {
                    from: proposal.active,
                    to: state,
                };
            }
        }
        HopState::Unchanged
    }

    /// Run the full acceptance test of one step. Exactly one number is drawn for
    /// the selection, a second one only for the Boltzmann test of an upward hop.
    pub fn decide<R: Rng>(
        &self,
        proposal: &HopProposal,
        nuclear: &mut NuclearState,
        energies: ArrayView1<f64>,
        gradients: ArrayView2<f64>,
        derivative_couplings: ArrayView3<f64>,
        rng: &mut R,
    ) -> HopOutcome {
        let draw: f64 = rng.sample(Standard);
        let proposed: HopState = self.select(proposal, draw);
        let (state, anomaly) =
            self.resolve(proposed, nuclear, energies, gradients, derivative_couplings, rng);
        HopOutcome {
            state,
            draw,
            anomaly,
        }
    }

    /// Energy test of a proposed hop
    pub fn resolve<R: Rng>(
        &self,
        proposed: HopState,
        nuclear: &mut NuclearState,
        energies: ArrayView1<f64>,
        gradients: ArrayView2<f64>,
        derivative_couplings: ArrayView3<f64>,
        rng: &mut R,
    ) -> (HopState, Option<Anomaly>) {
        let (from, to) = match proposed {
            HopState::Proposed { from, to } => (from, to),
            other => return (other, None),
        };
        let delta_e: f64 = energies[to] - energies[from];

        match self.acceptance {
            HopAcceptance::Always => (HopState::AcceptedEnergyOk { from, to }, None),
            HopAcceptance::Boltzmann => {
                if delta_e <= 0.0 {
                    return (HopState::AcceptedEnergyOk { from, to }, None);
                }
                let factor: f64 = (-delta_e / (K_BOLTZMANN * self.temperature)).exp();
                let draw: f64 = rng.sample(Standard);
                if draw < factor {
                    (HopState::AcceptedEnergyOk { from, to }, None)
                } else {
                    debug!("upward hop {} -> {} rejected by the Boltzmann test", from, to);
                    (
                        HopState::RejectedFrustrated {
                            from,
                            to,
                            reversed: false,
                        },
                        None,
                    )
                }
            }
            HopAcceptance::Rescaling => {
                let raw: Array1<f64> = match self.direction {
                    RescalingDirection::AlongVelocity => nuclear.momenta.clone(),
                    RescalingDirection::AlongCoupling => {
                        derivative_couplings.slice(s![from, to, ..]).to_owned()
                    }
                    // F_to - F_from = g_from - g_to
                    RescalingDirection::ForceDifference => &gradients.row(from) - &gradients.row(to),
                };
                let direction: Array1<f64> = self.rescaling_direction(nuclear, raw);
                self.rescale(from, to, delta_e, nuclear, direction.view())
            }
        }
    }

    /// Zero all components outside of the quantum dofs
    fn restrict_to_quantum_dofs(&self, mut vector: Array1<f64>) -> Array1<f64> {
        if let Some(dofs) = self.quantum_dofs.as_ref() {
            for (dof, val) in vector.iter_mut().enumerate() {
                if !dofs.contains(&dof) {
                    *val = 0.0;
                }
            }
        }
        vector
    }

    /// Direction n of the momentum adjustment, restricted to the quantum dofs.
    /// A direction without any component on the quantum dofs (zero coupling,
    /// equal forces or a coupling that only acts on classical dofs) is replaced
    /// by the momenta of the quantum dofs.
    fn rescaling_direction(&self, nuclear: &NuclearState, raw: Array1<f64>) -> Array1<f64> {
        let direction: Array1<f64> = self.restrict_to_quantum_dofs(raw);
        if direction.iter().all(|&val| val == 0.0) {
            self.restrict_to_quantum_dofs(nuclear.momenta.clone())
        } else {
            direction
        }
    }

    /// Solve KE(p - gamma n) = KE(p) - dE for the smallest |gamma|.
    ///
    /// The direction comes from [`Self::rescaling_direction`], so it only
    /// vanishes if the quantum dofs are at rest. In that case no momentum can be
    /// exchanged and every hop outside of the energy tolerance is frustrated,
    /// downward hops included.
    fn rescale(
        &self,
        from: usize,
        to: usize,
        delta_e: f64,
        nuclear: &mut NuclearState,
        direction: ArrayView1<f64>,
    ) -> (HopState, Option<Anomaly>) {
        if delta_e.abs() < self.energy_tolerance {
            return (HopState::AcceptedEnergyOk { from, to }, None);
        }
        // calculate the rescaling factors
        let a: f64 = 0.5 * (&direction * &direction * &nuclear.inverse_masses).sum();
        let b: f64 = (&nuclear.momenta * &direction * &nuclear.inverse_masses).sum();
        let val: f64 = b.powi(2) - 4.0 * a * delta_e;

        // check frustrated hop
        if a <= 0.0 || val < 0.0 {
            let available: f64 = if a > 0.0 { b.powi(2) / (4.0 * a) } else { 0.0 };
            let anomaly = Anomaly::InsufficientEnergy {
                from,
                to,
                required: delta_e,
                available,
            };
            info!("{}", anomaly);
            let reversed: bool = a > 0.0 && self.frustrated_policy == FrustratedHopPolicy::Reverse;
            if reversed {
                let gamma: f64 = b / a;
                nuclear.momenta.scaled_add(-gamma, &direction);
            }
            return (HopState::RejectedFrustrated { from, to, reversed }, Some(anomaly));
        }

        let gamma: f64 = if b < 0.0 {
            (b + val.sqrt()) / (2.0 * a)
        } else {
            (b - val.sqrt()) / (2.0 * a)
        };
        debug!("Hop occurs, the pot. diff is {:.6} Ha, gamma = {:.6}", delta_e, gamma);
        nuclear.momenta.scaled_add(-gamma, &direction);
        (
            HopState::AcceptedRescaled {
                from,
                to,
                scaling: gamma,
            },
            None,
        )
    }
}
