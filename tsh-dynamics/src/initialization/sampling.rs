use crate::c64;
use crate::constants;
use crate::error::{DynamicsError, Result};
use crate::initialization::{
    ElectronicInitConfiguration, ElectronicSampling, NuclearConfiguration, NuclearSampling,
    NuclearState,
};
use ndarray::prelude::*;
use rand::distributions::Standard;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;

/// Struct that holds a Boltzmann distribution of the momenta
pub struct BoltzmannMomenta {
    dist: Normal<f64>,
}

impl BoltzmannMomenta {
    /// Initialize the distribution from a given temperature
    pub fn new(temperature: f64) -> Result<BoltzmannMomenta> {
        let dist = Normal::new(0.0, f64::sqrt(constants::K_BOLTZMANN * temperature))
            .map_err(|err| DynamicsError::InvalidConfiguration(err.to_string()))?;
        Ok(BoltzmannMomenta { dist })
    }

    /// p = sqrt(m) * xi with xi from N(0, kT)
    pub fn sample<R: Rng>(&self, mass: f64, rng: &mut R) -> f64 {
        f64::sqrt(mass) * self.dist.sample(rng)
    }
}

/// Widths of the ground state Wigner distribution of a harmonic oscillator with
/// force constant k and mass M, sigma_q = sqrt(1/2 sqrt(1/(kM))) and
/// sigma_p = sqrt(1/2 sqrt(kM))
pub fn harmonic_widths(force_constant: f64, mass: f64) -> (f64, f64) {
    let km: f64 = force_constant * mass;
    ((0.5 * (1.0 / km).sqrt()).sqrt(), (0.5 * km.sqrt()).sqrt())
}

/// Sample the nuclear initial conditions of one trajectory
pub fn sample_nuclear<R: Rng>(config: &NuclearConfiguration, rng: &mut R) -> Result<NuclearState> {
    let ndof: usize = config.positions.len();
    let mut positions: Array1<f64> = Array1::from(config.positions.clone());
    let mut momenta: Array1<f64> = Array1::from(config.momenta.clone());
    let masses: Array1<f64> = Array1::from(config.masses.clone());

    let (sample_q, sample_p): (bool, bool) = match config.sampling {
        NuclearSampling::Fixed | NuclearSampling::Boltzmann => (false, false),
        NuclearSampling::Momenta => (false, true),
        NuclearSampling::Positions => (true, false),
        NuclearSampling::Both => (true, true),
    };
    if sample_q || sample_p {
        for dof in 0..ndof {
            let (sigma_q, sigma_p) = harmonic_widths(config.force_constant[dof], masses[dof]);
            if sample_q {
                let dist = Normal::new(positions[dof], sigma_q)
                    .map_err(|err| DynamicsError::InvalidConfiguration(err.to_string()))?;
                positions[dof] = dist.sample(rng);
            }
            if sample_p {
                let dist = Normal::new(momenta[dof], sigma_p)
                    .map_err(|err| DynamicsError::InvalidConfiguration(err.to_string()))?;
                momenta[dof] = dist.sample(rng);
            }
        }
    }
    if config.sampling == NuclearSampling::Boltzmann {
        let boltzmann: BoltzmannMomenta = BoltzmannMomenta::new(config.temperature)?;
        for dof in 0..ndof {
            momenta[dof] = boltzmann.sample(masses[dof], rng);
        }
    }
    NuclearState::new(positions, momenta, masses)
}

/// Initial electronic amplitudes in the representation of the configuration
pub fn sample_amplitudes<R: Rng>(
    config: &ElectronicInitConfiguration,
    nstates: usize,
    rng: &mut R,
) -> Array1<c64> {
    let mut amplitudes: Array1<c64> = Array1::zeros(nstates);
    match config.sampling {
        ElectronicSampling::Fixed => amplitudes[config.istate] = c64::from(1.0),
        ElectronicSampling::RandomPhase => {
            amplitudes[config.istate] = random_phase(rng);
        }
        ElectronicSampling::Populations => {
            for (state, pop) in config.populations.iter().enumerate() {
                amplitudes[state] = c64::from(pop.sqrt());
            }
        }
        ElectronicSampling::PopulationsRandomPhase => {
            for (state, pop) in config.populations.iter().enumerate() {
                amplitudes[state] = random_phase(rng) * pop.sqrt();
            }
        }
    }
    amplitudes
}

fn random_phase<R: Rng>(rng: &mut R) -> c64 {
    let ksi: f64 = rng.sample(Standard);
    c64::from_polar(1.0, 2.0 * PI * ksi)
}

/// Draw a state index from the given populations
pub fn sample_state<R: Rng>(populations: ArrayView1<f64>, rng: &mut R) -> usize {
    let total: f64 = populations.sum();
    let ksi: f64 = rng.sample::<f64, _>(Standard) * total;
    let mut sum: f64 = 0.0;
    for (state, pop) in populations.iter().enumerate() {
        sum += pop;
        if ksi < sum {
            return state;
        }
    }
    populations.len().saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initialization::DynamicConfiguration;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn fixed_sampling_keeps_the_input() {
        let config = DynamicConfiguration::from_toml(
            "[nuclear]\npositions = [-10.0]\nmomenta = [20.0]\nmasses = [2000.0]",
        )
        .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let nuclear = sample_nuclear(&config.nuclear, &mut rng).unwrap();
        assert_eq!(nuclear.positions, array![-10.0]);
        assert_eq!(nuclear.momenta, array![20.0]);
    }

    #[test]
    fn sampled_momenta_have_the_harmonic_width() {
        let config = DynamicConfiguration::from_toml(
            "[nuclear]\npositions = [-10.0]\nmomenta = [20.0]\nmasses = [2000.0]\nsampling = \"momenta\"\nforce_constant = [0.01]",
        )
        .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let samples: Vec<f64> = (0..4000)
            .map(|_| sample_nuclear(&config.nuclear, &mut rng).unwrap().momenta[0])
            .collect();
        let mean: f64 = samples.iter().sum::<f64>() / samples.len() as f64;
        let var: f64 = samples.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / samples.len() as f64;
        let (_, sigma_p) = harmonic_widths(0.01, 2000.0);
        assert!((mean - 20.0).abs() < 0.1);
        assert!((var.sqrt() / sigma_p - 1.0).abs() < 0.05);
    }

    #[test]
    fn population_sampling_gives_normalized_amplitudes() {
        let config = DynamicConfiguration::from_toml(
            "nstates = 3\n[electronic_init]\nsampling = \"populations_random_phase\"\npopulations = [0.5, 0.3, 0.2]",
        )
        .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let c: Array1<c64> = sample_amplitudes(&config.electronic_init, 3, &mut rng);
        let pops: Array1<f64> = c.mapv(|x| x.norm_sqr());
        assert!((pops[0] - 0.5).abs() < 1e-12 && (pops[2] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn state_sampling_follows_the_populations() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let pops: Array1<f64> = array![0.25, 0.75];
        let upper: usize = (0..4000).filter(|_| sample_state(pops.view(), &mut rng) == 1).count();
        assert!((upper as f64 / 4000.0 - 0.75).abs() < 0.03);
    }
}
