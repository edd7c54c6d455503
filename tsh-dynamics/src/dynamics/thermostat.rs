use crate::constants::K_BOLTZMANN;
use crate::initialization::{ThermostatConfiguration, ThermostatKind};
use ndarray::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

/// Per trajectory bath that acts on the nuclear momenta once per step
pub trait Thermostat: Send {
    fn propagate(
        &mut self,
        momenta: ArrayView1<f64>,
        inverse_masses: ArrayView1<f64>,
        dt: f64,
    ) -> Array1<f64>;
    fn get_temperature(&self, kinetic_energy: f64) -> f64;
}

/// Instantaneous temperature T = 2 KE / (n k_B) of `nfree` degrees of freedom
pub fn temperature(kinetic_energy: f64, nfree: usize) -> f64 {
    if nfree == 0 {
        return 0.0;
    }
    2.0 * kinetic_energy / (nfree as f64 * K_BOLTZMANN)
}

fn kinetic_energy(momenta: ArrayView1<f64>, inverse_masses: ArrayView1<f64>) -> f64 {
    0.5 * (&momenta * &momenta * &inverse_masses).sum()
}

pub struct NullThermostat {
    pub nfree: usize,
}

impl NullThermostat {
    pub fn new(nfree: usize) -> Self {
        NullThermostat { nfree }
    }
}

impl Thermostat for NullThermostat {
    fn propagate(
        &mut self,
        momenta: ArrayView1<f64>,
        _inverse_masses: ArrayView1<f64>,
        _dt: f64,
    ) -> Array1<f64> {
        momenta.to_owned()
    }

    fn get_temperature(&self, kinetic_energy: f64) -> f64 {
        temperature(kinetic_energy, self.nfree)
    }
}

/// Weak coupling to a heat bath, H. J. C. Berendsen et al.,
/// J. Chem. Phys. 81, 3684 (1984)
pub struct BerendsenThermostat {
    pub tau: f64,
    pub nfree: usize,
    pub target_temperature: f64,
}

impl BerendsenThermostat {
    pub fn new(tau: f64, nfree: usize, temperature: f64) -> Self {
        BerendsenThermostat {
            tau,
            nfree,
            target_temperature: temperature,
        }
    }
}

impl Thermostat for BerendsenThermostat {
    fn get_temperature(&self, kinetic_energy: f64) -> f64 {
        temperature(kinetic_energy, self.nfree)
    }

    fn propagate(
        &mut self,
        momenta: ArrayView1<f64>,
        inverse_masses: ArrayView1<f64>,
        dt: f64,
    ) -> Array1<f64> {
        let current_temperature: f64 =
            self.get_temperature(kinetic_energy(momenta, inverse_masses));
        if current_temperature <= 0.0 {
            return momenta.to_owned();
        }
        let scaling_factor: f64 = (1.0
            + (dt / self.tau) * (self.target_temperature / current_temperature - 1.0))
            .max(0.0)
            .sqrt();

        scaling_factor * &momenta
    }
}

/// Ornstein-Uhlenbeck step of the Langevin equation for every degree of freedom,
/// p' = c p + sqrt((1 - c^2) m k T) xi with c = exp(-friction dt)
pub struct LangevinThermostat {
    pub friction: f64,
    pub nfree: usize,
    pub target_temperature: f64,
    rng: ChaCha8Rng,
}

impl LangevinThermostat {
    /// The random numbers of the bath come from their own stream, so the hop
    /// decisions of a trajectory do not depend on the thermostat.
    pub fn new(friction: f64, nfree: usize, temperature: f64, seed: u64) -> Self {
        let mut rng: ChaCha8Rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(1);
        LangevinThermostat {
            friction,
            nfree,
            target_temperature: temperature,
            rng,
        }
    }
}

impl Thermostat for LangevinThermostat {
    fn get_temperature(&self, kinetic_energy: f64) -> f64 {
        temperature(kinetic_energy, self.nfree)
    }

    fn propagate(
        &mut self,
        momenta: ArrayView1<f64>,
        inverse_masses: ArrayView1<f64>,
        dt: f64,
    ) -> Array1<f64> {
        let c: f64 = (-self.friction * dt).exp();
        let kt: f64 = K_BOLTZMANN * self.target_temperature;
        let mut new_momenta: Array1<f64> = Array1::zeros(momenta.len());
        for (dof, p_new) in new_momenta.iter_mut().enumerate() {
            let xi: f64 = StandardNormal.sample(&mut self.rng);
            let sigma: f64 = ((1.0 - c * c) * kt / inverse_masses[dof]).sqrt();
            *p_new = c * momenta[dof] + sigma * xi;
        }
        new_momenta
    }
}

/// Create the thermostat of one trajectory
pub fn build_thermostat(
    config: &ThermostatConfiguration,
    nfree: usize,
    seed: u64,
) -> Box<dyn Thermostat> {
    match config.kind {
        ThermostatKind::None => Box::new(NullThermostat::new(nfree)),
        ThermostatKind::Berendsen => Box::new(BerendsenThermostat::new(
            config.time_coupling,
            nfree,
            config.temperature,
        )),
        ThermostatKind::Langevin => Box::new(LangevinThermostat::new(
            config.friction,
            nfree,
            config.temperature,
            seed,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub const EPSILON: f64 = 1e-12;

    #[test]
    fn null_thermostat_keeps_the_momenta() {
        let mut thermostat = NullThermostat::new(2);
        let p: Array1<f64> = array![1.0, -2.0];
        let inv_m: Array1<f64> = array![0.5, 0.5];
        assert_eq!(thermostat.propagate(p.view(), inv_m.view(), 1.0), p);
    }

    #[test]
    fn berendsen_drives_towards_the_target_temperature() {
        let inv_m: Array1<f64> = array![1.0 / 2000.0];
        // kinetic energy that corresponds to 600 K
        let p: Array1<f64> = array![(K_BOLTZMANN * 600.0 * 2000.0_f64).sqrt()];
        let mut thermostat = BerendsenThermostat::new(100.0, 1, 300.0);
        let t_before: f64 = thermostat.get_temperature(kinetic_energy(p.view(), inv_m.view()));
        assert!((t_before - 600.0).abs() < 1e-8);

        let p_new: Array1<f64> = thermostat.propagate(p.view(), inv_m.view(), 10.0);
        let t_after: f64 = thermostat.get_temperature(kinetic_energy(p_new.view(), inv_m.view()));
        assert!(t_after < t_before && t_after > 300.0);
        // lambda^2 = 1 + dt/tau (T0/T - 1)
        assert!((t_after / t_before - (1.0 + 0.1 * (0.5 - 1.0))).abs() < EPSILON);
    }

    #[test]
    fn langevin_thermalizes_an_ensemble_of_free_particles() {
        let mut thermostat = LangevinThermostat::new(0.05, 1, 300.0, 7);
        let inv_m: Array1<f64> = Array1::from_elem(2000, 1.0 / 2000.0);
        let mut p: Array1<f64> = Array1::zeros(2000);
        for _ in 0..200 {
            p = thermostat.propagate(p.view(), inv_m.view(), 1.0);
        }
        let t: f64 = temperature(kinetic_energy(p.view(), inv_m.view()), 2000);
        assert!((t - 300.0).abs() < 30.0, "T = {}", t);
    }

    #[test]
    fn langevin_is_reproducible() {
        let inv_m: Array1<f64> = array![1.0 / 2000.0, 1.0 / 1000.0];
        let p: Array1<f64> = array![10.0, -3.0];
        let mut first = LangevinThermostat::new(0.01, 2, 300.0, 3);
        let mut second = LangevinThermostat::new(0.01, 2, 300.0, 3);
        assert_eq!(
            first.propagate(p.view(), inv_m.view(), 2.0),
            second.propagate(p.view(), inv_m.view(), 2.0)
        );
    }
}
