use crate::dynamics::simulation::{advance, DynamicsContext, TrajectoryResult};
use crate::dynamics::statistics::EnsembleObservables;
use crate::dynamics::thermostat::{build_thermostat, Thermostat};
use crate::error::Result;
use crate::initialization::{trajectory_rng, DynamicConfiguration, DynamicsVariables};
use crate::interface::HamiltonianProvider;
use log::{info, warn};
use rand::RngCore;
use std::sync::atomic::AtomicBool;

/// Outcome of an ensemble run
#[derive(Debug)]
pub struct EnsembleReport {
    /// one entry per trajectory, in the order of the trajectory indices
    pub results: Vec<TrajectoryResult>,
    pub observables: EnsembleObservables,
    /// state of the ensemble after the last step, the input of a restart
    pub variables: DynamicsVariables,
}

impl EnsembleReport {
    pub fn nfinished(&self) -> usize {
        self.results.iter().filter(|result| result.is_ok()).count()
    }

    pub fn nfailed(&self) -> usize {
        self.results.len() - self.nfinished()
    }
}

/// Independent trajectories that share one Hamiltonian provider
pub struct Ensemble<'a> {
    pub ctx: DynamicsContext,
    provider: &'a dyn HamiltonianProvider,
    variables: DynamicsVariables,
}

impl<'a> Ensemble<'a> {
    /// Sample the initial conditions of all `config.ntraj` trajectories
    pub fn new(
        config: &DynamicConfiguration,
        provider: &'a dyn HamiltonianProvider,
    ) -> Result<Self> {
        let variables: DynamicsVariables = DynamicsVariables::new(config, provider)?;
        Self::from_variables(config, provider, variables)
    }

    /// Continue from a given state of the ensemble, e.g. a restart file
    pub fn from_variables(
        config: &DynamicConfiguration,
        provider: &'a dyn HamiltonianProvider,
        variables: DynamicsVariables,
    ) -> Result<Self> {
        let ctx = DynamicsContext::new(config)?;
        config.check_provider(provider)?;
        for trajectory in variables.trajectories.iter() {
            if let Some(message) = trajectory.failure.as_ref() {
                warn!("trajectory {} will not be propagated: {}", trajectory.index, message);
            }
        }
        Ok(Self {
            ctx,
            provider,
            variables,
        })
    }

    pub fn variables(&self) -> &DynamicsVariables {
        &self.variables
    }

    /// One thermostat per nuclear path. The seed of every bath is derived from
    /// the generator of the path, so it is the same for every run.
    pub fn thermostats(&self) -> Vec<Box<dyn Thermostat>> {
        let config = &self.ctx.config;
        let nfree: usize = self.ctx.nfree();
        (0..self.variables.npaths())
            .map(|path| {
                let seed: u64 = trajectory_rng(config.seed, path).next_u64();
                build_thermostat(&config.thermostat_params, nfree, seed)
            })
            .collect()
    }

    /// Propagate all trajectories up to `nstep` steps. The ensemble itself is not
    /// changed, so repeated runs give the same report. The stop flag is checked
    /// between two steps.
    pub fn run(&self, stop: &AtomicBool) -> Result<EnsembleReport> {
        let mut variables: DynamicsVariables = self.variables.clone();
        let mut thermostats: Vec<Box<dyn Thermostat>> = self.thermostats();
        let nsteps: usize = self.ctx.config.nstep.saturating_sub(variables.step);
        info!(
            "propagate {} trajectories for {} steps",
            variables.ntraj(),
            nsteps
        );

        let results: Vec<TrajectoryResult> = advance(
            &self.ctx,
            &mut variables,
            self.provider,
            &mut thermostats,
            nsteps,
            Some(stop),
        )?;
        let observables = EnsembleObservables::from_results(&results, self.ctx.config.nstates);
        let report = EnsembleReport {
            results,
            observables,
            variables,
        };
        info!(
            "{} trajectories finished, {} failed",
            report.nfinished(),
            report.nfailed()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::test_models::LinearCrossing;
    use std::sync::atomic::Ordering;

    fn config(ntraj: usize, extra: &str) -> DynamicConfiguration {
        DynamicConfiguration::from_toml(&format!(
            "ntraj = {}\nnstep = 250\nintegration_timestep = 2.0\nseed = 5\n{}\n\
             [nuclear]\npositions = [-5.0]\nmomenta = [30.0]\nmasses = [2000.0]",
            ntraj, extra
        ))
        .unwrap()
    }

    #[test]
    fn results_do_not_depend_on_the_number_of_threads() {
        let provider = LinearCrossing::default();
        let config = config(40, "");
        let ensemble = Ensemble::new(&config, &provider).unwrap();
        let stop = AtomicBool::new(false);

        let serial = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        let parallel = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        let first = serial.install(|| ensemble.run(&stop)).unwrap();
        let second = parallel.install(|| ensemble.run(&stop)).unwrap();

        assert_eq!(first.nfinished(), 40);
        assert_eq!(first.observables, second.observables);
        assert_eq!(first.variables, second.variables);
    }

    #[test]
    fn stop_flag_ends_the_run_at_a_step_boundary() {
        let provider = LinearCrossing::default();
        let config = config(40, "");
        let ensemble = Ensemble::new(&config, &provider).unwrap();
        let stop = AtomicBool::new(true);
        let report = ensemble.run(&stop).unwrap();
        assert_eq!(report.variables.step, 0);
        assert!(report.results.iter().all(|result| result.as_ref().unwrap().steps.is_empty()));

        stop.store(false, Ordering::SeqCst);
        let report = ensemble.run(&stop).unwrap();
        assert_eq!(report.variables.step, 250);
    }

    #[test]
    fn restart_continues_the_same_trajectories() {
        let provider = LinearCrossing::default();
        let full = config(40, "");
        let stop = AtomicBool::new(false);

        let mut first_half = full.clone();
        first_half.nstep = 120;
        let report = Ensemble::new(&first_half, &provider).unwrap().run(&stop).unwrap();
        let continued = Ensemble::from_variables(&full, &provider, report.variables)
            .unwrap()
            .run(&stop)
            .unwrap();
        let direct = Ensemble::new(&full, &provider).unwrap().run(&stop).unwrap();
        assert_eq!(continued.variables, direct.variables);
    }

    #[test]
    fn upper_state_is_populated_behind_the_crossing() {
        let provider = LinearCrossing::default();
        let config = config(200, "decoherence_scheme = \"damped\"");
        let report = Ensemble::new(&config, &provider)
            .unwrap()
            .run(&AtomicBool::new(false))
            .unwrap();
        let upper: f64 = report.observables.transmission.state_fraction(1);
        // Landau-Zener: exp(-2 pi c^2 / (v |dF|)) ~ 0.56
        assert!(upper > 0.35 && upper < 0.75, "upper state fraction {}", upper);
    }
}
