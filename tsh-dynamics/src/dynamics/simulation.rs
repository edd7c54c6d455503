use crate::c64;
use crate::dynamics::decoherence::{dish_projection, DecoherenceCorrector};
use crate::dynamics::dynamic_routines::{drift, free_dofs, half_kick, zero_constrained};
use crate::dynamics::hop_acceptance::{HopAcceptor, HopOutcome, HopState};
use crate::dynamics::hopping_routines::{propose_hops, HopProposal};
use crate::dynamics::overlaps::{nact_from_overlap, time_overlap};
use crate::dynamics::representation::{
    transform_amplitudes, HamiltonianSnapshot, RepresentationTransformer,
};
use crate::dynamics::schroedinger_integration::{
    propagate_exact, propagate_local_diabatization, propagate_runge_kutta, vibronic_hamiltonian,
    PropagationRecord,
};
use crate::dynamics::thermostat::{NullThermostat, Thermostat};
use crate::error::{Anomaly, DynamicsError, Result};
use crate::initialization::{
    DecoherenceScheme, DynamicConfiguration, DynamicsVariables, ElectronicIntegrator,
    ElectronicState, EnsembleTrajectory, HopScheme, NacSource, NuclearPath, NuclearState, ProjectorHistory,
    ReferencePath, Representation,
};
use crate::interface::HamiltonianProvider;
use crate::linalg::{populations, to_complex};
use approx::AbsDiffEq;
use log::{debug, info, trace, warn};
use ndarray::prelude::*;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Observables of one trajectory at the time of a step, taken after the hop
/// decision and before the nuclei move on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,
    pub time: f64,
    pub positions: Array1<f64>,
    pub momenta: Array1<f64>,
    pub active_state: usize,
    /// populations of the adiabatic states
    pub populations: Array1<f64>,
    pub energies: Array1<f64>,
    pub kinetic_energy: f64,
    pub potential_energy: f64,
}

impl StepRecord {
    pub fn total_energy(&self) -> f64 {
        self.kinetic_energy + self.potential_energy
    }
}

/// Everything that happened in one step of one trajectory
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub hop: HopState,
    /// uniform number that selected the hop
    pub draw: f64,
    pub probabilities: Array1<f64>,
    pub anomalies: Vec<Anomaly>,
    pub record: StepRecord,
}

/// Steps of a trajectory that ran through all requested steps
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryReport {
    pub index: usize,
    pub steps: Vec<StepReport>,
}

pub type TrajectoryResult = Result<TrajectoryReport>;

/// Settings and engines that are shared by all steps of all trajectories
#[derive(Debug, Clone)]
pub struct DynamicsContext {
    pub config: DynamicConfiguration,
    pub transformer: RepresentationTransformer,
    pub acceptor: HopAcceptor,
    pub corrector: DecoherenceCorrector,
}

impl DynamicsContext {
    pub fn new(config: &DynamicConfiguration) -> Result<Self> {
        config.check()?;
        Ok(Self {
            config: config.clone(),
            transformer: RepresentationTransformer::new(&config.tracking),
            acceptor: HopAcceptor::new(config),
            corrector: DecoherenceCorrector::new(config),
        })
    }

    pub fn dt(&self) -> f64 {
        self.config.integration_timestep
    }

    /// number of degrees of freedom that carry kinetic energy
    pub fn nfree(&self) -> usize {
        free_dofs(self.config.ndof(), &self.config.constrained_dofs)
    }

    fn boltzmann_temperature(&self) -> Option<f64> {
        if self.config.hopping.use_boltzmann_factor {
            Some(self.config.hopping.temperature)
        } else {
            None
        }
    }
}

/// Electronic structure of the interval [t - dt, t]. In nbra runs it is computed
/// once per step on the reference path and shared by all trajectories.
#[derive(Debug, Clone)]
pub struct IntervalHamiltonian {
    pub snapshot: HamiltonianSnapshot,
    /// data of the step at t - dt, None in the first step
    pub previous: Option<ProjectorHistory>,
    /// diag(E) - i NACT at t
    pub adiabatic_vibronic: Array2<c64>,
    /// H_dia - i NACT_dia at t
    pub diabatic_vibronic: Array2<c64>,
    pub dt: f64,
}

impl IntervalHamiltonian {
    pub fn new(
        snapshot: HamiltonianSnapshot,
        previous: Option<ProjectorHistory>,
        velocities: ArrayView1<f64>,
        dt: f64,
    ) -> Self {
        let nact: Array2<f64> = snapshot.nact(velocities);
        let adiabatic_vibronic: Array2<c64> =
            vibronic_hamiltonian(snapshot.energies.view(), nact.view());
        let nact_dia: Array2<f64> = snapshot.diabatic.time_derivative_coupling(velocities);
        let diabatic_vibronic: Array2<c64> = to_complex(snapshot.diabatic.hamiltonian.view())
            + nact_dia.mapv(|val| c64::new(0.0, -val));
        Self {
            snapshot,
            previous,
            adiabatic_vibronic,
            diabatic_vibronic,
            dt,
        }
    }

    /// Data that the next step needs from this one
    pub fn history(&self) -> ProjectorHistory {
        ProjectorHistory {
            transform: self.snapshot.transform.clone(),
            energies: self.snapshot.energies.clone(),
            adiabatic_vibronic: self.adiabatic_vibronic.clone(),
            diabatic_vibronic: self.diabatic_vibronic.clone(),
        }
    }

    /// Adiabatic vibronic Hamiltonians at both ends of the interval. With the time
    /// overlap as source the coupling at the midpoint is used for both ends.
    fn adiabatic_ends(
        &self,
        previous: &ProjectorHistory,
        source: NacSource,
    ) -> Result<(Array2<c64>, Array2<c64>)> {
        match source {
            NacSource::DerivativeCouplings => Ok((
                previous.adiabatic_vibronic.clone(),
                self.adiabatic_vibronic.clone(),
            )),
            NacSource::TimeOverlap => {
                let st: Array2<f64> = time_overlap(previous.transform.view(), &self.snapshot)?;
                let nact: Array2<f64> = nact_from_overlap(st.view(), self.dt);
                Ok((
                    vibronic_hamiltonian(previous.energies.view(), nact.view()),
                    vibronic_hamiltonian(self.snapshot.energies.view(), nact.view()),
                ))
            }
        }
    }
}

/// Result of the electronic part of a step
struct ElectronicStep {
    outcome: HopOutcome,
    probabilities: Array1<f64>,
    anomalies: Vec<Anomaly>,
    adiabatic_amplitudes: Array1<c64>,
}

/// (1) Evaluate the Hamiltonian at the current positions, transform it into the
/// tracked adiabatic basis and complete the pending half-kick of the momenta.
pub fn hamiltonian_phase(
    ctx: &DynamicsContext,
    path: &mut NuclearPath,
    active_state: usize,
    provider: &dyn HamiltonianProvider,
) -> Result<IntervalHamiltonian> {
    let diabatic = provider.evaluate(path.nuclear.positions.view(), path.step)?;
    diabatic.check(ctx.config.nstates, path.nuclear.ndof())?;
    if active_state >= ctx.config.nstates {
        return Err(DynamicsError::DimensionMismatch {
            context: "active state index",
            expected: ctx.config.nstates,
            found: active_state,
        });
    }
    let previous: Option<ProjectorHistory> = path.history.take();
    let snapshot: HamiltonianSnapshot = ctx.transformer.update(
        diabatic,
        previous.as_ref().map(|history| history.transform.view()),
    )?;
    for anomaly in snapshot.anomalies.iter() {
        debug!("step {}: {}", path.step, anomaly);
    }

    if path.pending_half_kick {
        half_kick(&mut path.nuclear, snapshot.forces(active_state).view(), ctx.dt());
        zero_constrained(&mut path.nuclear, &ctx.config.constrained_dofs);
        path.pending_half_kick = false;
    }
    let velocities: Array1<f64> = path.nuclear.velocities();
    Ok(IntervalHamiltonian::new(
        snapshot,
        previous,
        velocities.view(),
        ctx.dt(),
    ))
}

/// (2) Propagate the amplitudes over the interval. Returns the record of the
/// propagation in the adiabatic basis and the new amplitudes in the propagation
/// representation, or None in the first step.
fn propagate_amplitudes(
    ctx: &DynamicsContext,
    electronic: &ElectronicState,
    interval: &IntervalHamiltonian,
) -> Result<Option<(PropagationRecord, Array1<c64>)>> {
    let previous: &ProjectorHistory = match interval.previous.as_ref() {
        Some(previous) => previous,
        None => return Ok(None),
    };
    let electronic_config = &ctx.config.electronic;
    let dt: f64 = interval.dt;
    let snapshot: &HamiltonianSnapshot = &interval.snapshot;

    match electronic.representation {
        Representation::Adiabatic => {
            let record: PropagationRecord = match electronic_config.integrator {
                ElectronicIntegrator::LocalDiabatization => {
                    let st: Array2<f64> = time_overlap(previous.transform.view(), snapshot)?;
                    propagate_local_diabatization(
                        electronic.amplitudes.view(),
                        previous.energies.view(),
                        snapshot.energies.view(),
                        st.view(),
                        dt,
                    )?
                }
                ElectronicIntegrator::Exact => {
                    let (h_start, h_end) =
                        interval.adiabatic_ends(previous, electronic_config.nac_source)?;
                    propagate_exact(
                        electronic.amplitudes.view(),
                        h_start.view(),
                        h_end.view(),
                        dt,
                        electronic_config.substeps,
                    )?
                }
                ElectronicIntegrator::RungeKutta => {
                    let (h_start, h_end) =
                        interval.adiabatic_ends(previous, electronic_config.nac_source)?;
                    propagate_runge_kutta(
                        electronic.amplitudes.view(),
                        h_start.view(),
                        h_end.view(),
                        dt,
                        electronic_config.substeps,
                    )?
                }
            };
            let amplitudes: Array1<c64> = record.last().to_owned();
            Ok(Some((record, amplitudes)))
        }
        Representation::Diabatic => {
            let nstates: usize = snapshot.nstates();
            if !snapshot
                .diabatic
                .overlap
                .abs_diff_eq(&Array2::eye(nstates), 1.0e-10)
            {
                return Err(DynamicsError::Provider(String::from(
                    "propagation in the diabatic representation needs an orthonormal diabatic basis",
                )));
            }
            let h_start: ArrayView2<c64> = previous.diabatic_vibronic.view();
            let h_end: ArrayView2<c64> = interval.diabatic_vibronic.view();
            let diabatic_record: PropagationRecord = match electronic_config.integrator {
                ElectronicIntegrator::RungeKutta => propagate_runge_kutta(
                    electronic.amplitudes.view(),
                    h_start,
                    h_end,
                    dt,
                    electronic_config.substeps,
                )?,
                _ => propagate_exact(
                    electronic.amplitudes.view(),
                    h_start,
                    h_end,
                    dt,
                    electronic_config.substeps,
                )?,
            };

            // the same interval seen from the adiabatic states,
            // P_adi = U^T P_dia U_prev
            let u_prev: Array2<c64> = to_complex(previous.transform.view());
            let u: Array2<c64> = to_complex(snapshot.transform.view());
            let step_propagator: Array2<c64> =
                u.t().dot(&diabatic_record.propagator).dot(&u_prev);
            let initial: Array1<c64> = u_prev.t().dot(&diabatic_record.initial());
            let (h_adi_start, h_adi_end) =
                interval.adiabatic_ends(previous, electronic_config.nac_source)?;
            let record = PropagationRecord::two_point(
                initial,
                h_adi_start,
                h_adi_end,
                step_propagator,
                dt,
            );
            let amplitudes: Array1<c64> = diabatic_record.last().to_owned();
            Ok(Some((record, amplitudes)))
        }
    }
}

/// (2) to (6) for one trajectory: propagation, hop proposal, acceptance and
/// decoherence correction
fn electronic_phase<R: Rng>(
    ctx: &DynamicsContext,
    electronic: &mut ElectronicState,
    active_state: &mut usize,
    nuclear: &mut NuclearState,
    interval: &IntervalHamiltonian,
    rng: &mut R,
) -> Result<ElectronicStep> {
    let snapshot: &HamiltonianSnapshot = &interval.snapshot;
    let nstates: usize = snapshot.nstates();
    DynamicsError::check_dimension("electronic amplitudes", nstates, electronic.nstates())?;
    let mut anomalies: Vec<Anomaly> = snapshot.anomalies.clone();

    let propagated = propagate_amplitudes(ctx, electronic, interval)?;
    let decoherence_events: Option<Array1<f64>> = match ctx.config.hop_scheme {
        HopScheme::Dish if propagated.is_some() => Some(ctx.corrector.event_probabilities(
            *active_state,
            snapshot.energies.view(),
            nuclear.kinetic_energy(),
            interval.dt,
        )),
        _ => None,
    };
    let proposal: HopProposal = match propagated.as_ref() {
        Some((record, _)) => propose_hops(
            ctx.config.hop_scheme,
            *active_state,
            record,
            snapshot.energies.view(),
            ctx.boltzmann_temperature(),
            decoherence_events.as_ref().map(|events| events.view()),
        )?,
        None => HopProposal::none(*active_state, nstates),
    };
    anomalies.extend(proposal.anomalies.iter().cloned());
    let propagated: bool = match propagated {
        Some((_, amplitudes)) => {
            electronic.amplitudes = amplitudes;
            true
        }
        None => false,
    };

    let outcome: HopOutcome = ctx.acceptor.decide(
        &proposal,
        nuclear,
        snapshot.energies.view(),
        snapshot.gradients.view(),
        snapshot.derivative_couplings.view(),
        rng,
    );
    if let Some(anomaly) = outcome.anomaly.as_ref() {
        anomalies.push(anomaly.clone());
    }
    if outcome.state.is_accepted() {
        info!("hop {:?}", outcome.state);
    }
    *active_state = outcome.state.active_state(*active_state);

    let mut adiabatic_amplitudes: Array1<c64> = transform_amplitudes(
        electronic.amplitudes.view(),
        electronic.representation,
        Representation::Adiabatic,
        snapshot,
    )?;
    let mut corrected: bool = false;
    if let Some(events) = decoherence_events.as_ref() {
        adiabatic_amplitudes = dish_projection(
            adiabatic_amplitudes.view(),
            *active_state,
            &outcome,
            proposal.probabilities.sum(),
            events.view(),
            ctx.corrector.collapse,
        );
        corrected = true;
    }
    if propagated && ctx.corrector.scheme != DecoherenceScheme::None {
        adiabatic_amplitudes = ctx.corrector.apply(
            adiabatic_amplitudes.view(),
            *active_state,
            &outcome.state,
            snapshot.energies.view(),
            nuclear.kinetic_energy(),
            interval.dt,
        );
        corrected = true;
    }
    if corrected {
        electronic.amplitudes = transform_amplitudes(
            adiabatic_amplitudes.view(),
            Representation::Adiabatic,
            electronic.representation,
            snapshot,
        )?;
    }

    Ok(ElectronicStep {
        outcome,
        probabilities: proposal.probabilities,
        anomalies,
        adiabatic_amplitudes,
    })
}

/// (7) Thermostat, half-kick on the surface of the active state and drift of the
/// positions. The data of this step becomes the history of the next one.
pub fn nuclear_phase(
    ctx: &DynamicsContext,
    path: &mut NuclearPath,
    interval: &IntervalHamiltonian,
    active_state: usize,
    thermostat: &mut dyn Thermostat,
) {
    let dt: f64 = ctx.dt();
    path.nuclear.momenta = thermostat.propagate(
        path.nuclear.momenta.view(),
        path.nuclear.inverse_masses.view(),
        dt,
    );
    half_kick(&mut path.nuclear, interval.snapshot.forces(active_state).view(), dt);
    zero_constrained(&mut path.nuclear, &ctx.config.constrained_dofs);
    drift(&mut path.nuclear, dt);
    path.pending_half_kick = true;
    path.history = Some(interval.history());
    path.step += 1;
    path.time += dt;
}

fn step_report(
    path: &NuclearPath,
    active_state: usize,
    interval: &IntervalHamiltonian,
    electronic: ElectronicStep,
) -> StepReport {
    let energies: Array1<f64> = interval.snapshot.energies.clone();
    let record = StepRecord {
        step: path.step,
        time: path.time,
        positions: path.nuclear.positions.clone(),
        momenta: path.nuclear.momenta.clone(),
        active_state,
        populations: populations(electronic.adiabatic_amplitudes.view()),
        kinetic_energy: path.nuclear.kinetic_energy(),
        potential_energy: energies[active_state],
        energies,
    };
    trace!(
        "step {:>6} t = {:>10.2} state {} E_tot = {:.8}",
        record.step,
        record.time,
        record.active_state,
        record.total_energy()
    );
    StepReport {
        hop: electronic.outcome.state,
        draw: electronic.outcome.draw,
        probabilities: electronic.probabilities,
        anomalies: electronic.anomalies,
        record,
    }
}

/// One full step of a trajectory that carries its own nuclei
pub fn trajectory_step(
    ctx: &DynamicsContext,
    trajectory: &mut EnsembleTrajectory,
    provider: &dyn HamiltonianProvider,
    thermostat: &mut dyn Thermostat,
) -> Result<StepReport> {
    let interval: IntervalHamiltonian =
        hamiltonian_phase(ctx, &mut trajectory.path, trajectory.active_state, provider)?;
    let electronic: ElectronicStep = electronic_phase(
        ctx,
        &mut trajectory.electronic,
        &mut trajectory.active_state,
        &mut trajectory.path.nuclear,
        &interval,
        &mut trajectory.rng,
    )?;
    let report: StepReport = step_report(
        &trajectory.path,
        trajectory.active_state,
        &interval,
        electronic,
    );
    nuclear_phase(
        ctx,
        &mut trajectory.path,
        &interval,
        trajectory.active_state,
        thermostat,
    );
    Ok(report)
}

/// Electronic step of a trajectory that follows the reference path of the nbra.
/// The nuclei of the trajectory are a copy of the reference at time t.
pub fn trajectory_step_on_reference(
    ctx: &DynamicsContext,
    trajectory: &mut EnsembleTrajectory,
    reference: &NuclearPath,
    interval: &IntervalHamiltonian,
) -> Result<StepReport> {
    trajectory.path.step = reference.step;
    trajectory.path.time = reference.time;
    trajectory.path.nuclear = reference.nuclear.clone();
    let electronic: ElectronicStep = electronic_phase(
        ctx,
        &mut trajectory.electronic,
        &mut trajectory.active_state,
        &mut trajectory.path.nuclear,
        interval,
        &mut trajectory.rng,
    )?;
    let report: StepReport = step_report(
        &trajectory.path,
        trajectory.active_state,
        interval,
        electronic,
    );
    trajectory.path.step += 1;
    trajectory.path.time += ctx.dt();
    Ok(report)
}

/// Run `config.nstep` steps of a single trajectory without a thermostat
pub fn compute_dynamics(
    trajectory: &mut EnsembleTrajectory,
    provider: &dyn HamiltonianProvider,
    config: &DynamicConfiguration,
) -> Result<Vec<StepReport>> {
    let mut thermostat = NullThermostat::new(free_dofs(config.ndof(), &config.constrained_dofs));
    compute_dynamics_thermostatted(trajectory, provider, config, &mut thermostat)
}

/// Run `config.nstep` steps of a single trajectory coupled to a heat bath
pub fn compute_dynamics_thermostatted(
    trajectory: &mut EnsembleTrajectory,
    provider: &dyn HamiltonianProvider,
    config: &DynamicConfiguration,
    thermostat: &mut dyn Thermostat,
) -> Result<Vec<StepReport>> {
    let ctx = DynamicsContext::new(config)?;
    (0..config.nstep)
        .map(|_| trajectory_step(&ctx, trajectory, provider, thermostat))
        .collect()
}

/// Run `config.nstep` steps of every trajectory in `variables` and hand the
/// advanced variables back. `thermostats` holds one bath per nuclear path.
pub fn compute_dynamics_with_variables(
    mut variables: DynamicsVariables,
    provider: &dyn HamiltonianProvider,
    config: &DynamicConfiguration,
    thermostats: &mut [Box<dyn Thermostat>],
) -> Result<(DynamicsVariables, Vec<TrajectoryResult>)> {
    let ctx = DynamicsContext::new(config)?;
    let results: Vec<TrajectoryResult> =
        advance(&ctx, &mut variables, provider, thermostats, config.nstep, None)?;
    Ok((variables, results))
}

/// Advance all running trajectories by up to `nsteps` steps in parallel. The
/// stop flag is only read between two steps. A failing trajectory is stopped and
/// reported, the others continue.
pub fn advance(
    ctx: &DynamicsContext,
    variables: &mut DynamicsVariables,
    provider: &dyn HamiltonianProvider,
    thermostats: &mut [Box<dyn Thermostat>],
    nsteps: usize,
    stop: Option<&AtomicBool>,
) -> Result<Vec<TrajectoryResult>> {
    DynamicsError::check_dimension("number of thermostats", variables.npaths(), thermostats.len())?;
    let ntraj: usize = variables.ntraj();
    let mut steps: Vec<Vec<StepReport>> = vec![Vec::new(); ntraj];
    let mut errors: Vec<Option<DynamicsError>> = (0..ntraj).map(|_| None).collect();

    for _ in 0..nsteps {
        if stop.map_or(false, |flag| flag.load(Ordering::SeqCst)) {
            info!("dynamics stopped after step {}", variables.step);
            break;
        }
        match variables.reference.as_mut() {
            None => {
                variables
                    .trajectories
                    .par_iter_mut()
                    .zip(thermostats.par_iter_mut())
                    .zip(steps.par_iter_mut().zip(errors.par_iter_mut()))
                    .for_each(|((trajectory, thermostat), (steps, error))| {
                        if !trajectory.is_running() {
                            return;
                        }
                        match trajectory_step(ctx, trajectory, provider, thermostat.as_mut()) {
                            Ok(report) => steps.push(report),
                            Err(err) => {
                                stop_trajectory(trajectory, &err);
                                *error = Some(err);
                            }
                        }
                    });
            }
            Some(reference) => {
                let interval: Arc<IntervalHamiltonian> = match hamiltonian_phase(
                    ctx,
                    &mut reference.path,
                    ReferencePath::ACTIVE_STATE,
                    provider,
                ) {
                    Ok(interval) => Arc::new(interval),
                    Err(err) => {
                        warn!("the reference path failed: {}", err);
                        for (trajectory, error) in
                            variables.trajectories.iter_mut().zip(errors.iter_mut())
                        {
                            if trajectory.is_running() {
                                trajectory.failure = Some(err.to_string());
                                *error = Some(DynamicsError::Provider(err.to_string()));
                            }
                        }
                        break;
                    }
                };
                let path: &NuclearPath = &reference.path;
                variables
                    .trajectories
                    .par_iter_mut()
                    .zip(steps.par_iter_mut().zip(errors.par_iter_mut()))
                    .for_each(|(trajectory, (steps, error))| {
                        if !trajectory.is_running() {
                            return;
                        }
                        match trajectory_step_on_reference(ctx, trajectory, path, &interval) {
                            Ok(report) => steps.push(report),
                            Err(err) => {
                                stop_trajectory(trajectory, &err);
                                *error = Some(err);
                            }
                        }
                    });
                nuclear_phase(
                    ctx,
                    &mut reference.path,
                    &interval,
                    ReferencePath::ACTIVE_STATE,
                    thermostats[0].as_mut(),
                );
            }
        }
        variables.step += 1;
        variables.time += ctx.dt();
    }

    Ok(variables
        .trajectories
        .iter()
        .zip(steps.into_iter().zip(errors.into_iter()))
        .map(|(trajectory, (steps, error))| match (error, trajectory.failure.as_ref()) {
            (Some(err), _) => Err(err),
            (None, Some(message)) => Err(DynamicsError::TrajectoryFailed {
                index: trajectory.index,
                message: message.clone(),
            }),
            (None, None) => Ok(TrajectoryReport {
                index: trajectory.index,
                steps,
            }),
        })
        .collect())
}

fn stop_trajectory(trajectory: &mut EnsembleTrajectory, err: &DynamicsError) {
    warn!(
        "trajectory {} stopped at step {}: {}",
        trajectory.index, trajectory.path.step, err
    );
    trajectory.failure = Some(err.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::thermostat::build_thermostat;
    use crate::interface::test_models::{HarmonicPair, LinearCrossing};

    fn crossing_config(extra: &str) -> DynamicConfiguration {
        DynamicConfiguration::from_toml(&format!(
            "nstep = 300\nintegration_timestep = 2.0\nseed = 17\n{}\n\
             [nuclear]\npositions = [-5.0]\nmomenta = [30.0]\nmasses = [2000.0]",
            extra
        ))
        .unwrap()
    }

    fn first_trajectory(config: &DynamicConfiguration, provider: &dyn HamiltonianProvider) -> EnsembleTrajectory {
        let variables = DynamicsVariables::new(config, provider).unwrap();
        variables.trajectories[0].clone()
    }

    #[test]
    fn all_entry_points_give_identical_trajectories() {
        let provider = LinearCrossing::default();
        let config = crossing_config("hop_scheme = \"fssh\"\ndecoherence_scheme = \"damped\"");
        let start: EnsembleTrajectory = first_trajectory(&config, &provider);

        let mut bare: EnsembleTrajectory = start.clone();
        let bare_reports = compute_dynamics(&mut bare, &provider, &config).unwrap();

        let mut thermostatted: EnsembleTrajectory = start.clone();
        let mut null = NullThermostat::new(1);
        let thermostatted_reports =
            compute_dynamics_thermostatted(&mut thermostatted, &provider, &config, &mut null)
                .unwrap();

        let variables = DynamicsVariables {
            step: 0,
            time: 0.0,
            trajectories: vec![start],
            reference: None,
        };
        let mut thermostats: Vec<Box<dyn Thermostat>> =
            vec![build_thermostat(&config.thermostat_params, 1, config.seed)];
        let (variables, results) =
            compute_dynamics_with_variables(variables, &provider, &config, &mut thermostats)
                .unwrap();
        let report: &TrajectoryReport = results[0].as_ref().unwrap();

        assert_eq!(bare_reports.len(), 300);
        assert_eq!(bare_reports, thermostatted_reports);
        assert_eq!(bare_reports, report.steps);
        assert_eq!(bare, thermostatted);
        assert_eq!(bare, variables.trajectories[0]);
        assert_eq!(variables.step, 300);
    }

    #[test]
    fn adiabatic_dynamics_conserves_the_total_energy() {
        let provider = HarmonicPair::default();
        let config = DynamicConfiguration::from_toml(
            "nstep = 500\nhop_scheme = \"adiabatic\"\n\
             [nuclear]\npositions = [1.0]\nmomenta = [0.0]\nmasses = [2000.0]",
        )
        .unwrap();
        let mut trajectory = first_trajectory(&config, &provider);
        let reports = compute_dynamics(&mut trajectory, &provider, &config).unwrap();
        let e_0: f64 = reports[0].record.total_energy();
        for report in reports.iter() {
            assert!(
                (report.record.total_energy() - e_0).abs() < 1.0e-6,
                "energy drift at step {}",
                report.record.step
            );
            assert_eq!(report.record.active_state, 0);
            assert!((report.record.populations.sum() - 1.0).abs() < 1.0e-8);
        }
    }

    #[test]
    fn hops_with_rescaling_conserve_the_total_energy() {
        let provider = LinearCrossing::default();
        let config = DynamicConfiguration::from_toml(
            "ntraj = 20\nnstep = 300\nintegration_timestep = 2.0\nhop_scheme = \"fssh\"\n\
             [nuclear]\npositions = [-5.0]\nmomenta = [30.0]\nmasses = [2000.0]",
        )
        .unwrap();
        let ctx = DynamicsContext::new(&config).unwrap();
        let mut variables = DynamicsVariables::new(&config, &provider).unwrap();
        let mut thermostats: Vec<Box<dyn Thermostat>> = (0..20)
            .map(|_| Box::new(NullThermostat::new(1)) as Box<dyn Thermostat>)
            .collect();
        let results = advance(&ctx, &mut variables, &provider, &mut thermostats, 300, None).unwrap();

        let mut nhops: usize = 0;
        for result in results.iter() {
            let steps: &Vec<StepReport> = &result.as_ref().unwrap().steps;
            let e_0: f64 = steps[0].record.total_energy();
            for report in steps.iter() {
                if report.hop.is_accepted() {
                    nhops += 1;
                }
                assert!((report.record.total_energy() - e_0).abs() < 1.0e-4);
                assert!((report.record.populations.sum() - 1.0).abs() < 1.0e-8);
            }
        }
        assert!(nhops > 0);
    }

    #[test]
    fn diabatic_and_adiabatic_propagation_agree() {
        let provider = LinearCrossing::default();
        let adiabatic = crossing_config("hop_scheme = \"adiabatic\"\n[electronic]\nsubsteps = 20");
        let diabatic = crossing_config(
            "hop_scheme = \"adiabatic\"\nrepresentation = \"diabatic\"\n[electronic]\nsubsteps = 20",
        );
        let mut first = first_trajectory(&adiabatic, &provider);
        let mut second = first_trajectory(&diabatic, &provider);
        let adiabatic_reports = compute_dynamics(&mut first, &provider, &adiabatic).unwrap();
        let diabatic_reports = compute_dynamics(&mut second, &provider, &diabatic).unwrap();

        for (a, d) in adiabatic_reports.iter().zip(diabatic_reports.iter()) {
            assert_eq!(a.record.positions, d.record.positions);
            assert!(
                (&a.record.populations - &d.record.populations)
                    .iter()
                    .all(|val| val.abs() < 1.0e-2),
                "populations differ at step {}",
                a.record.step
            );
        }
        // the crossing transfers population into the upper adiabatic state
        let last = &adiabatic_reports[adiabatic_reports.len() - 1];
        assert!(last.record.populations[1] > 0.3);
    }

    #[test]
    fn time_overlap_couplings_follow_the_derivative_couplings() {
        let provider = LinearCrossing::default();
        let from_dc = crossing_config("hop_scheme = \"adiabatic\"\n[electronic]\nsubsteps = 10");
        let from_overlap = crossing_config(
            "hop_scheme = \"adiabatic\"\n[electronic]\nsubsteps = 10\nnac_source = \"time_overlap\"",
        );
        let local_diabatization = crossing_config(
            "hop_scheme = \"adiabatic\"\n[electronic]\nintegrator = \"local_diabatization\"",
        );
        let mut reference = first_trajectory(&from_dc, &provider);
        let reference_reports = compute_dynamics(&mut reference, &provider, &from_dc).unwrap();
        for config in [from_overlap, local_diabatization].iter() {
            let mut trajectory = first_trajectory(config, &provider);
            let reports = compute_dynamics(&mut trajectory, &provider, config).unwrap();
            let last = reports.len() - 1;
            assert!(
                (reports[last].record.populations[1]
                    - reference_reports[last].record.populations[1])
                    .abs()
                    < 2.0e-2
            );
        }
    }

    #[test]
    fn reset_decoherence_collapses_after_hops() {
        let provider = LinearCrossing::default();
        let config = crossing_config("hop_scheme = \"fssh\"\ndecoherence_scheme = \"reset\"\nntraj = 10");
        let ctx = DynamicsContext::new(&config).unwrap();
        let mut variables = DynamicsVariables::new(&config, &provider).unwrap();
        let mut thermostats: Vec<Box<dyn Thermostat>> = (0..10)
            .map(|_| Box::new(NullThermostat::new(1)) as Box<dyn Thermostat>)
            .collect();
        let results = advance(&ctx, &mut variables, &provider, &mut thermostats, 300, None).unwrap();
        for result in results.iter() {
            for report in result.as_ref().unwrap().steps.iter() {
                if report.hop.is_accepted() {
                    let active: usize = report.record.active_state;
                    assert!((report.record.populations[active] - 1.0).abs() < 1.0e-12);
                }
            }
        }
    }

    #[test]
    fn dish_hops_collapse_onto_the_new_state() {
        let provider = LinearCrossing::default();
        let config = crossing_config(
            "hop_scheme = \"dish\"\nrescaling_direction = \"force_difference\"\nntraj = 10\n\
             [decoherence]\nrates = [[0.0, 0.05], [0.05, 0.0]]",
        );
        let ctx = DynamicsContext::new(&config).unwrap();
        let mut variables = DynamicsVariables::new(&config, &provider).unwrap();
        let mut thermostats: Vec<Box<dyn Thermostat>> = (0..10)
            .map(|_| Box::new(NullThermostat::new(1)) as Box<dyn Thermostat>)
            .collect();
        let results = advance(&ctx, &mut variables, &provider, &mut thermostats, 300, None).unwrap();
        for result in results.iter() {
            for report in result.as_ref().unwrap().steps.iter() {
                assert!((report.record.populations.sum() - 1.0).abs() < 1.0e-8);
                if report.hop.is_accepted() {
                    let active: usize = report.record.active_state;
                    assert!((report.record.populations[active] - 1.0).abs() < 1.0e-12);
                }
            }
        }
    }

    #[test]
    fn failing_trajectory_does_not_stop_the_others() {
        let provider = LinearCrossing {
            limit: 8.0,
            ..LinearCrossing::default()
        };
        let config = crossing_config("ntraj = 3\nhop_scheme = \"fssh\"");
        let ctx = DynamicsContext::new(&config).unwrap();
        let mut variables = DynamicsVariables::new(&config, &provider).unwrap();
        // this trajectory runs out of the model after a few steps
        variables.trajectories[1].path.nuclear.positions[0] = 7.9;
        let mut thermostats: Vec<Box<dyn Thermostat>> = (0..3)
            .map(|_| Box::new(NullThermostat::new(1)) as Box<dyn Thermostat>)
            .collect();
        let results = advance(&ctx, &mut variables, &provider, &mut thermostats, 50, None).unwrap();
        assert!(results[0].is_ok() && results[2].is_ok());
        assert!(matches!(results[1], Err(DynamicsError::Provider(_))));
        assert_eq!(results[0].as_ref().unwrap().steps.len(), 50);
        assert!(variables.trajectories[1].failure.is_some());
    }

    #[test]
    fn nbra_trajectories_share_the_reference_path() {
        let provider = LinearCrossing::default();
        let config = crossing_config(
            "ntraj = 5\nnbra = true\nhop_scheme = \"fssh\"\n[hopping]\nacceptance = \"always\"",
        );
        let ctx = DynamicsContext::new(&config).unwrap();
        let mut variables = DynamicsVariables::new(&config, &provider).unwrap();
        let mut thermostats: Vec<Box<dyn Thermostat>> = vec![Box::new(NullThermostat::new(1))];
        let results = advance(&ctx, &mut variables, &provider, &mut thermostats, 100, None).unwrap();

        let reference = variables.reference.as_ref().unwrap();
        assert_eq!(reference.path.step, 100);
        for step in 0..100 {
            let positions = &results[0].as_ref().unwrap().steps[step].record.positions;
            for result in results.iter() {
                assert_eq!(&result.as_ref().unwrap().steps[step].record.positions, positions);
            }
        }
    }

    #[test]
    fn wrong_number_of_thermostats_is_rejected() {
        let provider = LinearCrossing::default();
        let config = crossing_config("ntraj = 2");
        let ctx = DynamicsContext::new(&config).unwrap();
        let mut variables = DynamicsVariables::new(&config, &provider).unwrap();
        let mut thermostats: Vec<Box<dyn Thermostat>> = vec![Box::new(NullThermostat::new(1))];
        let result = advance(&ctx, &mut variables, &provider, &mut thermostats, 1, None);
        assert!(matches!(result, Err(DynamicsError::DimensionMismatch { .. })));
    }
}
