use crate::c64;
use crate::dynamics::representation::{transform_amplitudes, RepresentationTransformer};
use crate::error::{DynamicsError, Result};
use crate::initialization::sampling::{sample_amplitudes, sample_nuclear, sample_state};
use crate::initialization::system::normalize_coefficients;
use crate::initialization::{
    DynamicConfiguration, ElectronicSampling, ElectronicState, NuclearState, Representation,
};
use crate::interface::HamiltonianProvider;
use crate::linalg::populations;
use log::warn;
use ndarray::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Data of the previous step that the next step needs: the projector for the state
/// tracking, the energies and the vibronic Hamiltonians at the end of the step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectorHistory {
    pub transform: Array2<f64>,
    pub energies: Array1<f64>,
    /// diag(E) - i NACT in the adiabatic basis
    pub adiabatic_vibronic: Array2<c64>,
    /// H_dia - i NACT_dia in the diabatic basis
    pub diabatic_vibronic: Array2<c64>,
}

/// Classical path of the nuclei together with everything the split velocity
/// Verlet scheme carries from one step to the next
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NuclearPath {
    pub step: usize,
    pub time: f64,
    pub nuclear: NuclearState,
    pub history: Option<ProjectorHistory>,
    /// the momenta are half a step behind the positions
    pub pending_half_kick: bool,
}

impl NuclearPath {
    pub fn new(nuclear: NuclearState) -> Self {
        Self {
            step: 0,
            time: 0.0,
            nuclear,
            history: None,
            pending_half_kick: false,
        }
    }
}

/// One member of the ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleTrajectory {
    pub index: usize,
    pub path: NuclearPath,
    pub electronic: ElectronicState,
    /// index of the adiabatic state that drives the nuclei
    pub active_state: usize,
    pub rng: ChaCha8Rng,
    /// message of the error that stopped this trajectory
    pub failure: Option<String>,
}

/// Random number generator of the trajectory with the given index
pub fn trajectory_rng(seed: u64, index: usize) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed.wrapping_add(index as u64))
}

impl EnsembleTrajectory {
    /// Sample the initial conditions of trajectory `index`. All random numbers
    /// are taken from the generator of this trajectory, which continues to
    /// serve the hop decisions afterwards.
    pub fn new(
        index: usize,
        config: &DynamicConfiguration,
        provider: &dyn HamiltonianProvider,
        transformer: &RepresentationTransformer,
    ) -> Result<Self> {
        let mut rng: ChaCha8Rng = trajectory_rng(config.seed, index);
        let nuclear: NuclearState = sample_nuclear(&config.nuclear, &mut rng)?;
        Self::from_parts(index, nuclear, rng, config, provider, transformer)
    }

    /// Trajectory that starts from a given nuclear state, e.g. the reference
    /// path of the nbra
    pub fn on_path(
        index: usize,
        nuclear: NuclearState,
        config: &DynamicConfiguration,
        provider: &dyn HamiltonianProvider,
        transformer: &RepresentationTransformer,
    ) -> Result<Self> {
        let rng: ChaCha8Rng = trajectory_rng(config.seed, index);
        Self::from_parts(index, nuclear, rng, config, provider, transformer)
    }

    fn from_parts(
        index: usize,
        nuclear: NuclearState,
        mut rng: ChaCha8Rng,
        config: &DynamicConfiguration,
        provider: &dyn HamiltonianProvider,
        transformer: &RepresentationTransformer,
    ) -> Result<Self> {
        let init = &config.electronic_init;
        let amplitudes: Array1<c64> = sample_amplitudes(init, config.nstates, &mut rng);

        // the adiabatic states at the initial geometry decide about the active state
        let diabatic = provider.evaluate(nuclear.positions.view(), 0)?;
        let snapshot = transformer.update(diabatic, None)?;
        let adiabatic: Array1<c64> = normalize_coefficients(
            transform_amplitudes(
                amplitudes.view(),
                init.representation,
                Representation::Adiabatic,
                &snapshot,
            )?
            .view(),
        );
        let active_state: usize = match (init.representation, init.sampling) {
            (Representation::Adiabatic, ElectronicSampling::Fixed)
            | (Representation::Adiabatic, ElectronicSampling::RandomPhase) => init.istate,
            _ => sample_state(populations(adiabatic.view()).view(), &mut rng),
        };
        let amplitudes: Array1<c64> = transform_amplitudes(
            adiabatic.view(),
            Representation::Adiabatic,
            config.representation,
            &snapshot,
        )?;

        Ok(Self {
            index,
            path: NuclearPath::new(nuclear),
            electronic: ElectronicState::new(amplitudes, config.representation),
            active_state,
            rng,
            failure: None,
        })
    }

    pub fn is_running(&self) -> bool {
        self.failure.is_none()
    }
}

/// Reference nuclear path of the neglect of back reaction approximation. The
/// nuclei move on the lowest adiabatic state and every trajectory of the
/// ensemble follows this path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePath {
    pub path: NuclearPath,
}

impl ReferencePath {
    pub const ACTIVE_STATE: usize = 0;

    /// The reference geometry is sampled with the generator of the seed itself,
    /// on a separate stream so it does not reuse the numbers of trajectory 0
    pub fn new(config: &DynamicConfiguration) -> Result<Self> {
        let mut rng: ChaCha8Rng = ChaCha8Rng::seed_from_u64(config.seed);
        rng.set_stream(2);
        let nuclear: NuclearState = sample_nuclear(&config.nuclear, &mut rng)?;
        Ok(Self {
            path: NuclearPath::new(nuclear),
        })
    }
}

/// Complete state of an ensemble simulation between two steps. It can be written
/// to a restart file and handed back to continue the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicsVariables {
    pub step: usize,
    pub time: f64,
    pub trajectories: Vec<EnsembleTrajectory>,
    pub reference: Option<ReferencePath>,
}

impl DynamicsVariables {
    /// Set up all trajectories of the ensemble. A trajectory whose initial
    /// conditions cannot be evaluated is kept with its failure message, so the
    /// indices of the ensemble stay intact.
    pub fn new(config: &DynamicConfiguration, provider: &dyn HamiltonianProvider) -> Result<Self> {
        config.check()?;
        config.check_provider(provider)?;
        let transformer = RepresentationTransformer::new(&config.tracking);
        let reference: Option<ReferencePath> = if config.nbra {
            Some(ReferencePath::new(config)?)
        } else {
            None
        };

        let trajectories: Vec<EnsembleTrajectory> = (0..config.ntraj)
            .map(|index| {
                let trajectory = match reference.as_ref() {
                    Some(reference) => EnsembleTrajectory::on_path(
                        index,
                        reference.path.nuclear.clone(),
                        config,
                        provider,
                        &transformer,
                    ),
                    None => EnsembleTrajectory::new(index, config, provider, &transformer),
                };
                trajectory.unwrap_or_else(|err| Self::failed_trajectory(index, config, err))
            })
            .collect();

        Ok(Self {
            step: 0,
            time: 0.0,
            trajectories,
            reference,
        })
    }

    fn failed_trajectory(
        index: usize,
        config: &DynamicConfiguration,
        err: DynamicsError,
    ) -> EnsembleTrajectory {
        warn!("trajectory {} could not be initialized: {}", index, err);
        let nuclear = NuclearState {
            positions: Array1::from(config.nuclear.positions.clone()),
            momenta: Array1::from(config.nuclear.momenta.clone()),
            inverse_masses: Array1::from(config.nuclear.masses.clone()).mapv(|mass| 1.0 / mass),
        };
        EnsembleTrajectory {
            index,
            path: NuclearPath::new(nuclear),
            electronic: ElectronicState::new(Array1::zeros(config.nstates), config.representation),
            active_state: 0,
            rng: trajectory_rng(config.seed, index),
            failure: Some(err.to_string()),
        }
    }

    pub fn ntraj(&self) -> usize {
        self.trajectories.len()
    }

    /// number of nuclear paths that are integrated, one per trajectory or a
    /// single reference path
    pub fn npaths(&self) -> usize {
        if self.reference.is_some() {
            1
        } else {
            self.trajectories.len()
        }
    }
}
