use crate::defaults::*;
use crate::error::{DynamicsError, Result};
use crate::interface::HamiltonianProvider;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Basis in which the electronic amplitudes are propagated
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Representation {
    Diabatic,
    Adiabatic,
}

/// Formula for the hopping probabilities
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HopScheme {
    /// no hops, the trajectory stays on its initial surface
    Adiabatic,
    /// fewest switches surface hopping
    Fssh,
    /// global flux surface hopping
    Gfsh,
    /// Markov state surface hopping
    Mssh,
    /// overlap based probabilities of the local diabatization scheme
    LocalDiabatization,
    /// decoherence induced surface hopping, hops are decoherence events that
    /// collapse the wavefunction onto the target state
    Dish,
}

/// Test that decides whether a selected hop is realized
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HopAcceptance {
    /// conserve the total energy by rescaling the nuclear momenta
    Rescaling,
    /// accept upward hops with the Boltzmann probability, momenta are untouched
    Boltzmann,
    /// accept every hop
    Always,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RescalingDirection {
    AlongCoupling,
    AlongVelocity,
    /// along F_to - F_from, the difference of the state specific forces
    ForceDifference,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FrustratedHopPolicy {
    /// keep the state and the momenta
    Reject,
    /// keep the state and reverse the momentum along the rescaling direction
    Reverse,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecoherenceScheme {
    None,
    /// instantaneous decoherence, collapse onto the active state after a hop
    Reset,
    /// energy based exponential damping of the inactive amplitudes
    Damped,
    /// exponential damping with the rates of `decoherence.rates`
    Rates,
}

/// Event after which the amplitudes are collapsed in the reset scheme
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResetTrigger {
    /// only after an accepted hop
    Accepted,
    /// after every hop attempt, also after frustrated ones
    Attempted,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollapseOption {
    PreservePhase,
    Real,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ElectronicIntegrator {
    Exact,
    RungeKutta,
    LocalDiabatization,
}

/// Source of the nonadiabatic coupling in time
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NacSource {
    /// derivative coupling vectors contracted with the velocities
    DerivativeCouplings,
    /// finite difference of the time overlap of consecutive steps
    TimeOverlap,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThermostatKind {
    None,
    Berendsen,
    Langevin,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NuclearSampling {
    /// use the given positions and momenta
    Fixed,
    /// sample the momenta around the given values
    Momenta,
    /// sample the positions around the given values
    Positions,
    /// sample positions and momenta
    Both,
    /// draw the momenta from a Maxwell-Boltzmann distribution
    Boltzmann,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ElectronicSampling {
    /// amplitude 1 on the initial state
    Fixed,
    /// amplitude of modulus 1 and random phase on the initial state
    RandomPhase,
    /// amplitudes sqrt(p_i) of the given populations
    Populations,
    /// amplitudes sqrt(p_i) with random phases
    PopulationsRandomPhase,
}

fn default_nstep() -> usize {
    NSTEP
}
fn default_integration_timestep() -> f64 {
    INTEGRATION_TIMESTEP
}
fn default_ntraj() -> usize {
    NTRAJ
}
fn default_seed() -> u64 {
    SEED
}
fn default_nstates() -> usize {
    NSTATES
}
fn default_representation() -> Representation {
    Representation::Adiabatic
}
fn default_nbra() -> bool {
    NBRA
}
fn default_hop_scheme() -> HopScheme {
    HopScheme::Fssh
}
fn default_decoherence_scheme() -> DecoherenceScheme {
    DecoherenceScheme::None
}
fn default_rescaling_direction() -> RescalingDirection {
    RescalingDirection::AlongCoupling
}
fn default_frustrated_hop_policy() -> FrustratedHopPolicy {
    FrustratedHopPolicy::Reject
}
fn default_integrator() -> ElectronicIntegrator {
    ElectronicIntegrator::Exact
}
fn default_substeps() -> usize {
    ELECTRONIC_SUBSTEPS
}
fn default_nac_source() -> NacSource {
    NacSource::DerivativeCouplings
}
fn default_phase_correction() -> bool {
    PHASE_CORRECTION
}
fn default_phase_correction_tol() -> f64 {
    PHASE_CORRECTION_TOL
}
fn default_state_tracking() -> bool {
    STATE_TRACKING
}
fn default_degeneracy_threshold() -> f64 {
    DEGENERACY_THRESHOLD
}
fn default_acceptance() -> HopAcceptance {
    HopAcceptance::Rescaling
}
fn default_use_boltzmann_factor() -> bool {
    USE_BOLTZMANN_FACTOR
}
fn default_temperature() -> f64 {
    TEMPERATURE
}
fn default_energy_tolerance() -> f64 {
    ENERGY_TOLERANCE
}
fn default_reset_trigger() -> ResetTrigger {
    ResetTrigger::Accepted
}
fn default_collapse() -> CollapseOption {
    CollapseOption::PreservePhase
}
fn default_c_param() -> f64 {
    DECOHERENCE_CONSTANT
}
fn default_eps_param() -> f64 {
    DECOHERENCE_EPSILON
}
fn default_thermostat_kind() -> ThermostatKind {
    ThermostatKind::None
}
fn default_time_coupling() -> f64 {
    TIME_COUPLING
}
fn default_friction() -> f64 {
    FRICTION
}
fn default_positions() -> Vec<f64> {
    vec![POSITION]
}
fn default_momenta() -> Vec<f64> {
    vec![MOMENTUM]
}
fn default_masses() -> Vec<f64> {
    vec![MASS]
}
fn default_nuclear_sampling() -> NuclearSampling {
    NuclearSampling::Fixed
}
fn default_force_constant() -> Vec<f64> {
    vec![FORCE_CONSTANT]
}
fn default_init_representation() -> Representation {
    Representation::Adiabatic
}
fn default_electronic_sampling() -> ElectronicSampling {
    ElectronicSampling::Fixed
}
fn default_initial_state() -> usize {
    INITIAL_STATE
}
fn default_print_restart() -> bool {
    PRINT_RESTART
}
fn default_print_populations() -> bool {
    PRINT_POPULATIONS
}
fn default_print_energies() -> bool {
    PRINT_ENERGIES
}
fn default_print_states() -> bool {
    PRINT_STATES
}
fn default_print_trajectories() -> bool {
    PRINT_TRAJECTORIES
}
fn default_output_directory() -> String {
    String::from(OUTPUT_DIRECTORY)
}
fn default_electronic_config() -> ElectronicConfiguration {
    ElectronicConfiguration::default()
}
fn default_tracking_config() -> TrackingConfiguration {
    TrackingConfiguration::default()
}
fn default_hopping_config() -> HoppingConfiguration {
    HoppingConfiguration::default()
}
fn default_decoherence_config() -> DecoherenceConfiguration {
    DecoherenceConfiguration::default()
}
fn default_thermostat_config() -> ThermostatConfiguration {
    ThermostatConfiguration::default()
}
fn default_nuclear_config() -> NuclearConfiguration {
    NuclearConfiguration::default()
}
fn default_electronic_init_config() -> ElectronicInitConfiguration {
    ElectronicInitConfiguration::default()
}
fn default_print_configuration() -> PrintConfiguration {
    PrintConfiguration::default()
}

/// Struct that loads the configuration of the dynamics from the file "dynamics.toml".
/// Unknown keys and unknown option values are rejected when the file is read.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct DynamicConfiguration {
    #[serde(default = "default_nstep")]
    pub nstep: usize,
    #[serde(default = "default_integration_timestep")]
    pub integration_timestep: f64,
    #[serde(default = "default_ntraj")]
    pub ntraj: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_nstates")]
    pub nstates: usize,
    #[serde(default = "default_representation")]
    pub representation: Representation,
    #[serde(default = "default_nbra")]
    pub nbra: bool,
    #[serde(default = "default_hop_scheme")]
    pub hop_scheme: HopScheme,
    #[serde(default = "default_decoherence_scheme")]
    pub decoherence_scheme: DecoherenceScheme,
    #[serde(default = "default_rescaling_direction")]
    pub rescaling_direction: RescalingDirection,
    #[serde(default = "default_frustrated_hop_policy")]
    pub frustrated_hop_policy: FrustratedHopPolicy,
    #[serde(default)]
    pub constrained_dofs: Vec<usize>,
    #[serde(default = "default_electronic_config")]
    pub electronic: ElectronicConfiguration,
    #[serde(default = "default_tracking_config")]
    pub tracking: TrackingConfiguration,
    #[serde(default = "default_hopping_config")]
    pub hopping: HoppingConfiguration,
    #[serde(default = "default_decoherence_config")]
    pub decoherence: DecoherenceConfiguration,
    #[serde(default = "default_thermostat_config")]
    pub thermostat_params: ThermostatConfiguration,
    #[serde(default = "default_nuclear_config")]
    pub nuclear: NuclearConfiguration,
    #[serde(default = "default_electronic_init_config")]
    pub electronic_init: ElectronicInitConfiguration,
    #[serde(default = "default_print_configuration")]
    pub print: PrintConfiguration,
}

impl Default for DynamicConfiguration {
    fn default() -> Self {
        Self {
            nstep: default_nstep(),
            integration_timestep: default_integration_timestep(),
            ntraj: default_ntraj(),
            seed: default_seed(),
            nstates: default_nstates(),
            representation: default_representation(),
            nbra: default_nbra(),
            hop_scheme: default_hop_scheme(),
            decoherence_scheme: default_decoherence_scheme(),
            rescaling_direction: default_rescaling_direction(),
            frustrated_hop_policy: default_frustrated_hop_policy(),
            constrained_dofs: Vec::new(),
            electronic: default_electronic_config(),
            tracking: default_tracking_config(),
            hopping: default_hopping_config(),
            decoherence: default_decoherence_config(),
            thermostat_params: default_thermostat_config(),
            nuclear: default_nuclear_config(),
            electronic_init: default_electronic_init_config(),
            print: default_print_configuration(),
        }
    }
}

impl DynamicConfiguration {
    /// Read the configuration file "dynamics.toml" from the working directory. If it
    /// does not exist, the default settings are used and written to the directory.
    pub fn new() -> Result<Self> {
        let config_file_path: &Path = Path::new(CONFIG_FILE_NAME);
        if config_file_path.exists() {
            Self::from_file(config_file_path)
        } else {
            let config: Self = Self::default();
            config.check()?;
            // save the configuration file so that the user can see all used options
            fs::write(config_file_path, config.to_toml()?)?;
            Ok(config)
        }
    }

    /// Read and validate the configuration from a toml file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_string: String = fs::read_to_string(path)?;
        Self::from_toml(&config_string)
    }

    /// Parse and validate the configuration from a toml string
    pub fn from_toml(config_string: &str) -> Result<Self> {
        let config: Self = toml::from_str(config_string)
            .map_err(|err| DynamicsError::InvalidConfiguration(err.to_string()))?;
        config.check()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).map_err(|err| DynamicsError::Parse {
            what: "dynamics configuration",
            message: err.to_string(),
        })
    }

    /// number of nuclear degrees of freedom
    pub fn ndof(&self) -> usize {
        self.nuclear.positions.len()
    }

    /// Setup time validation of all options. Everything that is accepted here is
    /// valid for the whole run.
    pub fn check(&self) -> Result<()> {
        let invalid = |msg: String| Err(DynamicsError::InvalidConfiguration(msg));
        let ndof: usize = self.ndof();

        if !(self.integration_timestep > 0.0 && self.integration_timestep.is_finite()) {
            return invalid(format!(
                "integration_timestep must be positive, got {}",
                self.integration_timestep
            ));
        }
        if self.ntraj == 0 {
            return invalid(String::from("ntraj must be at least 1"));
        }
        if self.nstates == 0 {
            return invalid(String::from("nstates must be at least 1"));
        }
        if self.electronic.substeps == 0 {
            return invalid(String::from("electronic.substeps must be at least 1"));
        }
        if self.representation == Representation::Diabatic
            && self.electronic.integrator == ElectronicIntegrator::LocalDiabatization
        {
            return invalid(String::from(
                "the local diabatization integrator requires representation = \"adiabatic\"",
            ));
        }
        if self.nbra && self.hopping.acceptance == HopAcceptance::Rescaling {
            return invalid(String::from(
                "nbra dynamics shares one nuclear path and cannot rescale momenta, \
                 use hopping.acceptance = \"boltzmann\" or \"always\"",
            ));
        }
        if self.tracking.phase_correction_tol < 0.0 || self.tracking.degeneracy_threshold < 0.0 {
            return invalid(String::from(
                "tracking tolerances must not be negative",
            ));
        }
        let needs_temperature: bool = self.hopping.use_boltzmann_factor
            || self.hopping.acceptance == HopAcceptance::Boltzmann;
        if needs_temperature && self.hopping.temperature <= 0.0 {
            return invalid(format!(
                "hopping.temperature must be positive, got {}",
                self.hopping.temperature
            ));
        }
        if self.hopping.energy_tolerance < 0.0 {
            return invalid(String::from("hopping.energy_tolerance must not be negative"));
        }
        if let Some(dofs) = self.hopping.quantum_dofs.as_ref() {
            if dofs.is_empty() || dofs.iter().any(|&dof| dof >= ndof) {
                return invalid(format!(
                    "hopping.quantum_dofs {:?} must be a non empty list of indices below {}",
                    dofs, ndof
                ));
            }
        }
        if self.constrained_dofs.iter().any(|&dof| dof >= ndof) {
            return invalid(format!(
                "constrained_dofs {:?} contains indices above the number of dofs {}",
                self.constrained_dofs, ndof
            ));
        }
        if self.decoherence.c_param < 0.0 || self.decoherence.eps_param < 0.0 {
            return invalid(String::from("decoherence parameters must not be negative"));
        }
        if self.decoherence_scheme == DecoherenceScheme::Rates && self.decoherence.rates.is_empty() {
            return invalid(String::from(
                "decoherence_scheme = \"rates\" needs the matrix decoherence.rates",
            ));
        }
        if !self.decoherence.rates.is_empty() {
            let rates: &Vec<Vec<f64>> = &self.decoherence.rates;
            if rates.len() != self.nstates || rates.iter().any(|row| row.len() != self.nstates) {
                return invalid(format!(
                    "decoherence.rates must be a {0} x {0} matrix",
                    self.nstates
                ));
            }
            if rates.iter().flatten().any(|rate| !(rate.is_finite() && *rate >= 0.0)) {
                return invalid(String::from("decoherence.rates must be finite and not negative"));
            }
        }
        match self.thermostat_params.kind {
            ThermostatKind::None => {}
            ThermostatKind::Berendsen => {
                if self.thermostat_params.temperature <= 0.0
                    || self.thermostat_params.time_coupling <= 0.0
                {
                    return invalid(String::from(
                        "the Berendsen thermostat needs a positive temperature and time_coupling",
                    ));
                }
            }
            ThermostatKind::Langevin => {
                if self.thermostat_params.temperature < 0.0 || self.thermostat_params.friction < 0.0
                {
                    return invalid(String::from(
                        "the Langevin thermostat needs a non negative temperature and friction",
                    ));
                }
            }
        }
        self.nuclear.check()?;
        self.electronic_init.check(self.nstates)?;
        Ok(())
    }

    /// Verify that the provider describes the same system as the configuration
    pub fn check_provider(&self, provider: &dyn HamiltonianProvider) -> Result<()> {
        DynamicsError::check_dimension("number of electronic states", self.nstates, provider.nstates())?;
        DynamicsError::check_dimension("number of nuclear dofs", self.ndof(), provider.ndof())?;
        Ok(())
    }

    /// Write the most important settings to the log
    pub fn print_settings(&self) {
        info!("{:<35} {:>20}", "number of trajectories:", self.ntraj);
        info!("{:<35} {:>20}", "number of steps:", self.nstep);
        info!("{:<35} {:>20.4}", "time step (a.u.):", self.integration_timestep);
        info!("{:<35} {:>20}", "number of states:", self.nstates);
        info!("{:<35} {:>20}", "degrees of freedom:", self.ndof());
        info!("{:<35} {:>20?}", "representation:", self.representation);
        info!("{:<35} {:>20?}", "electronic integrator:", self.electronic.integrator);
        info!("{:<35} {:>20?}", "hopping scheme:", self.hop_scheme);
        info!("{:<35} {:>20?}", "hop acceptance:", self.hopping.acceptance);
        info!("{:<35} {:>20?}", "rescaling direction:", self.rescaling_direction);
        info!("{:<35} {:>20?}", "frustrated hops:", self.frustrated_hop_policy);
        info!("{:<35} {:>20?}", "decoherence:", self.decoherence_scheme);
        info!("{:<35} {:>20?}", "thermostat:", self.thermostat_params.kind);
        info!("{:<35} {:>20}", "nbra:", self.nbra);
        info!("{:<35} {:>20}", "seed:", self.seed);
    }
}

/// Struct that holds the parameters of the electronic propagation
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ElectronicConfiguration {
    #[serde(default = "default_integrator")]
    pub integrator: ElectronicIntegrator,
    #[serde(default = "default_substeps")]
    pub substeps: usize,
    #[serde(default = "default_nac_source")]
    pub nac_source: NacSource,
}

impl Default for ElectronicConfiguration {
    fn default() -> Self {
        Self {
            integrator: default_integrator(),
            substeps: default_substeps(),
            nac_source: default_nac_source(),
        }
    }
}

/// Struct that holds the parameters for the phase correction and the state tracking
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct TrackingConfiguration {
    #[serde(default = "default_phase_correction")]
    pub phase_correction: bool,
    #[serde(default = "default_phase_correction_tol")]
    pub phase_correction_tol: f64,
    #[serde(default = "default_state_tracking")]
    pub state_tracking: bool,
    #[serde(default = "default_degeneracy_threshold")]
    pub degeneracy_threshold: f64,
}

impl Default for TrackingConfiguration {
    fn default() -> Self {
        Self {
            phase_correction: default_phase_correction(),
            phase_correction_tol: default_phase_correction_tol(),
            state_tracking: default_state_tracking(),
            degeneracy_threshold: default_degeneracy_threshold(),
        }
    }
}

/// Structs that holds the parameters for the surface hopping routines
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct HoppingConfiguration {
    #[serde(default = "default_acceptance")]
    pub acceptance: HopAcceptance,
    #[serde(default = "default_use_boltzmann_factor")]
    pub use_boltzmann_factor: bool,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_energy_tolerance")]
    pub energy_tolerance: f64,
    /// degrees of freedom that take part in the momentum rescaling, all if not set
    #[serde(default)]
    pub quantum_dofs: Option<Vec<usize>>,
}

impl Default for HoppingConfiguration {
    fn default() -> Self {
        Self {
            acceptance: default_acceptance(),
            use_boltzmann_factor: default_use_boltzmann_factor(),
            temperature: default_temperature(),
            energy_tolerance: default_energy_tolerance(),
            quantum_dofs: None,
        }
    }
}

/// Struct that holds the parameters of the decoherence correction
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct DecoherenceConfiguration {
    #[serde(default = "default_reset_trigger")]
    pub reset_trigger: ResetTrigger,
    #[serde(default = "default_collapse")]
    pub collapse: CollapseOption,
    #[serde(default = "default_c_param")]
    pub c_param: f64,
    #[serde(default = "default_eps_param")]
    pub eps_param: f64,
    /// dephasing rates between all pairs of states in 1/a.u. of time, nstates x
    /// nstates. Used by the rates scheme and, if given, by the dish hops.
    #[serde(default)]
    pub rates: Vec<Vec<f64>>,
}

impl Default for DecoherenceConfiguration {
    fn default() -> Self {
        Self {
            reset_trigger: default_reset_trigger(),
            collapse: default_collapse(),
            c_param: default_c_param(),
            eps_param: default_eps_param(),
            rates: Vec::new(),
        }
    }
}

/// Struct that holds the parameters for the Thermostat
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ThermostatConfiguration {
    #[serde(default = "default_thermostat_kind")]
    pub kind: ThermostatKind,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_time_coupling")]
    pub time_coupling: f64,
    #[serde(default = "default_friction")]
    pub friction: f64,
}

impl Default for ThermostatConfiguration {
    fn default() -> Self {
        Self {
            kind: default_thermostat_kind(),
            temperature: default_temperature(),
            time_coupling: default_time_coupling(),
            friction: default_friction(),
        }
    }
}

/// Struct that holds the nuclear initial conditions
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct NuclearConfiguration {
    #[serde(default = "default_positions")]
    pub positions: Vec<f64>,
    #[serde(default = "default_momenta")]
    pub momenta: Vec<f64>,
    #[serde(default = "default_masses")]
    pub masses: Vec<f64>,
    #[serde(default = "default_nuclear_sampling")]
    pub sampling: NuclearSampling,
    #[serde(default = "default_force_constant")]
    pub force_constant: Vec<f64>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for NuclearConfiguration {
    fn default() -> Self {
        Self {
            positions: default_positions(),
            momenta: default_momenta(),
            masses: default_masses(),
            sampling: default_nuclear_sampling(),
            force_constant: default_force_constant(),
            temperature: default_temperature(),
        }
    }
}

impl NuclearConfiguration {
    fn check(&self) -> Result<()> {
        let ndof: usize = self.positions.len();
        if ndof == 0 {
            return Err(DynamicsError::InvalidConfiguration(String::from(
                "nuclear.positions must contain at least one degree of freedom",
            )));
        }
        DynamicsError::check_dimension("nuclear.momenta", ndof, self.momenta.len())
            .and_then(|_| DynamicsError::check_dimension("nuclear.masses", ndof, self.masses.len()))
            .map_err(|err| DynamicsError::InvalidConfiguration(err.to_string()))?;
        if self.masses.iter().any(|&mass| !(mass > 0.0)) {
            return Err(DynamicsError::InvalidConfiguration(String::from(
                "nuclear.masses must be positive",
            )));
        }
        match self.sampling {
            NuclearSampling::Fixed => {}
            NuclearSampling::Boltzmann => {
                if self.temperature < 0.0 {
                    return Err(DynamicsError::InvalidConfiguration(String::from(
                        "nuclear.temperature must not be negative",
                    )));
                }
            }
            _ => {
                if self.force_constant.len() != ndof
                    || self.force_constant.iter().any(|&k| !(k > 0.0))
                {
                    return Err(DynamicsError::InvalidConfiguration(format!(
                        "nuclear.force_constant needs {} positive values",
                        ndof
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Struct that holds the electronic initial conditions
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ElectronicInitConfiguration {
    /// representation in which the initial amplitudes are given
    #[serde(default = "default_init_representation")]
    pub representation: Representation,
    #[serde(default = "default_electronic_sampling")]
    pub sampling: ElectronicSampling,
    #[serde(default = "default_initial_state")]
    pub istate: usize,
    #[serde(default)]
    pub populations: Vec<f64>,
}

impl Default for ElectronicInitConfiguration {
    fn default() -> Self {
        Self {
            representation: default_init_representation(),
            sampling: default_electronic_sampling(),
            istate: default_initial_state(),
            populations: Vec::new(),
        }
    }
}

impl ElectronicInitConfiguration {
    fn check(&self, nstates: usize) -> Result<()> {
        match self.sampling {
            ElectronicSampling::Fixed | ElectronicSampling::RandomPhase => {
                if self.istate >= nstates {
                    return Err(DynamicsError::InvalidConfiguration(format!(
                        "electronic_init.istate {} is not below nstates {}",
                        self.istate, nstates
                    )));
                }
            }
            ElectronicSampling::Populations | ElectronicSampling::PopulationsRandomPhase => {
                if self.populations.len() != nstates {
                    return Err(DynamicsError::InvalidConfiguration(format!(
                        "electronic_init.populations needs {} entries, found {}",
                        nstates,
                        self.populations.len()
                    )));
                }
                let sum: f64 = self.populations.iter().sum();
                if self.populations.iter().any(|&pop| pop < 0.0) || (sum - 1.0).abs() > 1.0e-6 {
                    return Err(DynamicsError::InvalidConfiguration(format!(
                        "electronic_init.populations must be non negative and sum to 1, sum is {}",
                        sum
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Struct that controls the output of the simulation
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct PrintConfiguration {
    #[serde(default = "default_print_restart")]
    pub print_restart: bool,
    #[serde(default = "default_print_populations")]
    pub print_populations: bool,
    #[serde(default = "default_print_energies")]
    pub print_energies: bool,
    #[serde(default = "default_print_states")]
    pub print_states: bool,
    #[serde(default = "default_print_trajectories")]
    pub print_trajectories: bool,
    #[serde(default = "default_output_directory")]
    pub output_directory: String,
}

impl Default for PrintConfiguration {
    fn default() -> Self {
        Self {
            print_restart: default_print_restart(),
            print_populations: default_print_populations(),
            print_energies: default_print_energies(),
            print_states: default_print_states(),
            print_trajectories: default_print_trajectories(),
            output_directory: default_output_directory(),
        }
    }
}
