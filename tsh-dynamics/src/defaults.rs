// config file
pub const CONFIG_FILE_NAME: &str = "dynamics.toml";
// restart file
pub const RESTART_FILE_NAME: &str = "dynamics_restart.yaml";
// number of nuclear steps
pub const NSTEP: usize = 1000;
// nuclear stepsize in atomic units of time
pub const INTEGRATION_TIMESTEP: f64 = 1.0;
// number of trajectories in the ensemble
pub const NTRAJ: usize = 1;
// seed of the first trajectory, trajectory i uses SEED + i
pub const SEED: u64 = 0;
// number of electronic states
pub const NSTATES: usize = 2;
// initial electronic state
pub const INITIAL_STATE: usize = 0;
// share one reference Hamiltonian trajectory between all members of the ensemble
pub const NBRA: bool = false;

// number of substeps of the electronic propagation in one nuclear step
pub const ELECTRONIC_SUBSTEPS: usize = 1;
// align the signs of the adiabatic states with the previous step
pub const PHASE_CORRECTION: bool = true;
// minimal magnitude of a time-overlap element that is used to fix a sign
pub const PHASE_CORRECTION_TOL: f64 = 1.0e-3;
// reorder the adiabatic states by maximal overlap with the previous step
pub const STATE_TRACKING: bool = true;
// energy gap in Hartree below which two adiabatic states count as degenerate
pub const DEGENERACY_THRESHOLD: f64 = 1.0e-8;

// energy differences below this value (Hartree) need no momentum rescaling
pub const ENERGY_TOLERANCE: f64 = 1.0e-12;
// scale upward hopping probabilities by the Boltzmann factor
pub const USE_BOLTZMANN_FACTOR: bool = false;
// temperature (K)
pub const TEMPERATURE: f64 = 300.0;

// constants of the energy based decoherence correction according to
// eqn. (17) in JCP 126, 134114 (2007); C is dimensionless, epsilon in Hartree
pub const DECOHERENCE_CONSTANT: f64 = 1.0;
pub const DECOHERENCE_EPSILON: f64 = 0.1;

// coupling time of the Berendsen thermostat in atomic units of time
pub const TIME_COUPLING: f64 = 2000.0;
// friction coefficient for ethylene glycol (in a.u.^-1)
pub const FRICTION: f64 = 0.015585;

// nuclear initial conditions
pub const POSITION: f64 = 0.0;
pub const MOMENTUM: f64 = 0.0;
pub const MASS: f64 = 2000.0;
// force constant of the harmonic reference used for the sampling (Ha / bohr^2)
pub const FORCE_CONSTANT: f64 = 0.001;

// output
pub const PRINT_RESTART: bool = true;
pub const PRINT_POPULATIONS: bool = true;
pub const PRINT_ENERGIES: bool = true;
pub const PRINT_STATES: bool = false;
pub const PRINT_TRAJECTORIES: bool = false;
pub const OUTPUT_DIRECTORY: &str = ".";
