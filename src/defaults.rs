// jobtype
pub const JOBTYPE: &str = "dynamics";
// config file of the program, the dynamics are configured in "dynamics.toml"
pub const CONFIG_FILE_NAME: &str = "tsh.toml";
// number of threads of the global rayon pool, 0 uses all cores
pub const NUMBER_OF_CORES: usize = 0;
// continue the ensemble from the restart file in the output directory
pub const RESTART: bool = false;

// Single avoided crossing model (Tully model I), J. Chem. Phys. 93, 1061 (1990)
pub const SAC_A: f64 = 0.01;
pub const SAC_B: f64 = 1.6;
pub const SAC_C: f64 = 0.005;
pub const SAC_D: f64 = 1.0;

// tabulated diabatic Hamiltonians, nsteps x nstates x nstates
pub const TABULATED_FILE_NAME: &str = "hamiltonians.npy";

// potential energy scan along the first coordinate
pub const SCAN_START: f64 = -10.0;
pub const SCAN_END: f64 = 10.0;
pub const SCAN_POINTS: usize = 201;
pub const SCAN_FILE_NAME: &str = "scan.dat";
