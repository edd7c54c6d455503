// Boltzmann constant in Hartree / Kelvin
pub const K_BOLTZMANN: f64 = 3.166_811_563e-6;
// conversion of femtoseconds to atomic units of time
pub const FS_TO_AU: f64 = 41.341_374_575_751;
// conversion of Hartree to eV
pub const HARTREE_TO_EV: f64 = 27.211_386_245_988;
// mass of the proton in electron masses
pub const PROTON_MASS: f64 = 1836.152_673_43;
