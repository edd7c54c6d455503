mod sac;
pub(crate) mod scan;
mod tabulated;

pub use sac::{SacParameters, SingleAvoidedCrossing};
pub use scan::{scan_provider, write_scan, ScanPoint};
pub use tabulated::TabulatedHamiltonian;

use crate::io::{ModelConfig, ModelKind};
use anyhow::{Context, Result};
use std::path::Path;
use tsh_dynamics::interface::HamiltonianProvider;

/// Create the Hamiltonian provider that is selected in the configuration
pub fn build_provider(model: &ModelConfig, ndof: usize) -> Result<Box<dyn HamiltonianProvider>> {
    let provider: Box<dyn HamiltonianProvider> = match model.kind {
        ModelKind::Sac => Box::new(SingleAvoidedCrossing::new(model.sac, ndof)),
        ModelKind::Tabulated => Box::new(
            TabulatedHamiltonian::from_npy(Path::new(&model.tabulated_file), ndof)
                .with_context(|| format!("unable to load {}", model.tabulated_file))?,
        ),
    };
    Ok(provider)
}
