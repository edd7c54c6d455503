use crate::dynamics::ensemble::EnsembleReport;
use log::{info, warn};

pub fn print_header_dynamics() {
    warn!("{:^90}", "");
    warn!("{: ^90}", "Surface Hopping Dynamics");
    warn!("{:-^90}", "");
}

pub fn print_footer_dynamics(timing: f64) {
    warn!("{:-<90} ", "");
    warn!("{:>78} {:>8.2} s", "Surface Hopping Dynamics finished in", timing);
}

/// Summary of the final state distribution of the ensemble
pub fn print_ensemble_summary(report: &EnsembleReport) {
    warn!("{: ^90}", "Ensemble Summary");
    warn!("{:-^90}", "");
    info!("{:<35} {:>20}", "finished trajectories:", report.nfinished());
    info!("{:<35} {:>20}", "failed trajectories:", report.nfailed());
    let transmission = &report.observables.transmission;
    info!("{:>8} {:>16} {:>16}", "state", "transmitted", "reflected");
    for (state, (transmitted, reflected)) in transmission
        .transmitted
        .iter()
        .zip(transmission.reflected.iter())
        .enumerate()
    {
        info!("{:>8} {:>16.6} {:>16.6}", state, transmitted, reflected);
    }
    for (index, result) in report.results.iter().enumerate() {
        if let Err(err) = result {
            warn!("trajectory {:>6}: {}", index, err);
        }
    }
    warn!("{:-^90}", "");
}
