use crate::dynamics::simulation::{StepRecord, TrajectoryResult};
use itertools::Itertools;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

/// Average and standard deviation of an ensemble quantity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeanStd {
    pub mean: f64,
    pub std: f64,
}

impl MeanStd {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self { mean: 0.0, std: 0.0 };
        }
        let n: f64 = values.len() as f64;
        let mean: f64 = values.iter().sum::<f64>() / n;
        let variance: f64 = values.iter().map(|val| (val - mean).powi(2)).sum::<f64>() / n;
        Self {
            mean,
            std: variance.sqrt(),
        }
    }
}

/// Ensemble averages at one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepObservables {
    pub step: usize,
    pub time: f64,
    /// number of trajectories that contribute
    pub ntraj: usize,
    /// fraction of trajectories in every active state
    pub sh_populations: Array1<f64>,
    /// average of the adiabatic populations |c_i|^2
    pub se_populations: Array1<f64>,
    pub kinetic_energy: MeanStd,
    pub potential_energy: MeanStd,
    pub total_energy: MeanStd,
}

impl StepObservables {
    pub fn from_records(records: &[&StepRecord], nstates: usize) -> Self {
        let ntraj: usize = records.len();
        let mut sh_populations: Array1<f64> = Array1::zeros(nstates);
        let mut se_populations: Array1<f64> = Array1::zeros(nstates);
        for record in records.iter() {
            sh_populations[record.active_state] += 1.0;
            se_populations += &record.populations;
        }
        if ntraj > 0 {
            sh_populations /= ntraj as f64;
            se_populations /= ntraj as f64;
        }
        let kinetic: Vec<f64> = records.iter().map(|rec| rec.kinetic_energy).collect_vec();
        let potential: Vec<f64> = records.iter().map(|rec| rec.potential_energy).collect_vec();
        let total: Vec<f64> = records.iter().map(|rec| rec.total_energy()).collect_vec();
        Self {
            step: records.first().map_or(0, |record| record.step),
            time: records.first().map_or(0.0, |record| record.time),
            ntraj,
            sh_populations,
            se_populations,
            kinetic_energy: MeanStd::from_values(&kinetic),
            potential_energy: MeanStd::from_values(&potential),
            total_energy: MeanStd::from_values(&total),
        }
    }
}

/// Final state of the trajectories split by the direction in which they left
/// along the first coordinate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transmission {
    /// fraction of trajectories that end in state i with q_0 > 0
    pub transmitted: Array1<f64>,
    /// fraction of trajectories that end in state i with q_0 <= 0
    pub reflected: Array1<f64>,
}

impl Transmission {
    pub fn from_records(records: &[&StepRecord], nstates: usize) -> Self {
        let mut transmitted: Array1<f64> = Array1::zeros(nstates);
        let mut reflected: Array1<f64> = Array1::zeros(nstates);
        for record in records.iter() {
            if record.positions[0] > 0.0 {
                transmitted[record.active_state] += 1.0;
            } else {
                reflected[record.active_state] += 1.0;
            }
        }
        if !records.is_empty() {
            transmitted /= records.len() as f64;
            reflected /= records.len() as f64;
        }
        Self {
            transmitted,
            reflected,
        }
    }

    /// fraction of trajectories that end in the given state
    pub fn state_fraction(&self, state: usize) -> f64 {
        self.transmitted[state] + self.reflected[state]
    }
}

/// Observables of a whole ensemble run. Only trajectories that finished all
/// steps contribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleObservables {
    pub steps: Vec<StepObservables>,
    pub transmission: Transmission,
}

impl EnsembleObservables {
    pub fn from_results(results: &[TrajectoryResult], nstates: usize) -> Self {
        let finished: Vec<&Vec<_>> = results
            .iter()
            .filter_map(|result| result.as_ref().ok())
            .map(|report| &report.steps)
            .collect();
        let nsteps: usize = finished.iter().map(|steps| steps.len()).min().unwrap_or(0);

        let steps: Vec<StepObservables> = (0..nsteps)
            .map(|step| {
                let records: Vec<&StepRecord> =
                    finished.iter().map(|steps| &steps[step].record).collect();
                StepObservables::from_records(&records, nstates)
            })
            .collect();
        let last: Vec<&StepRecord> = finished
            .iter()
            .filter_map(|steps| steps.last())
            .map(|report| &report.record)
            .collect();

        Self {
            steps,
            transmission: Transmission::from_records(&last, nstates),
        }
    }

    /// SH populations of all steps as nsteps x nstates array
    pub fn population_matrix(&self, nstates: usize) -> Array2<f64> {
        let mut populations: Array2<f64> = Array2::zeros((self.steps.len(), nstates));
        for (mut row, step) in populations.outer_iter_mut().zip(self.steps.iter()) {
            row.assign(&step.sh_populations);
        }
        populations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::hop_acceptance::HopState;
    use crate::dynamics::simulation::{StepReport, TrajectoryReport};
    use crate::DynamicsError;
    use approx::AbsDiffEq;

    pub const EPSILON: f64 = 1e-14;

    fn record(active_state: usize, x: f64, kinetic_energy: f64) -> StepRecord {
        let mut populations: Array1<f64> = Array1::zeros(2);
        populations[active_state] = 0.8;
        populations[1 - active_state] = 0.2;
        StepRecord {
            step: 0,
            time: 0.0,
            positions: array![x],
            momenta: array![1.0],
            active_state,
            populations,
            energies: array![-0.01, 0.01],
            kinetic_energy,
            potential_energy: if active_state == 0 { -0.01 } else { 0.01 },
        }
    }

    fn report(record: StepRecord) -> StepReport {
        StepReport {
            hop: HopState::Unchanged,
            draw: 0.5,
            probabilities: Array1::zeros(2),
            anomalies: Vec::new(),
            record,
        }
    }

    #[test]
    fn populations_and_energies_are_averaged() {
        let a = record(0, 1.0, 0.1);
        let b = record(1, -1.0, 0.3);
        let observables = StepObservables::from_records(&[&a, &b], 2);
        assert!(observables.sh_populations.abs_diff_eq(&array![0.5, 0.5], EPSILON));
        assert!(observables.se_populations.abs_diff_eq(&array![0.5, 0.5], EPSILON));
        assert!((observables.kinetic_energy.mean - 0.2).abs() < EPSILON);
        assert!((observables.kinetic_energy.std - 0.1).abs() < EPSILON);
        assert!((observables.total_energy.mean - 0.2).abs() < EPSILON);
    }

    #[test]
    fn failed_trajectories_are_left_out() {
        let results: Vec<TrajectoryResult> = vec![
            Ok(TrajectoryReport {
                index: 0,
                steps: vec![report(record(0, -2.0, 0.1)), report(record(1, 2.0, 0.1))],
            }),
            Err(DynamicsError::Provider(String::from("failed"))),
            Ok(TrajectoryReport {
                index: 2,
                steps: vec![report(record(0, -2.0, 0.1)), report(record(0, 2.0, 0.1))],
            }),
        ];
        let observables = EnsembleObservables::from_results(&results, 2);
        assert_eq!(observables.steps.len(), 2);
        assert_eq!(observables.steps[1].ntraj, 2);
        assert!(observables.transmission.transmitted.abs_diff_eq(&array![0.5, 0.5], EPSILON));
        assert!((observables.transmission.state_fraction(1) - 0.5).abs() < EPSILON);
        assert_eq!(observables.population_matrix(2).dim(), (2, 2));
    }
}
