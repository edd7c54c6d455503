use crate::dynamics::simulation::StepReport;
use crate::dynamics::statistics::EnsembleObservables;
use crate::error::{DynamicsError, Result};
use crate::initialization::restart::write_restart;
use crate::initialization::{DynamicsVariables, PrintConfiguration};
use ndarray::prelude::*;
use ndarray_npy::write_npy;
use std::fmt::Write as FmtWrite;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Receiver of the results of a simulation
pub trait OutputSink {
    /// all steps of one trajectory
    fn write_trajectory(&mut self, index: usize, steps: &[StepReport]) -> Result<()>;
    /// the averages over the ensemble
    fn write_observables(
        &mut self,
        observables: &EnsembleObservables,
        nstates: usize,
    ) -> Result<()>;
    /// the state of the ensemble at the end of the run
    fn write_restart(&mut self, variables: &DynamicsVariables) -> Result<()>;
}

/// Keeps everything in memory
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub trajectories: Vec<(usize, Vec<StepReport>)>,
    pub observables: Option<EnsembleObservables>,
    pub restart: Option<DynamicsVariables>,
}

impl OutputSink for MemorySink {
    fn write_trajectory(&mut self, index: usize, steps: &[StepReport]) -> Result<()> {
        self.trajectories.push((index, steps.to_vec()));
        Ok(())
    }

    fn write_observables(
        &mut self,
        observables: &EnsembleObservables,
        _nstates: usize,
    ) -> Result<()> {
        self.observables = Some(observables.clone());
        Ok(())
    }

    fn write_restart(&mut self, variables: &DynamicsVariables) -> Result<()> {
        self.restart = Some(variables.clone());
        Ok(())
    }
}

/// Writes plain text files, an .npy array of the populations and the restart
/// file into the output directory, as selected by the [PrintConfiguration]
pub struct FileSink {
    pub directory: PathBuf,
    pub print: PrintConfiguration,
}

impl FileSink {
    pub fn new(print: &PrintConfiguration) -> Result<Self> {
        let directory: PathBuf = PathBuf::from(&print.output_directory);
        fs::create_dir_all(&directory)?;
        Ok(Self {
            directory,
            print: print.clone(),
        })
    }

    fn create(&self, name: &str) -> Result<BufWriter<File>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.directory.join(name))?;
        Ok(BufWriter::new(file))
    }
}

fn format_error(err: std::fmt::Error) -> DynamicsError {
    DynamicsError::Parse {
        what: "output line",
        message: err.to_string(),
    }
}

impl OutputSink for FileSink {
    fn write_trajectory(&mut self, index: usize, steps: &[StepReport]) -> Result<()> {
        if self.print.print_trajectories {
            let mut stream = self.create(&format!("trajectory_{:05}.dat", index))?;
            writeln!(
                stream,
                "# {:>8} {:>14} {:>6} {:>16} {:>16} {:>16}  positions  momenta",
                "step", "time", "state", "E_kin", "E_pot", "E_tot"
            )?;
            for report in steps.iter() {
                let record = &report.record;
                let mut line: String = format!(
                    "{:>10} {:>14.4} {:>6} {:>16.10} {:>16.10} {:>16.10}",
                    record.step,
                    record.time,
                    record.active_state,
                    record.kinetic_energy,
                    record.potential_energy,
                    record.total_energy()
                );
                for val in record.positions.iter().chain(record.momenta.iter()) {
                    write!(line, " {:>16.10}", val).map_err(format_error)?;
                }
                writeln!(stream, "{}", line)?;
            }
            stream.flush()?;
        }
        if self.print.print_states {
            let mut stream = self.create(&format!("hops_{:05}.dat", index))?;
            for report in steps.iter().filter(|report| report.hop.is_attempt()) {
                writeln!(
                    stream,
                    "{:>10} {:>14.4} {:?}",
                    report.record.step, report.record.time, report.hop
                )?;
            }
            stream.flush()?;
        }
        Ok(())
    }

    fn write_observables(
        &mut self,
        observables: &EnsembleObservables,
        nstates: usize,
    ) -> Result<()> {
        if self.print.print_populations {
            let mut stream = self.create("populations.dat")?;
            for step in observables.steps.iter() {
                let mut line: String = format!("{:>14.4}", step.time);
                for (sh, se) in step.sh_populations.iter().zip(step.se_populations.iter()) {
                    write!(line, " {:>12.8} {:>12.8}", sh, se).map_err(format_error)?;
                }
                writeln!(stream, "{}", line)?;
            }
            stream.flush()?;
            let populations: Array2<f64> = observables.population_matrix(nstates);
            write_npy(self.directory.join("populations.npy"), &populations).map_err(|err| {
                DynamicsError::Parse {
                    what: "populations.npy",
                    message: err.to_string(),
                }
            })?;
        }
        if self.print.print_energies {
            let mut stream = self.create("energies.dat")?;
            writeln!(
                stream,
                "# {:>12} {:>16} {:>16} {:>16} {:>16}",
                "time", "<E_kin>", "<E_pot>", "<E_tot>", "std(E_tot)"
            )?;
            for step in observables.steps.iter() {
                writeln!(
                    stream,
                    "{:>14.4} {:>16.10} {:>16.10} {:>16.10} {:>16.10}",
                    step.time,
                    step.kinetic_energy.mean,
                    step.potential_energy.mean,
                    step.total_energy.mean,
                    step.total_energy.std
                )?;
            }
            stream.flush()?;
        }
        Ok(())
    }

    fn write_restart(&mut self, variables: &DynamicsVariables) -> Result<()> {
        if self.print.print_restart {
            write_restart(Path::new(&self.directory), variables)?;
        }
        Ok(())
    }
}
