use crate::io::ScanConfig;
use ndarray::prelude::*;
use std::fmt::Write as FmtWrite;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tsh_dynamics::dynamics::representation::{HamiltonianSnapshot, RepresentationTransformer};
use tsh_dynamics::interface::HamiltonianProvider;
use tsh_dynamics::{DynamicsError, Result};

/// Electronic structure of a model at one point of the scan
#[derive(Debug, Clone)]
pub struct ScanPoint {
    pub x: f64,
    pub diabatic: Array2<f64>,
    pub energies: Array1<f64>,
    /// adiabatic derivative couplings along the first coordinate
    pub couplings: Array2<f64>,
}

/// Points x_i = start + (end - start) i / (points - 1)
pub fn scan_grid(scan: &ScanConfig) -> Result<Array1<f64>> {
    if scan.points == 0 || !(scan.start.is_finite() && scan.end.is_finite()) {
        return Err(DynamicsError::InvalidConfiguration(format!(
            "scan needs at least one point on a finite interval, got {} points in [{}, {}]",
            scan.points, scan.start, scan.end
        )));
    }
    if scan.points == 1 {
        return Ok(array![scan.start]);
    }
    let n: f64 = (scan.points - 1) as f64;
    Ok(Array1::from_shape_fn(scan.points, |i| {
        scan.start + (scan.end - scan.start) * i as f64 / n
    }))
}

/// Evaluate the model along the first nuclear coordinate, all other coordinates
/// are zero. Consecutive points are connected by the state tracking of the
/// transformer, so that the adiabatic states stay continuous along the scan.
pub fn scan_provider(
    provider: &dyn HamiltonianProvider,
    transformer: &RepresentationTransformer,
    scan: &ScanConfig,
) -> Result<Vec<ScanPoint>> {
    let grid: Array1<f64> = scan_grid(scan)?;
    let mut coordinates: Array1<f64> = Array1::zeros(provider.ndof());
    let mut previous: Option<Array2<f64>> = None;
    let mut points: Vec<ScanPoint> = Vec::with_capacity(grid.len());

    for x in grid.iter() {
        coordinates[0] = *x;
        let diabatic = provider.evaluate(coordinates.view(), 0)?;
        let snapshot: HamiltonianSnapshot =
            transformer.update(diabatic, previous.as_ref().map(|u| u.view()))?;
        points.push(ScanPoint {
            x: *x,
            diabatic: snapshot.diabatic.hamiltonian.clone(),
            energies: snapshot.energies.clone(),
            couplings: snapshot
                .derivative_couplings
                .index_axis(Axis(2), 0)
                .to_owned(),
        });
        previous = Some(snapshot.transform);
    }
    Ok(points)
}

/// Write one line per point: x, the diabatic Hamiltonian (upper triangle), the
/// adiabatic energies and the derivative couplings d_ij with i < j.
pub fn write_scan(points: &[ScanPoint], path: &Path) -> Result<()> {
    let mut stream = BufWriter::new(File::create(path)?);
    for point in points.iter() {
        let n: usize = point.energies.len();
        let mut line: String = format!("{:>12.6}", point.x);
        let mut push = |val: f64| {
            write!(line, " {:>18.10e}", val).map_err(|err| DynamicsError::Parse {
                what: "scan line",
                message: err.to_string(),
            })
        };
        for i in 0..n {
            for j in i..n {
                push(point.diabatic[[i, j]])?;
            }
        }
        for e in point.energies.iter() {
            push(*e)?;
        }
        for i in 0..n {
            for j in (i + 1)..n {
                push(point.couplings[[i, j]])?;
            }
        }
        writeln!(stream, "{}", line)?;
    }
    stream.flush()?;
    Ok(())
}
