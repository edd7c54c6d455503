use crate::c64;
use crate::dynamics::overlaps::overlap_matrix;
use crate::error::{Anomaly, DynamicsError, Result};
use crate::initialization::{Representation, TrackingConfiguration};
use crate::interface::DiabaticHamiltonian;
use crate::linalg::{eigh, inverse_sqrt};
use approx::AbsDiffEq;
use log::{debug, warn};
use ndarray::prelude::*;
use ordered_float::OrderedFloat;
use pathfinding::{kuhn_munkres::kuhn_munkres, matrix::Matrix as pfMatrix};

/// Electronic structure of one nuclear configuration in the diabatic and in the
/// adiabatic representation.
#[derive(Debug, Clone)]
pub struct HamiltonianSnapshot {
    /// diabatic quantities as returned by the provider
    pub diabatic: DiabaticHamiltonian,
    /// adiabatic energies, E_i = (U^T H U)_ii
    pub energies: Array1<f64>,
    /// basis transformation (projector) U, the columns are the adiabatic states
    /// expanded in the diabatic basis
    pub transform: Array2<f64>,
    /// projector of the previous step that was used for the state tracking
    pub previous_transform: Option<Array2<f64>>,
    /// time overlap U_prev^T S U of the tracked states
    pub time_overlap: Option<Array2<f64>>,
    /// gradients of the adiabatic energies, nstates x ndof
    pub gradients: Array2<f64>,
    /// adiabatic derivative coupling vectors <i|d/dR_k j>, nstates x nstates x ndof
    pub derivative_couplings: Array3<f64>,
    /// near degeneracies that were detected in this geometry
    pub anomalies: Vec<Anomaly>,
}

impl HamiltonianSnapshot {
    pub fn nstates(&self) -> usize {
        self.energies.len()
    }

    pub fn ndof(&self) -> usize {
        self.gradients.ncols()
    }

    /// adiabatic Hamiltonian U^T H U
    pub fn adiabatic_hamiltonian(&self) -> Array2<f64> {
        Array2::from_diag(&self.energies)
    }

    /// Forces -dE/dR acting on the nuclei on the given adiabatic surface
    pub fn forces(&self, state: usize) -> Array1<f64> {
        self.gradients.row(state).mapv(|val| -val)
    }

    /// Nonadiabatic coupling in time, NACT_ij = sum_k d_ij^k v_k
    pub fn nact(&self, velocities: ArrayView1<f64>) -> Array2<f64> {
        let n: usize = self.nstates();
        Array2::from_shape_fn((n, n), |(i, j)| {
            self.derivative_couplings
                .slice(s![i, j, ..])
                .dot(&velocities)
        })
    }
}

/// Converts the diabatic electronic structure into the adiabatic representation
/// and keeps the adiabatic states continuous along a trajectory.
///
/// Policy for the order and the signs of the adiabatic states:
/// 1. The eigenpairs are sorted by ascending energy with a stable sort and the
///    sign of every eigenvector is chosen such that its largest component is
///    positive. This raw basis depends only on the current geometry.
/// 2. If a previous projector is given and state tracking is enabled, the states
///    are permuted to maximize sum_i |St_{i,perm(i)}|^2. The energy order is kept
///    whenever it reaches the maximum, so exactly degenerate overlaps never swap
///    states.
/// 3. If phase correction is enabled, a state changes its sign when its diagonal
///    time overlap is negative and larger in magnitude than the tolerance.
#[derive(Debug, Clone)]
pub struct RepresentationTransformer {
    pub tracking: TrackingConfiguration,
}

impl RepresentationTransformer {
    pub fn new(tracking: &TrackingConfiguration) -> Self {
        Self {
            tracking: tracking.clone(),
        }
    }

    pub fn update(
        &self,
        diabatic: DiabaticHamiltonian,
        previous: Option<ArrayView2<f64>>,
    ) -> Result<HamiltonianSnapshot> {
        let nstates: usize = diabatic.nstates();
        let ndof: usize = diabatic.ndof();
        diabatic.check(nstates, ndof)?;
        if let Some(prev) = previous.as_ref() {
            DynamicsError::check_dimension("previous projector rows", nstates, prev.nrows())?;
            DynamicsError::check_dimension("previous projector columns", nstates, prev.ncols())?;
        }

        // Loewdin orthogonalization of a non orthonormal diabatic basis
        let identity: Array2<f64> = Array2::eye(nstates);
        let orthogonalizer: Option<Array2<f64>> =
            if diabatic.overlap.abs_diff_eq(&identity, 1.0e-14) {
                None
            } else {
                Some(inverse_sqrt(diabatic.overlap.view())?)
            };
        let (energies, mut transform): (Array1<f64>, Array2<f64>) = match orthogonalizer.as_ref() {
            Some(x) => {
                let h_orth: Array2<f64> = x.dot(&diabatic.hamiltonian).dot(x);
                let (values, vectors) = eigh(h_orth.view())?;
                (values, x.dot(&vectors))
            }
            None => eigh(diabatic.hamiltonian.view())?,
        };
        fix_signs(&mut transform);

        let (energies, transform, time_overlap): (Array1<f64>, Array2<f64>, Option<Array2<f64>>) =
            match previous.as_ref() {
                Some(prev) => {
                    let (e, u, st) =
                        self.track_states(energies, transform, prev.view(), &diabatic)?;
                    (e, u, Some(st))
                }
                None => (energies, transform, None),
            };

        let mut anomalies: Vec<Anomaly> = Vec::new();
        let (gradients, derivative_couplings) = adiabatic_couplings(
            &diabatic,
            energies.view(),
            transform.view(),
            self.tracking.degeneracy_threshold,
            &mut anomalies,
        );

        Ok(HamiltonianSnapshot {
            diabatic,
            energies,
            transform,
            previous_transform: previous.map(|prev| prev.to_owned()),
            time_overlap,
            gradients,
            derivative_couplings,
            anomalies,
        })
    }

    /// Reorder the raw adiabatic states and align their signs with the states of
    /// the previous step. Returns the energies, the projector and the time overlap.
    fn track_states(
        &self,
        energies: Array1<f64>,
        transform: Array2<f64>,
        previous: ArrayView2<f64>,
        diabatic: &DiabaticHamiltonian,
    ) -> Result<(Array1<f64>, Array2<f64>, Array2<f64>)> {
        let nstates: usize = energies.len();
        let raw_overlap: Array2<f64> =
            overlap_matrix(previous, diabatic.overlap.view(), transform.view());

        let (energies, mut transform) = if self.tracking.state_tracking && nstates > 1 {
            let order: Vec<usize> = find_order(raw_overlap.view())?;
            let identity_weight: f64 = (0..nstates).map(|i| raw_overlap[[i, i]].powi(2)).sum();
            let optimal_weight: f64 = order
                .iter()
                .enumerate()
                .map(|(i, &j)| raw_overlap[[i, j]].powi(2))
                .sum();

            if optimal_weight > identity_weight + 1.0e-10 {
                debug!("state order changed by the tracking: {:?}", order);
                let energies: Array1<f64> = order.iter().map(|&j| energies[j]).collect();
                let transform: Array2<f64> = transform.select(Axis(1), &order);
                (energies, transform)
            } else {
                (energies, transform)
            }
        } else {
            (energies, transform)
        };

        let mut time_overlap: Array2<f64> =
            overlap_matrix(previous, diabatic.overlap.view(), transform.view());
        if self.tracking.phase_correction {
            for j in 0..nstates {
                let st_jj: f64 = time_overlap[[j, j]];
                if st_jj < 0.0 && st_jj.abs() > self.tracking.phase_correction_tol {
                    transform.column_mut(j).mapv_inplace(|val| -val);
                    time_overlap.column_mut(j).mapv_inplace(|val| -val);
                }
            }
        }
        Ok((energies, transform, time_overlap))
    }
}

/// Assignment of the previous states (rows) to the current states (columns) that
/// maximizes the sum of the squared overlaps
fn find_order(overlap: ArrayView2<f64>) -> Result<Vec<usize>> {
    let weights: Vec<OrderedFloat<f64>> = overlap.iter().map(|&x| OrderedFloat(x * x)).collect();
    let weights = pfMatrix::square_from_vec(weights)
        .map_err(|err| DynamicsError::LinearAlgebra(format!("state tracking: {:?}", err)))?;
    let (_max_overlap, order) = kuhn_munkres(&weights);
    Ok(order)
}

/// Choose the sign of every column such that its largest component is positive
fn fix_signs(transform: &mut Array2<f64>) {
    for mut column in transform.columns_mut() {
        let mut largest: f64 = 0.0;
        for &val in column.iter() {
            if val.abs() > largest.abs() {
                largest = val;
            }
        }
        if largest < 0.0 {
            column.mapv_inplace(|val| -val);
        }
    }
}

/// Hellmann-Feynman gradients and derivative couplings of the adiabatic states,
/// d_ij = (U^T dH U)_ij / (E_j - E_i) + (U^T D U)_ij
fn adiabatic_couplings(
    diabatic: &DiabaticHamiltonian,
    energies: ArrayView1<f64>,
    transform: ArrayView2<f64>,
    threshold: f64,
    anomalies: &mut Vec<Anomaly>,
) -> (Array2<f64>, Array3<f64>) {
    let nstates: usize = energies.len();
    let ndof: usize = diabatic.ndof();
    let mut gradients: Array2<f64> = Array2::zeros((nstates, ndof));
    let mut couplings: Array3<f64> = Array3::zeros((nstates, nstates, ndof));

    let mut degenerate: Array2<bool> = Array2::from_elem((nstates, nstates), false);
    for i in 0..nstates {
        for j in (i + 1)..nstates {
            let gap: f64 = (energies[j] - energies[i]).abs();
            if gap < threshold {
                degenerate[[i, j]] = true;
                degenerate[[j, i]] = true;
                warn!("{}", Anomaly::NumericalDegeneracy { lower: i, upper: j, gap });
                anomalies.push(Anomaly::NumericalDegeneracy {
                    lower: i,
                    upper: j,
                    gap,
                });
            }
        }
    }

    for k in 0..ndof {
        let dh: Array2<f64> = transform
            .t()
            .dot(&diabatic.gradient.index_axis(Axis(0), k))
            .dot(&transform);
        let dc: Option<Array2<f64>> = diabatic.derivative_couplings.as_ref().map(|dc| {
            transform
                .t()
                .dot(&dc.index_axis(Axis(0), k))
                .dot(&transform)
        });
        for i in 0..nstates {
            gradients[[i, k]] = dh[[i, i]];
            for j in 0..nstates {
                if i == j || degenerate[[i, j]] {
                    continue;
                }
                let mut value: f64 = dh[[i, j]] / (energies[j] - energies[i]);
                if let Some(dc) = dc.as_ref() {
                    value += dc[[i, j]];
                }
                couplings[[i, j, k]] = value;
            }
        }
    }
    (gradients, couplings)
}

/// Map an amplitude vector from one representation into another with the
/// projector of the snapshot. c_adi = U^T S c_dia and c_dia = U c_adi.
pub fn transform_amplitudes(
    amplitudes: ArrayView1<c64>,
    from: Representation,
    to: Representation,
    snapshot: &HamiltonianSnapshot,
) -> Result<Array1<c64>> {
    let nstates: usize = snapshot.nstates();
    DynamicsError::check_dimension("amplitude vector", nstates, amplitudes.len())?;
    DynamicsError::check_dimension("projector rows", nstates, snapshot.transform.nrows())?;
    DynamicsError::check_dimension("projector columns", nstates, snapshot.transform.ncols())?;

    let u: Array2<c64> = snapshot.transform.mapv(c64::from);
    let transformed: Array1<c64> = match (from, to) {
        (Representation::Diabatic, Representation::Adiabatic) => {
            let s: Array2<c64> = snapshot.diabatic.overlap.mapv(c64::from);
            u.t().dot(&s.dot(&amplitudes))
        }
        (Representation::Adiabatic, Representation::Diabatic) => u.dot(&amplitudes),
        _ => amplitudes.to_owned(),
    };
    Ok(transformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::AbsDiffEq;

    pub const EPSILON: f64 = 1e-12;

    fn hamiltonian(h: Array2<f64>) -> DiabaticHamiltonian {
        let n: usize = h.nrows();
        DiabaticHamiltonian::orthonormal(h, Array3::zeros((1, n, n)))
    }

    fn transformer() -> RepresentationTransformer {
        RepresentationTransformer::new(&TrackingConfiguration::default())
    }

    #[test]
    fn identity_as_previous_reproduces_diagonalization() {
        let h: Array2<f64> = array![[-0.01, 0.002], [0.002, 0.01]];
        let (direct, _) = eigh(h.view()).unwrap();

        let identity: Array2<f64> = Array2::eye(2);
        let first = transformer()
            .update(hamiltonian(h.clone()), Some(identity.view()))
            .unwrap();
        assert!(first.energies.abs_diff_eq(&direct, EPSILON));

        let second = transformer()
            .update(hamiltonian(h), Some(first.transform.view()))
            .unwrap();
        assert!(second.energies.abs_diff_eq(&direct, EPSILON));
        assert!(second.transform.abs_diff_eq(&first.transform, EPSILON));
    }

    #[test]
    fn projector_diagonalizes_hamiltonian() {
        let h: Array2<f64> = array![[0.1, 0.02, 0.0], [0.02, -0.05, 0.01], [0.0, 0.01, 0.2]];
        let snapshot = transformer().update(hamiltonian(h.clone()), None).unwrap();
        let adiabatic: Array2<f64> = snapshot.transform.t().dot(&h).dot(&snapshot.transform);
        assert!(adiabatic.abs_diff_eq(&snapshot.adiabatic_hamiltonian(), EPSILON));
    }

    #[test]
    fn largest_component_of_raw_states_is_positive() {
        let h: Array2<f64> = array![[0.0, -0.3], [-0.3, 0.1]];
        let snapshot = transformer().update(hamiltonian(h), None).unwrap();
        for column in snapshot.transform.columns() {
            let largest = column
                .iter()
                .fold(0.0_f64, |acc, &x| if x.abs() > acc.abs() { x } else { acc });
            assert!(largest > 0.0);
        }
    }

    #[test]
    fn phase_follows_previous_step() {
        let h: Array2<f64> = array![[-0.01, 0.002], [0.002, 0.01]];
        let first = transformer().update(hamiltonian(h.clone()), None).unwrap();
        // previous projector with the opposite sign of the lower state
        let mut previous: Array2<f64> = first.transform.clone();
        previous.column_mut(0).mapv_inplace(|x| -x);

        let second = transformer()
            .update(hamiltonian(h), Some(previous.view()))
            .unwrap();
        assert!(second.transform.abs_diff_eq(&previous, EPSILON));
        let st = second.time_overlap.unwrap();
        assert!(st[[0, 0]] > 0.0 && st[[1, 1]] > 0.0);
    }

    #[test]
    fn tracking_follows_the_character_of_the_states() {
        let h: Array2<f64> = array![[-1.0, 0.0], [0.0, 1.0]];
        let swapped: Array2<f64> = array![[0.0, 1.0], [1.0, 0.0]];
        let snapshot = transformer()
            .update(hamiltonian(h.clone()), Some(swapped.view()))
            .unwrap();
        assert!(snapshot.energies.abs_diff_eq(&array![1.0, -1.0], EPSILON));
        assert!(snapshot.transform.abs_diff_eq(&swapped, EPSILON));

        let mut config = TrackingConfiguration::default();
        config.state_tracking = false;
        let untracked = RepresentationTransformer::new(&config)
            .update(hamiltonian(h), Some(swapped.view()))
            .unwrap();
        assert!(untracked.energies.abs_diff_eq(&array![-1.0, 1.0], EPSILON));
    }

    #[test]
    fn equal_overlaps_keep_the_energy_order() {
        // the previous states are rotated by 45 degrees, so both assignments have
        // the same total overlap
        let h: Array2<f64> = array![[-1.0, 0.0], [0.0, 1.0]];
        let c: f64 = 0.5_f64.sqrt();
        let previous: Array2<f64> = array![[c, -c], [c, c]];
        let first = transformer()
            .update(hamiltonian(h.clone()), Some(previous.view()))
            .unwrap();
        let second = transformer()
            .update(hamiltonian(h), Some(previous.view()))
            .unwrap();
        assert!(first.energies.abs_diff_eq(&array![-1.0, 1.0], EPSILON));
        assert_eq!(first.transform, second.transform);
    }

    #[test]
    fn degenerate_states_are_reported_and_decoupled() {
        let h: Array2<f64> = array![[0.5, 0.0], [0.0, 0.5]];
        let gradient: Array3<f64> = array![[[0.1, 0.2], [0.2, -0.1]]];
        let snapshot = transformer()
            .update(DiabaticHamiltonian::orthonormal(h, gradient), None)
            .unwrap();
        assert_eq!(snapshot.anomalies.len(), 1);
        assert!(matches!(
            snapshot.anomalies[0],
            Anomaly::NumericalDegeneracy { lower: 0, upper: 1, .. }
        ));
        assert!(snapshot.derivative_couplings.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn derivative_couplings_are_antisymmetric() {
        let h: Array2<f64> = array![[-0.01, 0.003], [0.003, 0.012]];
        let gradient: Array3<f64> = array![[[0.002, 0.001], [0.001, -0.002]]];
        let snapshot = transformer()
            .update(DiabaticHamiltonian::orthonormal(h, gradient), None)
            .unwrap();
        let d01: f64 = snapshot.derivative_couplings[[0, 1, 0]];
        let d10: f64 = snapshot.derivative_couplings[[1, 0, 0]];
        assert!(d01.abs() > 0.0);
        assert!((d01 + d10).abs() < EPSILON);
    }

    #[test]
    fn non_orthonormal_basis_is_orthogonalized() {
        let h: Array2<f64> = array![[-0.5, 0.1], [0.1, 0.3]];
        let s: Array2<f64> = array![[1.0, 0.2], [0.2, 1.0]];
        let diabatic = DiabaticHamiltonian {
            hamiltonian: h.clone(),
            overlap: s.clone(),
            gradient: Array3::zeros((1, 2, 2)),
            derivative_couplings: None,
        };
        let snapshot = transformer().update(diabatic, None).unwrap();
        let metric: Array2<f64> = snapshot.transform.t().dot(&s).dot(&snapshot.transform);
        assert!(metric.abs_diff_eq(&Array2::eye(2), 1e-10));
        let adiabatic: Array2<f64> = snapshot.transform.t().dot(&h).dot(&snapshot.transform);
        assert!(adiabatic.abs_diff_eq(&snapshot.adiabatic_hamiltonian(), 1e-10));
    }

    #[test]
    fn amplitudes_are_transformed_back_and_forth() {
        let h: Array2<f64> = array![[-0.01, 0.004], [0.004, 0.01]];
        let snapshot = transformer().update(hamiltonian(h), None).unwrap();
        let diabatic: Array1<c64> = array![c64::new(0.6, 0.0), c64::new(0.0, 0.8)];

        let adiabatic = transform_amplitudes(
            diabatic.view(),
            Representation::Diabatic,
            Representation::Adiabatic,
            &snapshot,
        )
        .unwrap();
        let norm: f64 = adiabatic.iter().map(|c| c.norm_sqr()).sum();
        assert!((norm - 1.0).abs() < EPSILON);

        let back = transform_amplitudes(
            adiabatic.view(),
            Representation::Adiabatic,
            Representation::Diabatic,
            &snapshot,
        )
        .unwrap();
        for (a, b) in back.iter().zip(diabatic.iter()) {
            assert!((a - b).norm() < EPSILON);
        }
    }

    #[test]
    fn wrong_amplitude_length_is_a_dimension_mismatch() {
        let h: Array2<f64> = array![[-0.01, 0.004], [0.004, 0.01]];
        let snapshot = transformer().update(hamiltonian(h), None).unwrap();
        let amplitudes: Array1<c64> = Array1::zeros(3);
        let result = transform_amplitudes(
            amplitudes.view(),
            Representation::Diabatic,
            Representation::Adiabatic,
            &snapshot,
        );
        assert!(matches!(result, Err(DynamicsError::DimensionMismatch { .. })));
    }

    #[test]
    fn wrong_previous_projector_is_a_dimension_mismatch() {
        let h: Array2<f64> = array![[-0.01, 0.004], [0.004, 0.01]];
        let previous: Array2<f64> = Array2::eye(3);
        let result = transformer().update(hamiltonian(h), Some(previous.view()));
        assert!(matches!(result, Err(DynamicsError::DimensionMismatch { .. })));
    }
}
