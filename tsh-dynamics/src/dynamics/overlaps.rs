use crate::dynamics::representation::HamiltonianSnapshot;
use crate::error::{DynamicsError, Result};
use ndarray::prelude::*;

/// Overlap of the adiabatic states of two steps, St_ij = <i(t-dt)|j(t)> = (U_prev^T S U)_ij
pub fn overlap_matrix(
    previous_transform: ArrayView2<f64>,
    overlap: ArrayView2<f64>,
    transform: ArrayView2<f64>,
) -> Array2<f64> {
    previous_transform.t().dot(&overlap.dot(&transform))
}

/// Time overlap between the adiabatic states described by `previous_transform`
/// and the states of the snapshot.
pub fn time_overlap(
    previous_transform: ArrayView2<f64>,
    snapshot: &HamiltonianSnapshot,
) -> Result<Array2<f64>> {
    let nstates: usize = snapshot.nstates();
    DynamicsError::check_dimension("previous projector rows", nstates, previous_transform.nrows())?;
    DynamicsError::check_dimension(
        "previous projector columns",
        nstates,
        previous_transform.ncols(),
    )?;
    Ok(overlap_matrix(
        previous_transform,
        snapshot.diabatic.overlap.view(),
        snapshot.transform.view(),
    ))
}

/// Time overlap with the projector the snapshot was tracked against. Without a
/// previous projector the diabatic basis itself is the reference.
pub fn time_overlap_internal(snapshot: &HamiltonianSnapshot) -> Array2<f64> {
    match snapshot.previous_transform.as_ref() {
        Some(previous) => overlap_matrix(
            previous.view(),
            snapshot.diabatic.overlap.view(),
            snapshot.transform.view(),
        ),
        None => {
            let identity: Array2<f64> = Array2::eye(snapshot.nstates());
            overlap_matrix(
                identity.view(),
                snapshot.diabatic.overlap.view(),
                snapshot.transform.view(),
            )
        }
    }
}

/// Nonadiabatic coupling in time at the midpoint of the interval from the time
/// overlap, NACT = (St - St^T) / (2 dt), see S. Hammes-Schiffer, J. C. Tully,
/// J. Chem. Phys. 101, 4657 (1994)
pub fn nact_from_overlap(time_overlap: ArrayView2<f64>, dt: f64) -> Array2<f64> {
    (&time_overlap - &time_overlap.t()) / (2.0 * dt)
}
