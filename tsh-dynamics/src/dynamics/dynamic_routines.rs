use crate::initialization::NuclearState;
use ndarray::prelude::*;

/// Half step of the momenta in the velocity Verlet scheme, p += dt/2 F
pub fn half_kick(nuclear: &mut NuclearState, forces: ArrayView1<f64>, dt: f64) {
    nuclear.momenta.scaled_add(0.5 * dt, &forces);
}

/// Full step of the positions with the current momenta, q += dt p / m
pub fn drift(nuclear: &mut NuclearState, dt: f64) {
    let velocities: Array1<f64> = nuclear.velocities();
    nuclear.positions.scaled_add(dt, &velocities);
}

/// Remove the momentum of frozen degrees of freedom
pub fn zero_constrained(nuclear: &mut NuclearState, constrained_dofs: &[usize]) {
    for &dof in constrained_dofs.iter() {
        nuclear.momenta[dof] = 0.0;
    }
}

/// Number of degrees of freedom that carry kinetic energy
pub fn free_dofs(ndof: usize, constrained_dofs: &[usize]) -> usize {
    let mut constrained: Vec<usize> = constrained_dofs.to_vec();
    constrained.sort_unstable();
    constrained.dedup();
    ndof.saturating_sub(constrained.len())
}
