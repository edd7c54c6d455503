use crate::c64;
use crate::error::{DynamicsError, Result};
use itertools::Itertools;
use nalgebra::{DMatrix, Scalar, SymmetricEigen};
use ndarray::prelude::*;

/// Copy an ndarray matrix into a nalgebra matrix
pub fn to_dmatrix<T: Scalar>(arr: ArrayView2<T>) -> DMatrix<T> {
    DMatrix::from_fn(arr.nrows(), arr.ncols(), |i, j| arr[[i, j]].clone())
}

/// Copy a nalgebra matrix into an ndarray matrix
pub fn to_array2<T: Scalar>(mat: &DMatrix<T>) -> Array2<T> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)].clone())
}

pub fn to_complex(arr: ArrayView2<f64>) -> Array2<c64> {
    arr.mapv(c64::from)
}

/// Populations |c_i|^2 of an amplitude vector
pub fn populations(amplitudes: ArrayView1<c64>) -> Array1<f64> {
    amplitudes.mapv(|val| val.norm_sqr())
}

fn check_square(context: &'static str, dim: (usize, usize)) -> Result<usize> {
    DynamicsError::check_dimension(context, dim.0, dim.1)?;
    Ok(dim.0)
}

/// Eigenpairs of a real symmetric matrix in ascending order of the eigenvalues.
/// Equal eigenvalues keep the order of the solver, so the result is deterministic.
pub fn eigh(matrix: ArrayView2<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
    let n: usize = check_square("symmetric eigenproblem", matrix.dim())?;
    let eig = SymmetricEigen::try_new(to_dmatrix(matrix), f64::EPSILON, 0).ok_or_else(|| {
        DynamicsError::LinearAlgebra(String::from("symmetric eigensolver did not converge"))
    })?;
    let order: Vec<usize> = (0..n)
        .sorted_by(|&i, &j| eig.eigenvalues[i].total_cmp(&eig.eigenvalues[j]))
        .collect();

    let values: Array1<f64> = Array1::from_shape_fn(n, |k| eig.eigenvalues[order[k]]);
    let vectors: Array2<f64> =
        Array2::from_shape_fn((n, n), |(i, k)| eig.eigenvectors[(i, order[k])]);
    Ok((values, vectors))
}

/// Eigenpairs of a complex Hermitian matrix in ascending order of the eigenvalues
pub fn eigh_hermitian(matrix: ArrayView2<c64>) -> Result<(Array1<f64>, Array2<c64>)> {
    let n: usize = check_square("hermitian eigenproblem", matrix.dim())?;
    let eig = SymmetricEigen::try_new(to_dmatrix(matrix), f64::EPSILON, 0).ok_or_else(|| {
        DynamicsError::LinearAlgebra(String::from("hermitian eigensolver did not converge"))
    })?;
    let order: Vec<usize> = (0..n)
        .sorted_by(|&i, &j| eig.eigenvalues[i].total_cmp(&eig.eigenvalues[j]))
        .collect();

    let values: Array1<f64> = Array1::from_shape_fn(n, |k| eig.eigenvalues[order[k]]);
    let vectors: Array2<c64> =
        Array2::from_shape_fn((n, n), |(i, k)| eig.eigenvectors[(i, order[k])]);
    Ok((values, vectors))
}

/// Time evolution operator exp(-i H dt) of a Hermitian matrix H
pub fn propagator(hamiltonian: ArrayView2<c64>, dt: f64) -> Result<Array2<c64>> {
    let (values, vectors): (Array1<f64>, Array2<c64>) = eigh_hermitian(hamiltonian)?;
    let phases: Array1<c64> = values.mapv(|val| c64::new(0.0, -val * dt).exp());
    // multiply every eigenvector with its phase factor
    let scaled: Array2<c64> = &vectors * &phases;
    Ok(scaled.dot(&vectors.t().mapv(|val| val.conj())))
}

/// Inverse square root of a symmetric positive definite matrix, used for the
/// Loewdin orthogonalization
pub fn inverse_sqrt(matrix: ArrayView2<f64>) -> Result<Array2<f64>> {
    let (values, vectors): (Array1<f64>, Array2<f64>) = eigh(matrix)?;
    if values.iter().any(|&val| val <= f64::EPSILON) {
        return Err(DynamicsError::LinearAlgebra(format!(
            "matrix is not positive definite, eigenvalues: {}",
            values
        )));
    }
    let scaled: Array2<f64> = &vectors * &values.mapv(|val| 1.0 / val.sqrt());
    Ok(scaled.dot(&vectors.t()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::AbsDiffEq;

    pub const EPSILON: f64 = 1e-12;

    #[test]
    fn eigh_is_sorted_and_diagonalizes() {
        let matrix: Array2<f64> = array![[0.3, 0.1, 0.0], [0.1, -0.2, 0.05], [0.0, 0.05, 0.1]];
        let (values, vectors) = eigh(matrix.view()).unwrap();

        assert!(values[0] <= values[1] && values[1] <= values[2]);
        let diagonal: Array2<f64> = vectors.t().dot(&matrix).dot(&vectors);
        assert!(
            diagonal.abs_diff_eq(&Array2::from_diag(&values), EPSILON),
            "U^T H U: {}",
            diagonal
        );
    }

    #[test]
    fn propagator_is_unitary() {
        let hamiltonian: Array2<c64> = array![
            [c64::new(0.01, 0.0), c64::new(0.0, -0.002)],
            [c64::new(0.0, 0.002), c64::new(-0.01, 0.0)]
        ];
        let u: Array2<c64> = propagator(hamiltonian.view(), 10.0).unwrap();
        let product: Array2<c64> = u.t().mapv(|val| val.conj()).dot(&u);
        for ((i, j), val) in product.indexed_iter() {
            let expected: f64 = if i == j { 1.0 } else { 0.0 };
            assert!((val.re - expected).abs() < EPSILON && val.im.abs() < EPSILON);
        }
    }

    #[test]
    fn propagator_of_diagonal_matrix() {
        let hamiltonian: Array2<c64> = Array2::from_diag(&array![c64::from(0.5), c64::from(-0.25)]);
        let u: Array2<c64> = propagator(hamiltonian.view(), 2.0).unwrap();
        assert!((u[[0, 0]] - c64::new(0.0, -1.0).exp()).norm() < EPSILON);
        assert!((u[[1, 1]] - c64::new(0.0, 0.5).exp()).norm() < EPSILON);
        assert!(u[[0, 1]].norm() < EPSILON);
    }

    #[test]
    fn inverse_sqrt_of_diagonal_matrix() {
        let matrix: Array2<f64> = array![[4.0, 0.0], [0.0, 9.0]];
        let result: Array2<f64> = inverse_sqrt(matrix.view()).unwrap();
        assert!(result.abs_diff_eq(&array![[0.5, 0.0], [0.0, 1.0 / 3.0]], EPSILON));
    }

    #[test]
    fn inverse_sqrt_rejects_singular_matrix() {
        let matrix: Array2<f64> = array![[1.0, 1.0], [1.0, 1.0]];
        assert!(inverse_sqrt(matrix.view()).is_err());
    }

    #[test]
    fn non_square_matrix_is_a_dimension_mismatch() {
        let matrix: Array2<f64> = Array2::zeros((2, 3));
        assert!(matches!(
            eigh(matrix.view()),
            Err(DynamicsError::DimensionMismatch { .. })
        ));
    }
}
