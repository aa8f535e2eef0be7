use faer::{Mat, Side, linalg::solvers::DenseSolveCore};
use faer_ext::{IntoFaer, IntoNalgebra};
use log::debug;
use nalgebra::{DMatrix, DVector};

/// Relative threshold below which the information matrix is treated as singular.
const SINGULAR_EPS: f64 = 1e-12;

/// Converts a matrix of level indices into the real valued model matrix.
pub fn model_matrix(x: &DMatrix<usize>) -> DMatrix<f64> {
    x.map(|v| v as f64)
}

/// Returns the information matrix $X^T X$.
pub fn information_matrix(x: &DMatrix<usize>) -> DMatrix<f64> {
    let x = model_matrix(x);
    x.tr_mul(&x)
}

/// Returns the determinant of the information matrix.
pub fn information_determinant(x: &DMatrix<usize>) -> f64 {
    let xtx = information_matrix(x);
    if xtx.is_empty() {
        return 0.;
    }
    to_faer(&xtx).determinant()
}

/// Returns the inverse of the information matrix. In case the matrix is (numerically) singular,
/// the Moore-Penrose pseudo-inverse is returned instead.
pub fn information_inverse(x: &DMatrix<usize>) -> DMatrix<f64> {
    let xtx = information_matrix(x);
    let k = xtx.nrows();
    if k == 0 {
        return xtx;
    }
    let fxtx = to_faer(&xtx);
    let det = fxtx.determinant();
    if !is_singular(&xtx, det) {
        let inv: Mat<f64> = fxtx.lblt(Side::Lower).inverse();
        let inv = inv.as_ref().into_nalgebra().into_owned();
        if inv.iter().all(|v| v.is_finite()) {
            return inv;
        }
    }
    debug!("information matrix is singular (det = {det:e}), falling back to pseudo-inverse");
    xtx.pseudo_inverse(SINGULAR_EPS)
        .unwrap_or_else(|_| DMatrix::zeros(k, k))
}

/// Returns the determinant of the information matrix after replacing design row `old` by `new`,
/// given the information matrix `xtx` of the current design. Numerically singular results are
/// returned as zero.
pub(crate) fn swapped_information_determinant(
    xtx: &DMatrix<f64>,
    old: &[usize],
    new: &[usize],
) -> f64 {
    let old = DVector::from_iterator(old.len(), old.iter().map(|&v| v as f64));
    let new = DVector::from_iterator(new.len(), new.iter().map(|&v| v as f64));
    let swapped = xtx - &old * old.transpose() + &new * new.transpose();
    if swapped.is_empty() {
        return 0.;
    }
    let det = to_faer(&swapped).determinant();
    if is_singular(&swapped, det) { 0. } else { det }
}

fn is_singular(xtx: &DMatrix<f64>, det: f64) -> bool {
    let scale = xtx.diagonal().iter().map(|v| v.abs()).fold(1., f64::max);
    det.abs() <= SINGULAR_EPS * scale.powi(xtx.nrows() as i32)
}

fn to_faer(m: &DMatrix<f64>) -> Mat<f64> {
    m.view_range(.., ..).into_faer().to_owned()
}
