//! Least squares for the counterfactual regression.
//!
//! The estimator solves one small problem per fit:
//!
//! ```text
//! minimize Σ (y_t - x_t^T β)^2     over pre-period rows t
//! ```
//!
//! where `x_t = [1, control_1(t), ..., control_k(t)]`. The residual bootstrap
//! re-solves the same design with resampled responses many times.
//!
//! We use SVD: the design is tall (more rows than columns) and controls in
//! real exports are often nearly collinear, which SVD tolerates by truncating
//! small singular values. (Nalgebra's `QR::solve` is intended for square
//! systems and panics on non-square matrices.)

use nalgebra::{DMatrix, DVector};

/// Design matrix with a leading intercept column, restricted to `rows`.
///
/// `columns` are full-length series; `rows` index into them.
pub fn intercept_design(columns: &[&[f64]], rows: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), columns.len() + 1, |r, c| {
        if c == 0 { 1.0 } else { columns[c - 1][rows[r]] }
    })
}

/// Solve a least squares problem using SVD.
///
/// Returns `None` if no tolerance yields a finite solution.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Progressively looser tolerances for near-singular designs.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}
