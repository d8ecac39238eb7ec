use crate::types::{EPSILON, MIN_LAMBDA, MIN_RANK1_DIAG};

/// Cholesky decomposition: factor a positive-definite `A` (d*d, row-major)
/// into `L` such that `A = L * L^T`, adding a small regularisation term to
/// the diagonal and substituting `sqrt(lambda)` when a pivot collapses.
pub fn cholesky_decompose(a: &[f64], d: usize, lambda: f64) -> Vec<f64> {
    let safe_lambda = lambda.max(MIN_LAMBDA);
    let mut l = vec![0.0; d * d];

    let mut work = a.to_vec();
    for i in 0..d {
        work[i * d + i] += safe_lambda * EPSILON;
    }

    for i in 0..d {
        for j in 0..=i {
            let mut sum = work[i * d + j];

            for k in 0..j {
                sum -= l[i * d + k] * l[j * d + k];
            }

            if i == j {
                if sum <= 0.0 {
                    l[i * d + i] = safe_lambda.sqrt();
                } else {
                    l[i * d + i] = sum.sqrt();
                }
            } else {
                let diag = l[j * d + j];
                if diag.abs() > EPSILON {
                    l[i * d + j] = sum / diag;
                } else {
                    l[i * d + j] = 0.0;
                }
            }
        }
    }

    l
}

/// Rank-1 Cholesky update via Givens rotation: updates `L` in place so that
/// `L_new * L_new^T = L * L^T + x * x^T` without a full re-decomposition.
/// Returns `false` (caller should fall back to [`cholesky_decompose`]) if the
/// update would leave the factor numerically unstable.
pub fn cholesky_rank1_update(l: &mut [f64], x: &[f64], d: usize, min_diag: f64) -> bool {
    let safe_min_diag = min_diag.max(MIN_RANK1_DIAG);
    let mut x_work = x.to_vec();

    for k in 0..d {
        let l_kk = l[k * d + k];
        let x_k = x_work[k];

        let r = (l_kk * l_kk + x_k * x_k).sqrt();

        if r < safe_min_diag {
            return false;
        }

        let c = l_kk / r;
        let s = x_k / r;

        l[k * d + k] = r;

        for i in (k + 1)..d {
            let l_ik = l[i * d + k];
            let x_i = x_work[i];

            l[i * d + k] = c * l_ik + s * x_i;
            x_work[i] = -s * l_ik + c * x_i;
        }
    }

    for i in 0..d {
        if l[i * d + i] < safe_min_diag || l[i * d + i].is_nan() {
            return false;
        }
    }

    true
}

/// Solve `A * x = b` given the Cholesky factor `L` of `A`.
pub fn solve_cholesky(l: &[f64], b: &[f64], d: usize) -> Vec<f64> {
    let y = solve_triangular_lower(l, b, d);
    solve_triangular_upper_transpose(l, &y, d)
}

/// Forward substitution: solve `L * x = b` for lower-triangular `L`.
pub fn solve_triangular_lower(l: &[f64], b: &[f64], n: usize) -> Vec<f64> {
    let mut x = vec![0.0; n];

    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i * n + j] * x[j];
        }

        let diag = l[i * n + i];
        if diag.abs() > EPSILON {
            x[i] = sum / diag;
        } else {
            x[i] = 0.0;
        }
    }

    x
}

/// Back substitution: solve `L^T * x = b`.
fn solve_triangular_upper_transpose(l: &[f64], b: &[f64], n: usize) -> Vec<f64> {
    let mut x = vec![0.0; n];

    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            sum -= l[j * n + i] * x[j];
        }

        let diag = l[i * n + i];
        if diag.abs() > EPSILON {
            x[i] = sum / diag;
        } else {
            x[i] = 0.0;
        }
    }

    x
}

/// `x^T * A^{-1} * x`, used for the LinUCB confidence term. Since
/// `A^{-1} = L^{-T} L^{-1}`, this equals `||L^{-1} x||^2`.
pub fn compute_quadratic_form(l: &[f64], x: &[f64], d: usize) -> f64 {
    let z = solve_triangular_lower(l, x, d);
    z.iter().map(|&v| v * v).sum()
}

/// Row-major matrix-vector product.
pub fn mat_vec_mul(a: &[f64], x: &[f64], d: usize) -> Vec<f64> {
    let mut result = vec![0.0; d];
    for i in 0..d {
        for j in 0..d {
            result[i] += a[i * d + j] * x[j];
        }
    }
    result
}

pub fn dot_product(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum()
}

/// Outer-product update: `A += x * x^T`.
pub fn rank1_update_matrix(a: &mut [f64], x: &[f64], d: usize) {
    for i in 0..d {
        for j in 0..d {
            a[i * d + j] += x[i] * x[j];
        }
    }
}

/// `a += scale * b`.
pub fn vec_add_scaled(a: &mut [f64], b: &[f64], scale: f64) {
    for (ai, &bi) in a.iter_mut().zip(b.iter()) {
        *ai += scale * bi;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cholesky_of_identity_is_identity() {
        let d = 3;
        let a = vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let l = cholesky_decompose(&a, d, 1.0);
        for i in 0..d {
            assert!((l[i * d + i] - 1.0).abs() < 0.01);
        }
    }

    #[test]
    fn solve_cholesky_recovers_rhs() {
        let d = 2;
        let a = vec![2.0, 1.0, 1.0, 2.0];
        let b = vec![1.0, 2.0];

        let l = cholesky_decompose(&a, d, 0.0);
        let x = solve_cholesky(&l, &b, d);

        let ax = mat_vec_mul(&a, &x, d);
        for i in 0..d {
            assert!((ax[i] - b[i]).abs() < 1e-6);
        }
    }

    #[test]
    fn rank1_update_matches_expected_diagonal() {
        let d = 2;
        let mut l = vec![1.0, 0.0, 0.0, 1.0];
        let x = vec![0.5, 0.5];

        assert!(cholesky_rank1_update(&mut l, &x, d, MIN_RANK1_DIAG));

        let expected_diag = (1.0 + 0.5 * 0.5_f64).sqrt();
        assert!((l[0] - expected_diag).abs() < 0.01);
    }

    #[test]
    fn dot_product_is_correct() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![4.0, 5.0, 6.0];
        assert!((dot_product(&a, &b) - 32.0).abs() < 1e-10);
    }

    #[test]
    fn mat_vec_mul_is_correct() {
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let x = vec![1.0, 2.0];
        let result = mat_vec_mul(&a, &x, 2);
        assert!((result[0] - 5.0).abs() < 1e-10);
        assert!((result[1] - 11.0).abs() < 1e-10);
    }

    #[test]
    fn quadratic_form_against_identity() {
        let d = 2;
        let l = vec![1.0, 0.0, 0.0, 1.0];
        let x = vec![3.0, 4.0];
        assert!((compute_quadratic_form(&l, &x, d) - 25.0).abs() < 1e-10);
    }
}
