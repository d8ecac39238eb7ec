use crate::types::{
    DiagnosticResult, CHOLESKY_RECOMPUTE_INTERVAL, EPSILON, MAX_COVARIANCE, MAX_FEATURE_ABS,
    MIN_LAMBDA, MIN_RANK1_DIAG,
};

/// True if any element is NaN or infinite.
pub fn has_invalid_values(arr: &[f64]) -> bool {
    arr.iter().any(|&x| x.is_nan() || x.is_infinite())
}

/// Replace NaN/Inf with zero and clamp magnitude, in place.
pub fn sanitize_feature_vector(x: &mut [f64]) {
    for val in x.iter_mut() {
        if val.is_nan() || val.is_infinite() {
            *val = 0.0;
        } else {
            *val = (*val).clamp(-MAX_FEATURE_ABS, MAX_FEATURE_ABS);
        }
    }
}

/// Restore a covariance matrix's numerical invariants in place: no NaN/Inf,
/// diagonal floor of `lambda`, magnitude capped, and symmetry enforced.
pub fn sanitize_covariance(a: &mut [f64], d: usize, lambda: f64) {
    let safe_lambda = lambda.max(MIN_LAMBDA);

    for i in 0..d {
        for j in 0..d {
            let idx = i * d + j;
            let val = a[idx];

            if val.is_nan() || val.is_infinite() {
                a[idx] = if i == j { safe_lambda } else { 0.0 };
                continue;
            }

            if val.abs() > MAX_COVARIANCE {
                a[idx] = val.signum() * MAX_COVARIANCE;
            }
        }

        let diag_idx = i * d + i;
        if a[diag_idx] < safe_lambda {
            a[diag_idx] = safe_lambda;
        }
    }

    for i in 0..d {
        for j in (i + 1)..d {
            let avg = (a[i * d + j] + a[j * d + i]) / 2.0;
            a[i * d + j] = avg;
            a[j * d + i] = avg;
        }
    }
}

/// Whether the Cholesky factor should be fully recomputed rather than
/// incrementally updated: periodic forced recompute, or the factor has
/// drifted (NaN/Inf/too-small diagonal, or an ill-conditioned estimate).
pub fn needs_full_recompute(update_count: u32, l: &[f64], d: usize) -> bool {
    if update_count.is_multiple_of(CHOLESKY_RECOMPUTE_INTERVAL) {
        return true;
    }

    for i in 0..d {
        let diag = l[i * d + i];
        if diag.is_nan() || diag.is_infinite() || diag < MIN_RANK1_DIAG {
            return true;
        }
    }

    let mut min_diag = f64::MAX;
    let mut max_diag = f64::MIN;
    for i in 0..d {
        let diag = l[i * d + i];
        if diag > 0.0 {
            min_diag = min_diag.min(diag);
            max_diag = max_diag.max(diag);
        }
    }

    if min_diag > 0.0 {
        let cond_estimate = max_diag / min_diag;
        if cond_estimate > 1e8 {
            return true;
        }
    }

    false
}

/// Diagnose a bandit model's `(A, L)` pair for operational visibility.
pub fn diagnose_model(a: &[f64], l: &[f64], d: usize) -> DiagnosticResult {
    let mut has_nan = false;
    let mut has_inf = false;
    let mut min_diagonal = f64::MAX;
    let mut max_diagonal = f64::MIN;

    for val in a.iter() {
        if val.is_nan() {
            has_nan = true;
        }
        if val.is_infinite() {
            has_inf = true;
        }
    }

    for i in 0..d {
        let diag = l[i * d + i];
        if diag.is_nan() {
            has_nan = true;
        }
        if diag.is_infinite() {
            has_inf = true;
        }
        if diag > 0.0 && !diag.is_nan() && !diag.is_infinite() {
            min_diagonal = min_diagonal.min(diag);
            max_diagonal = max_diagonal.max(diag);
        }
    }

    let condition_number = if min_diagonal > EPSILON {
        (max_diagonal / min_diagonal).powi(2)
    } else {
        f64::MAX
    };

    let is_healthy = !has_nan && !has_inf && condition_number < 1e12;

    let message = if is_healthy {
        "Model is healthy".to_string()
    } else if has_nan {
        "Model contains NaN values".to_string()
    } else if has_inf {
        "Model contains infinite values".to_string()
    } else {
        format!("Model has high condition number: {:.2e}", condition_number)
    };

    DiagnosticResult {
        is_healthy,
        has_nan,
        has_inf,
        condition_number,
        min_diagonal: if min_diagonal == f64::MAX { 0.0 } else { min_diagonal },
        max_diagonal: if max_diagonal == f64::MIN { 0.0 } else { max_diagonal },
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_values_detected() {
        assert!(!has_invalid_values(&[1.0, 2.0, 3.0]));
        assert!(!has_invalid_values(&[]));
        assert!(has_invalid_values(&[1.0, f64::NAN, 3.0]));
        assert!(has_invalid_values(&[f64::INFINITY, f64::NEG_INFINITY]));
    }

    #[test]
    fn sanitize_feature_vector_normal_values_unchanged() {
        let mut x = vec![1.0, 2.0, 3.0, -1.0];
        sanitize_feature_vector(&mut x);
        assert_eq!(x, vec![1.0, 2.0, 3.0, -1.0]);
    }

    #[test]
    fn sanitize_feature_vector_replaces_nan_and_inf() {
        let mut x = vec![1.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY];
        sanitize_feature_vector(&mut x);
        assert_eq!(x, vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn sanitize_feature_vector_clips_magnitude() {
        let mut x = vec![1.0, 100.0, -100.0, MAX_FEATURE_ABS + 10.0];
        sanitize_feature_vector(&mut x);
        assert_eq!(x[0], 1.0);
        assert_eq!(x[1], MAX_FEATURE_ABS);
        assert_eq!(x[2], -MAX_FEATURE_ABS);
        assert_eq!(x[3], MAX_FEATURE_ABS);
    }

    #[test]
    fn sanitize_covariance_leaves_valid_matrix_unchanged() {
        let mut a = vec![2.0, 0.5, 0.3, 0.5, 2.0, 0.4, 0.3, 0.4, 2.0];
        let original = a.clone();
        sanitize_covariance(&mut a, 3, 1.0);
        assert_eq!(a, original);
    }

    #[test]
    fn sanitize_covariance_fixes_nan_diagonal() {
        let mut a = vec![f64::NAN, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0];
        sanitize_covariance(&mut a, 3, 1.0);
        assert_eq!(a[0], 1.0);
    }

    #[test]
    fn sanitize_covariance_fixes_nan_off_diagonal() {
        let mut a = vec![2.0, f64::NAN, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0];
        sanitize_covariance(&mut a, 3, 1.0);
        assert_eq!(a[1], 0.0);
        assert_eq!(a[3], 0.0);
    }

    #[test]
    fn sanitize_covariance_caps_magnitude() {
        let mut a = vec![2e9, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, -2e9];
        sanitize_covariance(&mut a, 3, 1.0);
        assert!(a[0] <= MAX_COVARIANCE);
        assert!(a[8] >= MIN_LAMBDA);
    }

    #[test]
    fn sanitize_covariance_raises_small_diagonal() {
        let mut a = vec![0.0001, 0.0, 0.0, 0.0, 0.0001, 0.0, 0.0, 0.0, 0.0001];
        sanitize_covariance(&mut a, 3, 1.0);
        assert!(a[0] >= 1.0 && a[4] >= 1.0 && a[8] >= 1.0);
    }

    #[test]
    fn sanitize_covariance_enforces_symmetry() {
        let mut a = vec![2.0, 0.6, 0.0, 0.4, 2.0, 0.0, 0.0, 0.0, 2.0];
        sanitize_covariance(&mut a, 3, 1.0);
        assert_eq!(a[1], 0.5);
        assert_eq!(a[3], 0.5);
    }

    #[test]
    fn needs_full_recompute_on_period() {
        let l = vec![1.0, 0.0, 0.0, 1.0];
        assert!(needs_full_recompute(CHOLESKY_RECOMPUTE_INTERVAL, &l, 2));
        assert!(needs_full_recompute(0, &l, 2));
        assert!(!needs_full_recompute(CHOLESKY_RECOMPUTE_INTERVAL - 1, &l, 2));
    }

    #[test]
    fn needs_full_recompute_on_bad_diagonal() {
        assert!(needs_full_recompute(50, &[f64::NAN, 0.0, 0.0, 1.0], 2));
        assert!(needs_full_recompute(50, &[1e-8, 0.0, 0.0, 1.0], 2));
    }

    #[test]
    fn needs_full_recompute_on_ill_conditioned() {
        assert!(needs_full_recompute(50, &[1e-4, 0.0, 0.0, 1e5], 2));
        assert!(!needs_full_recompute(50, &[1.0, 0.0, 0.0, 0.5, 1.0, 0.0, 0.3, 0.2, 1.0], 3));
    }

    #[test]
    fn diagnose_model_reports_healthy() {
        let a = vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let l = a.clone();
        let result = diagnose_model(&a, &l, 3);
        assert!(result.is_healthy);
        assert_eq!(result.condition_number, 1.0);
    }

    #[test]
    fn diagnose_model_reports_nan() {
        let a = vec![f64::NAN, 0.0, 0.0, 1.0];
        let l = vec![1.0, 0.0, 0.0, 1.0];
        let result = diagnose_model(&a, &l, 2);
        assert!(!result.is_healthy);
        assert!(result.has_nan);
    }

    #[test]
    fn diagnose_model_reports_high_condition_number() {
        let a = vec![1.0, 0.0, 0.0, 1.0];
        let l = vec![1e-7, 0.0, 0.0, 1.0];
        let result = diagnose_model(&a, &l, 2);
        assert!(!result.is_healthy);
        assert!(result.condition_number > 1e12);
    }
}
