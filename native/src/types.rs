use serde::{Deserialize, Serialize};

/// Canonical context-vector dimension for the decision bandit (see amas::feature).
pub const FEATURE_DIMENSION: usize = 22;
pub const MIN_LAMBDA: f64 = 1e-3;
pub const MIN_RANK1_DIAG: f64 = 1e-6;
pub const MAX_COVARIANCE: f64 = 1e9;
pub const MAX_FEATURE_ABS: f64 = 50.0;
pub const EPSILON: f64 = 1e-10;
pub const CHOLESKY_RECOMPUTE_INTERVAL: u32 = 200;

/// Raw LinUCB matrix storage: `A` (d*d, row-major), `b` (d), and the cached
/// Cholesky factor `L` of `A` so repeated UCB scoring doesn't re-decompose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanditModel {
    pub a_matrix: Vec<f64>,
    pub b: Vec<f64>,
    pub l_matrix: Vec<f64>,
    pub lambda: f64,
    pub alpha: f64,
    pub d: u32,
    pub update_count: u32,
}

impl BanditModel {
    pub fn new(d: usize, lambda: f64, alpha: f64) -> Self {
        let mut a_matrix = vec![0.0; d * d];
        let mut l_matrix = vec![0.0; d * d];
        for i in 0..d {
            a_matrix[i * d + i] = lambda.max(MIN_LAMBDA);
            l_matrix[i * d + i] = lambda.max(MIN_LAMBDA).sqrt();
        }
        Self {
            a_matrix,
            b: vec![0.0; d],
            l_matrix,
            lambda: lambda.max(MIN_LAMBDA),
            alpha,
            d: d as u32,
            update_count: 0,
        }
    }
}

/// Health snapshot of a bandit model's linear-algebra state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticResult {
    pub is_healthy: bool,
    pub has_nan: bool,
    pub has_inf: bool,
    pub condition_number: f64,
    pub min_diagonal: f64,
    pub max_diagonal: f64,
    pub message: String,
}
