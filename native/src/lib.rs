#![deny(clippy::all)]

pub mod actr;
pub mod linucb;
pub mod matrix;
pub mod sanitize;
pub mod thompson;
pub mod types;

pub use actr::{
    compute_activation, compute_optimal_interval, compute_recall_probability, ActivationResult,
    ActrModel, IntervalPrediction, MemoryTrace, RecallPrediction,
};
pub use linucb::{get_cold_start_alpha, BestSelection, LinUcbModel, UcbStats};
pub use thompson::{
    ActionSelection, BetaParams, ThompsonModel, ThompsonSamplingOptions, ThompsonSnapshot,
};
pub use types::*;
