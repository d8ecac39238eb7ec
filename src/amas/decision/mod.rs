#![allow(dead_code)]

pub mod actr;
pub mod coldstart;
pub mod ensemble;
pub mod heuristic;
pub mod linucb;
pub mod thompson;

pub use actr::ActrLearner;
pub use coldstart::ColdStartManager;
pub use ensemble::{EnsembleDecision, EnsembleOutput, EnsembleWeights};
#[allow(unused_imports)]
pub use heuristic::HeuristicLearner;
pub use linucb::LinUcbLearner;
pub use thompson::ThompsonLearner;
