#![allow(dead_code)]

pub mod attention;
pub mod cognitive;
pub mod fatigue;
pub mod fatigue_fusion;
pub mod motivation;
pub mod trend;

pub use attention::AttentionMonitor;
pub use cognitive::CognitiveProfiler;
pub use fatigue::FatigueEstimator;
pub use fatigue_fusion::FatigueFusionEngine;
pub use motivation::MotivationTracker;
pub use trend::TrendAnalyzer;
