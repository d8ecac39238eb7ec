use std::collections::VecDeque;

use crate::amas::config::TrendParams;
use crate::amas::types::{TrendLabel, TrendState};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

struct Sample {
    ts: i64,
    ability: f64,
}

pub struct TrendAnalyzer {
    params: TrendParams,
    history: VecDeque<Sample>,
    current_trend: TrendState,
}

impl TrendAnalyzer {
    pub fn new(params: TrendParams) -> Self {
        let capacity = params.window_size.max(8);
        Self {
            params,
            history: VecDeque::with_capacity(capacity),
            current_trend: TrendState::default(),
        }
    }

    pub fn update(&mut self, ts: i64, ability: f64) -> TrendState {
        self.history.push_back(Sample { ts, ability });

        while self.history.len() > self.params.window_size {
            self.history.pop_front();
        }
        let cutoff = ts - (self.params.window_days * MILLIS_PER_DAY) as i64;
        while self.history.front().is_some_and(|s| s.ts < cutoff) {
            self.history.pop_front();
        }

        if self.history.len() < 5 {
            self.current_trend = TrendState::default();
            return self.current_trend.clone();
        }

        let (slope_per_day, confidence) = self.compute_slope();
        let variance = self.compute_variance();

        let label = if slope_per_day > self.params.up_threshold {
            TrendLabel::Up
        } else if slope_per_day < self.params.down_threshold {
            TrendLabel::Down
        } else if variance < self.params.stuck_variance_threshold
            && slope_per_day.abs() <= self.params.up_threshold
        {
            TrendLabel::Stuck
        } else {
            TrendLabel::Flat
        };

        self.current_trend = TrendState {
            label,
            slope_per_day,
            confidence,
        };
        self.current_trend.clone()
    }

    pub fn current(&self) -> TrendState {
        self.current_trend.clone()
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.current_trend = TrendState::default();
    }

    /// Linear regression of ability against elapsed days since the oldest
    /// retained sample. Confidence is the sample count scaled into [0, 1]
    /// against the window capacity, penalised by residual scatter.
    fn compute_slope(&self) -> (f64, f64) {
        let n = self.history.len() as f64;
        let first_ts = self.history.front().unwrap().ts;

        let xs: Vec<f64> = self
            .history
            .iter()
            .map(|s| (s.ts - first_ts) as f64 / MILLIS_PER_DAY)
            .collect();
        let ys: Vec<f64> = self.history.iter().map(|s| s.ability).collect();

        let sum_x: f64 = xs.iter().sum();
        let sum_y: f64 = ys.iter().sum();
        let sum_xy: f64 = xs.iter().zip(&ys).map(|(x, y)| x * y).sum();
        let sum_xx: f64 = xs.iter().map(|x| x * x).sum();

        let denominator = n * sum_xx - sum_x * sum_x;
        if denominator.abs() < 1e-10 {
            return (0.0, 0.0);
        }

        let slope = (n * sum_xy - sum_x * sum_y) / denominator;
        let intercept = (sum_y - slope * sum_x) / n;

        let residual_var = xs
            .iter()
            .zip(&ys)
            .map(|(x, y)| {
                let predicted = intercept + slope * x;
                (y - predicted).powi(2)
            })
            .sum::<f64>()
            / n;

        let sample_confidence = (n / self.params.window_size as f64).min(1.0);
        let fit_confidence = 1.0 / (1.0 + residual_var * 10.0);
        let confidence = (sample_confidence * fit_confidence).clamp(0.0, 1.0);

        (slope, confidence)
    }

    fn compute_variance(&self) -> f64 {
        let n = self.history.len() as f64;
        let mean = self.history.iter().map(|s| s.ability).sum::<f64>() / n;
        self.history
            .iter()
            .map(|s| (s.ability - mean).powi(2))
            .sum::<f64>()
            / n
    }
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self::new(TrendParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn days(n: i64) -> i64 {
        n * 86_400_000
    }

    #[test]
    fn insufficient_history_stays_flat() {
        let mut analyzer = TrendAnalyzer::default();
        let trend = analyzer.update(0, 0.5);
        assert_eq!(trend.label, TrendLabel::Flat);
    }

    #[test]
    fn rising_ability_detected_as_up() {
        let mut analyzer = TrendAnalyzer::default();
        let mut trend = TrendState::default();
        for i in 0..10 {
            trend = analyzer.update(days(i), 0.3 + 0.03 * i as f64);
        }
        assert_eq!(trend.label, TrendLabel::Up);
        assert!(trend.slope_per_day > 0.0);
    }

    #[test]
    fn falling_ability_detected_as_down() {
        let mut analyzer = TrendAnalyzer::default();
        let mut trend = TrendState::default();
        for i in 0..10 {
            trend = analyzer.update(days(i), 0.8 - 0.02 * i as f64);
        }
        assert_eq!(trend.label, TrendLabel::Down);
        assert!(trend.slope_per_day < 0.0);
    }

    #[test]
    fn flat_noisy_ability_not_stuck() {
        let mut analyzer = TrendAnalyzer::default();
        let mut trend = TrendState::default();
        let values = [0.5, 0.7, 0.3, 0.6, 0.4, 0.65, 0.35, 0.55, 0.45, 0.5];
        for (i, v) in values.iter().enumerate() {
            trend = analyzer.update(days(i as i64), *v);
        }
        assert_ne!(trend.label, TrendLabel::Stuck);
    }

    #[test]
    fn samples_outside_window_days_are_pruned() {
        let params = TrendParams {
            window_days: 5.0,
            ..TrendParams::default()
        };
        let mut analyzer = TrendAnalyzer::new(params);
        for i in 0..5 {
            analyzer.update(days(i), 0.5);
        }
        analyzer.update(days(30), 0.9);
        assert!(analyzer.history.len() <= 2);
    }
}
