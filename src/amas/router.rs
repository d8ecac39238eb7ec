//! Smart router (§4.i): dispatches each algorithm call to its native
//! (`amas-native`) implementation when healthy, and trips to a pure-Rust
//! fallback per circuit-breaker semantics when the native path is
//! erroring or disabled outright.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

const WINDOW_SIZE: usize = 20;
const FAILURE_RATE_THRESHOLD: f64 = 0.5;
const OPEN_TIMEOUT: Duration = Duration::from_secs(60);
const HALF_OPEN_PROBE_LIMIT: u32 = 3;
const HALF_OPEN_SUCCESS_TO_CLOSE: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

struct CircuitBreaker {
    state: CircuitState,
    outcomes: VecDeque<bool>,
    opened_at: Option<Instant>,
    half_open_attempts: u32,
    half_open_successes: u32,
}

impl CircuitBreaker {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            outcomes: VecDeque::with_capacity(WINDOW_SIZE),
            opened_at: None,
            half_open_attempts: 0,
            half_open_successes: 0,
        }
    }

    /// Whether a native call should even be attempted right now. Advances
    /// Open -> HalfOpen once the timeout has elapsed.
    fn should_attempt_native(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => self.half_open_attempts < HALF_OPEN_PROBE_LIMIT,
            CircuitState::Open => {
                if self.opened_at.is_some_and(|at| at.elapsed() >= OPEN_TIMEOUT) {
                    self.state = CircuitState::HalfOpen;
                    self.half_open_attempts = 0;
                    self.half_open_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record(&mut self, success: bool) {
        match self.state {
            CircuitState::HalfOpen => {
                self.half_open_attempts += 1;
                if success {
                    self.half_open_successes += 1;
                    if self.half_open_successes >= HALF_OPEN_SUCCESS_TO_CLOSE {
                        self.state = CircuitState::Closed;
                        self.outcomes.clear();
                        self.opened_at = None;
                    }
                } else {
                    self.trip();
                }
            }
            CircuitState::Closed => {
                self.outcomes.push_back(success);
                if self.outcomes.len() > WINDOW_SIZE {
                    self.outcomes.pop_front();
                }
                if self.outcomes.len() == WINDOW_SIZE {
                    let failures = self.outcomes.iter().filter(|ok| !**ok).count();
                    let failure_rate = failures as f64 / WINDOW_SIZE as f64;
                    if failure_rate >= FAILURE_RATE_THRESHOLD {
                        self.trip();
                    }
                }
            }
            CircuitState::Open => {}
        }
    }

    fn trip(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.outcomes.clear();
    }
}

/// Selects between a native and fallback implementation per call, keyed
/// by method name, so a failing native path for one algorithm doesn't
/// take down the others.
pub struct SmartRouter {
    use_native: bool,
    breakers: HashMap<String, CircuitBreaker>,
}

impl SmartRouter {
    pub fn new(use_native: bool) -> Self {
        Self {
            use_native,
            breakers: HashMap::new(),
        }
    }

    pub fn circuit_state(&self, method: &str) -> CircuitState {
        self.breakers
            .get(method)
            .map(|b| b.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Calls `native` if the circuit for `method` is closed/probing and
    /// native dispatch is enabled; otherwise calls `fallback`. A native
    /// `Err` counts as a circuit failure and the call degrades to
    /// `fallback` for that invocation rather than propagating the error.
    pub fn call<T, E>(
        &mut self,
        method: &str,
        native: impl FnOnce() -> Result<T, E>,
        fallback: impl FnOnce() -> T,
    ) -> (T, bool) {
        if !self.use_native {
            return (fallback(), false);
        }

        let breaker = self
            .breakers
            .entry(method.to_string())
            .or_insert_with(CircuitBreaker::new);

        if !breaker.should_attempt_native() {
            return (fallback(), false);
        }

        match native() {
            Ok(value) => {
                breaker.record(true);
                (value, true)
            }
            Err(_) => {
                breaker.record(false);
                (fallback(), false)
            }
        }
    }
}

impl Default for SmartRouter {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_native_when_healthy() {
        let mut router = SmartRouter::new(true);
        let (value, used_native) =
            router.call::<i32, ()>("linucb", || Ok(42), || -1);
        assert_eq!(value, 42);
        assert!(used_native);
    }

    #[test]
    fn falls_back_when_native_disabled() {
        let mut router = SmartRouter::new(false);
        let (value, used_native) = router.call::<i32, ()>("linucb", || Ok(42), || -1);
        assert_eq!(value, -1);
        assert!(!used_native);
    }

    #[test]
    fn trips_open_after_failure_threshold() {
        let mut router = SmartRouter::new(true);
        for _ in 0..WINDOW_SIZE {
            router.call::<i32, ()>("linucb", || Err(()), || -1);
        }
        assert_eq!(router.circuit_state("linucb"), CircuitState::Open);

        let (value, used_native) = router.call::<i32, ()>("linucb", || Ok(42), || -1);
        assert_eq!(value, -1);
        assert!(!used_native);
    }

    #[test]
    fn half_open_closes_after_consecutive_successes() {
        let mut router = SmartRouter::new(true);
        for _ in 0..WINDOW_SIZE {
            router.call::<i32, ()>("linucb", || Err(()), || -1);
        }
        assert_eq!(router.circuit_state("linucb"), CircuitState::Open);

        let breaker = router.breakers.get_mut("linucb").unwrap();
        breaker.state = CircuitState::HalfOpen;
        breaker.opened_at = None;

        for _ in 0..HALF_OPEN_SUCCESS_TO_CLOSE {
            router.call::<i32, ()>("linucb", || Ok(1), || -1);
        }
        assert_eq!(router.circuit_state("linucb"), CircuitState::Closed);
    }
}
