use std::time::{SystemTime, UNIX_EPOCH};

/// Connectivity state of the single Postgres primary, surfaced by `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseState {
    Normal,
    Unavailable,
}

impl DatabaseState {
    pub const fn as_str(self) -> &'static str {
        match self {
            DatabaseState::Normal => "NORMAL",
            DatabaseState::Unavailable => "UNAVAILABLE",
        }
    }
}

#[derive(Debug)]
pub struct DatabaseStateMachine {
    current: DatabaseState,
    change_count: u64,
    last_state_change_ms: Option<u64>,
    started_ms: u64,
}

impl DatabaseStateMachine {
    pub fn new(initial_state: DatabaseState) -> Self {
        Self {
            current: initial_state,
            change_count: 0,
            last_state_change_ms: None,
            started_ms: now_ms(),
        }
    }

    pub fn state(&self) -> DatabaseState {
        self.current
    }

    pub fn state_change_count(&self) -> u64 {
        self.change_count
    }

    pub fn last_state_change_ms(&self) -> Option<u64> {
        self.last_state_change_ms
    }

    pub fn uptime_ms(&self) -> u64 {
        now_ms().saturating_sub(self.started_ms)
    }

    pub fn set_state(&mut self, target: DatabaseState) {
        if target == self.current {
            return;
        }
        self.current = target;
        self.change_count = self.change_count.saturating_add(1);
        self.last_state_change_ms = Some(now_ms());
    }
}

impl Default for DatabaseStateMachine {
    fn default() -> Self {
        Self::new(DatabaseState::Normal)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_normal() {
        let machine = DatabaseStateMachine::default();
        assert_eq!(machine.state(), DatabaseState::Normal);
        assert_eq!(machine.state_change_count(), 0);
    }

    #[test]
    fn set_state_tracks_transitions() {
        let mut machine = DatabaseStateMachine::default();
        machine.set_state(DatabaseState::Unavailable);
        assert_eq!(machine.state(), DatabaseState::Unavailable);
        assert_eq!(machine.state_change_count(), 1);
        machine.set_state(DatabaseState::Unavailable);
        assert_eq!(machine.state_change_count(), 1);
    }
}
