use genesis_types::Action;
use serde::{Deserialize, Serialize};

/// Hysteresis and cooldown state carried from bar to bar. The decision for
/// bar `i` depends only on this snapshot at `i - 1` and the inputs at `i`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionState {
    pub last_action: Action,
    pub pending_action: Action,
    pub confirm_count: u32,
    pub cooldown_remaining: u32,
}

impl Default for DecisionState {
    fn default() -> Self {
        Self {
            last_action: Action::None,
            pending_action: Action::None,
            confirm_count: 0,
            cooldown_remaining: 0,
        }
    }
}

impl DecisionState {
    /// Tick the cooldown counter. Called once per bar by the engine,
    /// regardless of the decision outcome.
    pub fn tick_cooldown(&mut self) {
        self.cooldown_remaining = self.cooldown_remaining.saturating_sub(1);
    }

    /// Arm the cooldown after a trade opens.
    pub fn arm_cooldown(&mut self, bars: u32) {
        self.cooldown_remaining = bars;
    }

    /// Advance the hysteresis machine for a candidate that differs from
    /// `last_action`. Returns true when the switch is confirmed.
    pub fn confirm_switch(&mut self, candidate: Action, steps: u32) -> bool {
        if candidate == self.pending_action {
            self.confirm_count += 1;
        } else {
            self.pending_action = candidate;
            self.confirm_count = 1;
        }
        if self.confirm_count >= steps {
            self.last_action = candidate;
            self.pending_action = Action::None;
            self.confirm_count = 0;
            true
        } else {
            false
        }
    }

    /// Record a committed action without hysteresis bookkeeping.
    pub fn commit(&mut self, action: Action) {
        self.last_action = action;
        self.pending_action = Action::None;
        self.confirm_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_requires_consecutive_confirmations() {
        let mut state = DecisionState::default();
        state.last_action = Action::Long;

        assert!(!state.confirm_switch(Action::Short, 3));
        assert!(!state.confirm_switch(Action::Short, 3));
        assert!(state.confirm_switch(Action::Short, 3));
        assert_eq!(state.last_action, Action::Short);
        assert_eq!(state.confirm_count, 0);
    }

    #[test]
    fn unstable_candidate_resets_counter() {
        let mut state = DecisionState::default();
        state.last_action = Action::Long;

        assert!(!state.confirm_switch(Action::Short, 3));
        assert!(!state.confirm_switch(Action::None, 3));
        // Back to Short: counter restarted, not continued.
        assert!(!state.confirm_switch(Action::Short, 3));
        assert_eq!(state.confirm_count, 2);
    }

    #[test]
    fn cooldown_saturates_at_zero() {
        let mut state = DecisionState::default();
        state.arm_cooldown(2);
        state.tick_cooldown();
        state.tick_cooldown();
        state.tick_cooldown();
        assert_eq!(state.cooldown_remaining, 0);
    }
}
