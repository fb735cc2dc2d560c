use std::collections::VecDeque;

use super::state::GameState;

/// 悔棋快照栈，超出上限时丢弃最早的快照。
#[derive(Debug, Clone)]
pub struct History {
    snapshots: VecDeque<GameState>,
    limit: usize,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(limit),
            limit,
        }
    }

    pub fn push(&mut self, snapshot: GameState) {
        if self.limit == 0 {
            return;
        }
        while self.snapshots.len() >= self.limit {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
    }

    pub fn pop(&mut self) -> Option<GameState> {
        self.snapshots.pop_back()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(turn_number: u32) -> GameState {
        let mut state = GameState::default();
        state.turn_number = turn_number;
        state
    }

    #[test]
    fn oldest_snapshot_is_dropped_at_capacity() {
        let mut history = History::new(3);
        for turn in 1..=5 {
            history.push(snapshot(turn));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.pop().map(|s| s.turn_number), Some(5));
        assert_eq!(history.pop().map(|s| s.turn_number), Some(4));
        assert_eq!(history.pop().map(|s| s.turn_number), Some(3));
        assert!(history.pop().is_none());
    }

    #[test]
    fn zero_limit_keeps_nothing() {
        let mut history = History::new(0);
        history.push(snapshot(1));
        assert!(history.is_empty());
    }
}
