use serde::{Deserialize, Serialize};

use crate::game::Player;

/// 排队中的一次 AI 决策，凭票据兑现。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingDecision {
    pub ticket: u64,
    pub player: Player,
    /// 排队时的回合号，过期的票据据此判定。
    pub turn_number: u32,
    pub delay_ms: u32,
}

/// 单槽调度器：任何时刻至多一个待执行的 AI 决策。
#[derive(Debug, Default)]
pub struct AiScheduler {
    slot: Option<PendingDecision>,
    next_ticket: u64,
}

impl AiScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 排入新的决策；已有同一回合的待办时直接返回原票据。
    pub fn schedule(&mut self, player: Player, turn_number: u32, delay_ms: u32) -> PendingDecision {
        if let Some(pending) = self.slot {
            if pending.player == player && pending.turn_number == turn_number {
                return pending;
            }
        }
        self.next_ticket += 1;
        let pending = PendingDecision {
            ticket: self.next_ticket,
            player,
            turn_number,
            delay_ms,
        };
        self.slot = Some(pending);
        pending
    }

    pub fn cancel(&mut self) -> Option<PendingDecision> {
        let cancelled = self.slot.take();
        if let Some(pending) = &cancelled {
            tracing::debug!(ticket = pending.ticket, "ai decision cancelled");
        }
        cancelled
    }

    /// 票据仍有效且回合未变时取出待办，否则返回 `None`。
    pub fn take_if_current(&mut self, ticket: u64, turn_number: u32) -> Option<PendingDecision> {
        match self.slot {
            Some(pending) if pending.ticket == ticket && pending.turn_number == turn_number => {
                self.slot.take()
            }
            _ => None,
        }
    }

    pub fn pending(&self) -> Option<&PendingDecision> {
        self.slot.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.slot.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_slot_per_turn() {
        let mut scheduler = AiScheduler::new();
        let first = scheduler.schedule(Player::Blue, 3, 1000);
        let again = scheduler.schedule(Player::Blue, 3, 1000);
        assert_eq!(first, again);

        let later = scheduler.schedule(Player::Blue, 5, 1000);
        assert_ne!(later.ticket, first.ticket);
        assert_eq!(scheduler.pending(), Some(&later));
    }

    #[test]
    fn stale_tickets_are_rejected() {
        let mut scheduler = AiScheduler::new();
        let pending = scheduler.schedule(Player::Blue, 2, 0);
        assert!(scheduler.take_if_current(pending.ticket, 4).is_none());
        assert!(scheduler.take_if_current(pending.ticket + 1, 2).is_none());
        assert_eq!(scheduler.take_if_current(pending.ticket, 2), Some(pending));
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn cancel_clears_the_slot() {
        let mut scheduler = AiScheduler::new();
        let pending = scheduler.schedule(Player::Blue, 7, 500);
        assert_eq!(scheduler.cancel(), Some(pending));
        assert!(scheduler.take_if_current(pending.ticket, 7).is_none());
        assert_eq!(scheduler.cancel(), None);
    }
}
