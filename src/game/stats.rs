use serde::{Deserialize, Serialize};

use super::state::{GameEvent, Outcome, Player};

/// 跨对局累计的战绩。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AggregateStats {
    pub wins: u32,
    pub total: u32,
    pub captures: u32,
    pub evolutions: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameResult {
    Win,
    Loss,
}

/// 持久化战绩的外部存储，具体介质由实现决定。
pub trait StatsStore {
    fn record_outcome(&mut self, result: GameResult);
    fn record_capture(&mut self);
    fn record_evolution(&mut self);
    fn read_aggregate(&self) -> AggregateStats;
    fn tutorial_seen(&self) -> bool;
    fn mark_tutorial_seen(&mut self);
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStatsStore {
    stats: AggregateStats,
    tutorial_seen: bool,
}

impl MemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatsStore for MemoryStatsStore {
    fn record_outcome(&mut self, result: GameResult) {
        self.stats.total += 1;
        if result == GameResult::Win {
            self.stats.wins += 1;
        }
    }

    fn record_capture(&mut self) {
        self.stats.captures += 1;
    }

    fn record_evolution(&mut self) {
        self.stats.evolutions += 1;
    }

    fn read_aggregate(&self) -> AggregateStats {
        self.stats
    }

    fn tutorial_seen(&self) -> bool {
        self.tutorial_seen
    }

    fn mark_tutorial_seen(&mut self) {
        self.tutorial_seen = true;
    }
}

/// 以人类玩家视角把事件流写入战绩：只统计其吃下的对方棋子与进化，平局不计入胜负。
pub fn record_events(store: &mut dyn StatsStore, events: &[GameEvent], human: Player) {
    for event in events {
        match event {
            GameEvent::Captured { captor, owner, .. } if *captor == human && *owner != human => {
                store.record_capture()
            }
            GameEvent::Evolved { player, .. } if *player == human => store.record_evolution(),
            GameEvent::GameOver {
                outcome: Outcome::Win { winner, .. },
            } => {
                let result = if *winner == human {
                    GameResult::Win
                } else {
                    GameResult::Loss
                };
                store.record_outcome(result);
            }
            _ => {}
        }
    }
}
