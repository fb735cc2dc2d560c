use serde::{Deserialize, Serialize};

const DEFAULT_UNDO_CREDITS: u8 = 3;
const DEFAULT_HISTORY_LIMIT: usize = 10;
const DEFAULT_EVOLUTION_MOVES: u8 = 10;
const DEFAULT_STALL_LIMIT: u8 = 3;
const DEFAULT_SHOWDOWN_QUIET_TURNS: u8 = 3;

/// 规则常量。缺省字段取默认值，前端可只覆盖部分字段。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GameConfig {
    /// 人类玩家（红方）可用的悔棋次数。
    pub undo_credits: u8,
    pub history_limit: usize,
    /// 虎连续移动多少步后进化。
    pub evolution_moves: u8,
    pub stall_limit: u8,
    pub showdown_quiet_turns: u8,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            undo_credits: DEFAULT_UNDO_CREDITS,
            history_limit: DEFAULT_HISTORY_LIMIT,
            evolution_moves: DEFAULT_EVOLUTION_MOVES,
            stall_limit: DEFAULT_STALL_LIMIT,
            showdown_quiet_turns: DEFAULT_SHOWDOWN_QUIET_TURNS,
        }
    }
}
