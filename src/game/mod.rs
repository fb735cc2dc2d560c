//! 游戏核心逻辑模块（状态、规则、能力、回合状态机等）。

pub mod config;
pub mod effects;
pub mod engine;
pub mod history;
pub mod rules;
pub mod session;
pub mod state;
pub mod stats;

pub use config::GameConfig;
pub use effects::{AbilityEffect, EffectContext, EffectResolution, EffectTrigger};
pub use engine::{ActionResolution, GameMachine, GameView};
pub use history::History;
pub use rules::{Clash, RuleError};
pub use session::{GameSession, SessionView};
pub use state::{
    Ability,
    AnimalType,
    Board,
    CaptureKind,
    Cell,
    FrozenUnits,
    GameEvent,
    GamePhase,
    GameState,
    Guard,
    IntegrityError,
    LogEntry,
    Outcome,
    PerPlayer,
    Piece,
    PieceId,
    Player,
    PlayerStats,
    Position,
    VictoryReason,
    GRID_SIZE,
    PIECES_PER_SIDE,
    TOTAL_PIECES,
};
pub use stats::{record_events, AggregateStats, GameResult, MemoryStatsStore, StatsStore};
