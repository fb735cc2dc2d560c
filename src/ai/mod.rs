//! AI 模块：启发式走子与思考调度。

pub mod heuristic;
pub mod scheduler;

pub use heuristic::{AiAgent, AiConfig, AiDecision, AiPace, DecisionReason, GameAction};
pub use scheduler::{AiScheduler, PendingDecision};
