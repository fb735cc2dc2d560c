use std::str::FromStr;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::game::rules::{self, Clash};
use crate::game::{AnimalType, GamePhase, GameState, Piece, Player, Position, PIECES_PER_SIDE};

/// 行动方可提交的一次行动，人类与 AI 走同一条校验路径。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameAction {
    Flip { position: Position },
    Move { from: Position, to: Position },
    Wait { position: Position },
    Surrender,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiPace {
    Instant,
    Normal,
    Relaxed,
}

impl FromStr for AiPace {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "instant" | "fast" => Ok(AiPace::Instant),
            "normal" | "default" => Ok(AiPace::Normal),
            "relaxed" | "slow" => Ok(AiPace::Relaxed),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AiConfig {
    /// 模拟思考的延迟。
    pub think_delay_ms: u32,
    pub random_flip_chance: f64,
    /// 超过该分数的走法直接执行。
    pub decisive_threshold: i32,
}

impl AiConfig {
    pub fn from_pace(pace: AiPace) -> Self {
        let think_delay_ms = match pace {
            AiPace::Instant => 0,
            AiPace::Normal => 1000,
            AiPace::Relaxed => 1800,
        };
        Self {
            think_delay_ms,
            random_flip_chance: 0.1,
            decisive_threshold: 500,
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        AiConfig::from_pace(AiPace::Normal)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DecisionReason {
    ForcedFlip,
    Decisive,
    FlipPreferred,
    RandomFlip,
    BestMove,
    LastResortFlip,
    Surrender,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiDecision {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<GameAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,
    pub candidates: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DecisionReason>,
}

impl AiDecision {
    fn idle() -> Self {
        Self {
            action: None,
            score: None,
            candidates: 0,
            reason: None,
        }
    }

    fn flip(position: Position, reason: DecisionReason, candidates: usize) -> Self {
        Self {
            action: Some(GameAction::Flip { position }),
            score: None,
            candidates,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScoredMove {
    from: Position,
    to: Position,
    score: i32,
}

impl ScoredMove {
    fn action(&self) -> GameAction {
        if self.from == self.to {
            GameAction::Wait {
                position: self.from,
            }
        } else {
            GameAction::Move {
                from: self.from,
                to: self.to,
            }
        }
    }
}

const OWN_PIECE_PENALTY: i32 = -1000;
const BIG_TIGER_KILL: i32 = 10_000;
const UNSAFE_PENALTY: i32 = -20;
const EVO_TIGER_TRADE_PENALTY: i32 = -100;

/// 考虑鼠象、象大虎克制后的有效点数。
fn effective_rank(attacker: AnimalType, defender: AnimalType) -> i32 {
    use AnimalType::*;

    match (attacker, defender) {
        (Rat, Elephant) | (Elephant, BigTiger) => 100,
        (Elephant, Rat) | (BigTiger, Elephant) => -1,
        (animal, _) => animal.rank() as i32,
    }
}

fn kill_value(victim: AnimalType) -> i32 {
    match victim {
        AnimalType::BigTiger => BIG_TIGER_KILL,
        AnimalType::Elephant => 50,
        AnimalType::Lion => 40,
        AnimalType::Tiger => 35,
        other => other.rank() as i32 * 10,
    }
}

fn flip_threshold(hidden: usize) -> i32 {
    if hidden <= 2 {
        -50
    } else if hidden > 10 {
        20
    } else {
        5
    }
}

pub struct AiAgent {
    config: AiConfig,
    rng: SmallRng,
}

impl AiAgent {
    pub fn new(config: AiConfig) -> Self {
        Self {
            config,
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(config: AiConfig, seed: u64) -> Self {
        Self {
            config,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    /// 只读局面，返回一个提议的行动。
    pub fn decide_action(&mut self, state: &GameState, player: Player) -> AiDecision {
        if !state.phase.accepts_actions() || state.turn != player {
            return AiDecision::idle();
        }

        let board = &state.board;
        let hidden = board.hidden_positions();
        let own_on_board = board.revealed_pieces_of(player).count();

        let must_flip = state.phase == GamePhase::FirstTurnPending
            || (own_on_board == 0 && state.hand(player).is_empty());
        if must_flip && !hidden.is_empty() {
            let central = hidden.iter().copied().find(|pos| pos.is_central());
            let target = central.or_else(|| hidden.choose(&mut self.rng).copied());
            if let Some(position) = target {
                return AiDecision::flip(position, DecisionReason::ForcedFlip, 0);
            }
        }

        let mut moves = self.score_moves(state, player);
        moves.sort_by(|a, b| b.score.cmp(&a.score));
        let candidates = moves.len();
        let best = moves.first().copied();

        if let Some(best) = best {
            if best.score > self.config.decisive_threshold {
                return self.commit(best, DecisionReason::Decisive, candidates);
            }
        }

        let best_score = best.map_or(-999, |best| best.score);
        if !hidden.is_empty() {
            let reason = if best_score < flip_threshold(hidden.len()) {
                Some(DecisionReason::FlipPreferred)
            } else if self.rng.gen::<f64>() < self.config.random_flip_chance {
                Some(DecisionReason::RandomFlip)
            } else {
                None
            };
            if let Some(reason) = reason {
                if let Some(&position) = hidden.choose(&mut self.rng) {
                    return AiDecision::flip(position, reason, candidates);
                }
            }
        }

        if let Some(best) = best {
            return self.commit(best, DecisionReason::BestMove, candidates);
        }

        if let Some(&position) = hidden.first() {
            return AiDecision::flip(position, DecisionReason::LastResortFlip, candidates);
        }

        if self.should_surrender(state, player, own_on_board, candidates) {
            tracing::debug!(%player, "ai surrenders");
            return AiDecision {
                action: Some(GameAction::Surrender),
                score: None,
                candidates,
                reason: Some(DecisionReason::Surrender),
            };
        }
        AiDecision::idle()
    }

    fn commit(&self, chosen: ScoredMove, reason: DecisionReason, candidates: usize) -> AiDecision {
        tracing::debug!(
            from = %chosen.from,
            to = %chosen.to,
            score = chosen.score,
            candidates,
            ?reason,
            "ai move selected"
        );
        AiDecision {
            action: Some(chosen.action()),
            score: Some(chosen.score),
            candidates,
            reason: Some(reason),
        }
    }

    fn score_moves(&self, state: &GameState, player: Player) -> Vec<ScoredMove> {
        let mut moves = Vec::new();
        for (from, piece) in state.board.revealed_pieces_of(player) {
            for to in rules::enumerate_targets(from, piece, &state.board, state.frozen.as_ref()) {
                let score = Self::score_target(state, player, piece, to);
                moves.push(ScoredMove { from, to, score });
            }
        }
        moves
    }

    fn score_target(state: &GameState, player: Player, piece: &Piece, to: Position) -> i32 {
        let occupant = state.board.piece(to);
        match occupant {
            Some(target) if target.owner == player => OWN_PIECE_PENALTY,
            Some(target) => {
                let mut score = kill_value(target.animal);
                if target.animal != AnimalType::BigTiger
                    && rules::clash(piece.animal, target.animal) == Clash::Trade
                {
                    score -= piece.animal.rank() as i32 * 5;
                    if piece.animal == AnimalType::Tiger && state.evo_available[player] {
                        score += EVO_TIGER_TRADE_PENALTY;
                    }
                }
                score
            }
            None => {
                let mut score = 1;
                let safe = Self::is_safe(state, player, piece.animal, to);
                if !safe {
                    score += UNSAFE_PENALTY;
                }
                if piece.animal == AnimalType::Tiger && state.evo_available[player] && safe {
                    score += 15 + state.tiger_streak[player] as i32 * 2;
                }
                score
            }
        }
    }

    /// 目标格相邻处没有能压制该棋子的敌方明子。
    fn is_safe(state: &GameState, player: Player, animal: AnimalType, at: Position) -> bool {
        at.neighbors().all(|pos| {
            match state
                .board
                .cell(pos)
                .and_then(|cell| cell.revealed_piece_of(player.opponent()))
            {
                Some(enemy) => {
                    effective_rank(enemy.animal, animal) < effective_rank(animal, enemy.animal)
                }
                None => true,
            }
        })
    }

    fn should_surrender(
        &self,
        state: &GameState,
        player: Player,
        own_on_board: usize,
        candidates: usize,
    ) -> bool {
        let hidden = state.board.hidden_positions().len();
        let enemy_on_board = state.board.revealed_pieces_of(player.opponent()).count();
        (own_on_board == 0 && hidden == 0)
            || (own_on_board == 0
                && state.captured_originals(player.opponent()) >= PIECES_PER_SIDE)
            || (own_on_board == 0 && enemy_on_board > 0 && state.hand(player).is_empty())
            || (candidates == 0 && hidden == 0)
    }
}
