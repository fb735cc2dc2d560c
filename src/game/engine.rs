use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use super::config::GameConfig;
use super::effects::{AbilityEffect, EffectContext, EffectTrigger};
use super::history::History;
use super::rules::{self, Clash, RuleError};
use super::state::{
    AnimalType, CaptureKind, GameEvent, GamePhase, GameState, Guard, LogEntry, Outcome,
    PerPlayer, Piece, PieceId, Player, Position, VictoryReason, PIECES_PER_SIDE,
};

/// 一次行动的结算结果，供前端一次性渲染。
#[derive(Debug, Clone, Serialize)]
pub struct ActionResolution {
    pub state: GameState,
    pub events: Vec<GameEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

impl ActionResolution {
    pub fn new(state: GameState, events: Vec<GameEvent>) -> Self {
        let outcome = state.outcome.clone();
        Self {
            state,
            events,
            outcome,
        }
    }
}

/// 渲染层读取的只读视图。
#[derive(Debug, Clone, Serialize)]
pub struct GameView<'a> {
    pub state: &'a GameState,
    pub log: &'a [LogEntry],
    pub undo_credits: PerPlayer<Option<u8>>,
    pub history_depth: usize,
    pub ai_pending: bool,
}

/// 回合状态机：唯一持有权威状态，所有行动都经由这里校验与结算。
pub struct GameMachine {
    state: GameState,
    config: GameConfig,
    history: History,
    undo_credits: PerPlayer<Option<u8>>,
    log: Vec<LogEntry>,
    rng: SmallRng,
}

impl GameMachine {
    pub fn new(config: GameConfig) -> Self {
        Self::build(GameState::default(), config, SmallRng::from_entropy())
    }

    pub fn with_seed(config: GameConfig, seed: u64) -> Self {
        Self::build(GameState::default(), config, SmallRng::seed_from_u64(seed))
    }

    /// 从任意局面接管，常用于残局构造。
    pub fn from_state(state: GameState, config: GameConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self::build(state, config, rng)
    }

    fn build(state: GameState, config: GameConfig, rng: SmallRng) -> Self {
        Self {
            state,
            history: History::new(config.history_limit),
            undo_credits: Self::initial_credits(&config),
            log: Vec::new(),
            config,
            rng,
        }
    }

    fn initial_credits(config: &GameConfig) -> PerPlayer<Option<u8>> {
        PerPlayer::new(Some(config.undo_credits), None)
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn undo_credits(&self, player: Player) -> Option<u8> {
        self.undo_credits[player]
    }

    pub fn history_depth(&self) -> usize {
        self.history.len()
    }

    pub fn view(&self, ai_pending: bool) -> GameView<'_> {
        GameView {
            state: &self.state,
            log: &self.log,
            undo_credits: self.undo_credits,
            history_depth: self.history.len(),
            ai_pending,
        }
    }

    /// 开新局，先手随机。
    pub fn start(&mut self) -> Vec<GameEvent> {
        let first = if self.rng.gen_bool(0.5) {
            Player::Red
        } else {
            Player::Blue
        };
        self.start_with(first)
    }

    pub fn start_with(&mut self, first: Player) -> Vec<GameEvent> {
        let board = rules::new_board(&mut self.rng);
        self.state = GameState::new(board, first);
        self.enter_phase(GamePhase::FirstTurnPending);
        self.history.clear();
        self.undo_credits = Self::initial_credits(&self.config);
        self.log.clear();

        let event = GameEvent::GameStarted {
            first_player: first,
        };
        tracing::info!(%first, "game started");
        self.log.push(LogEntry {
            turn: self.state.turn_number,
            player: first,
            action: event.summary(),
            detail: None,
        });
        vec![event]
    }

    fn enter_phase(&mut self, next: GamePhase) {
        let current = self.state.phase;
        if current.can_transition_to(next) {
            self.state.phase = next;
        } else {
            tracing::warn!(?current, ?next, "phase transition rejected");
        }
    }

    fn ensure_can_act(&self, player: Player) -> Result<(), RuleError> {
        match self.state.phase {
            GamePhase::NotStarted => return Err(RuleError::GameNotStarted),
            GamePhase::Terminal => return Err(RuleError::GameFinished),
            GamePhase::FirstTurnPending | GamePhase::InProgress => {}
        }
        if self.state.turn != player {
            return Err(RuleError::NotPlayerTurn { player });
        }
        Ok(())
    }

    fn ensure_moves_allowed(&self) -> Result<(), RuleError> {
        if self.state.phase == GamePhase::FirstTurnPending {
            return Err(RuleError::FlipRequired);
        }
        Ok(())
    }

    fn ensure_on_board(position: Position) -> Result<(), RuleError> {
        if !position.is_on_board() {
            return Err(RuleError::InvalidPosition { position });
        }
        Ok(())
    }

    fn owned_piece(&self, player: Player, position: Position) -> Result<&Piece, RuleError> {
        Self::ensure_on_board(position)?;
        let cell = self
            .state
            .board
            .cell(position)
            .ok_or(RuleError::InvalidPosition { position })?;
        if !cell.revealed {
            return Err(RuleError::CellHidden { position });
        }
        let piece = cell.piece.as_ref().ok_or(RuleError::NoPiece { position })?;
        if piece.owner != player {
            return Err(RuleError::NotOwnPiece { player, position });
        }
        Ok(piece)
    }

    pub fn flip(&mut self, player: Player, position: Position) -> Result<Vec<GameEvent>, RuleError> {
        self.ensure_can_act(player)?;
        Self::ensure_on_board(position)?;
        let revealed = self
            .state
            .board
            .cell(position)
            .map_or(true, |cell| cell.revealed);
        if revealed {
            return Err(RuleError::AlreadyRevealed { position });
        }

        self.history.push(self.state.clone());

        let mut events = Vec::new();
        let mut captured = false;
        let mut flipped = None;
        if let Some(cell) = self.state.board.cell_mut(position) {
            cell.revealed = true;
            flipped = cell.piece.clone();
        }
        if let Some(piece) = flipped {
            events.push(GameEvent::Flipped {
                player,
                position,
                animal: piece.animal,
                owner: piece.owner,
            });
            if let Some(effect) = AbilityEffect::triggered_by(&piece, EffectTrigger::OnFlip) {
                let ctx = EffectContext::new(EffectTrigger::OnFlip, player, position);
                let resolution = effect.apply(&ctx, &mut self.state, &mut self.rng);
                captured |= resolution.captured;
                events.extend(resolution.events);
            }
        }

        self.state.tiger_streak[player] = 0;
        self.state.stats[player].flips += 1;
        if self.state.phase == GamePhase::FirstTurnPending {
            self.enter_phase(GamePhase::InProgress);
        }

        tracing::debug!(%player, %position, "flip accepted");
        Ok(self.finish_turn(player, events, captured))
    }

    pub fn move_piece(
        &mut self,
        player: Player,
        from: Position,
        to: Position,
    ) -> Result<Vec<GameEvent>, RuleError> {
        self.ensure_can_act(player)?;
        self.ensure_moves_allowed()?;
        Self::ensure_on_board(to)?;
        let attacker = self.owned_piece(player, from)?.clone();

        if from == to && attacker.animal == AnimalType::Wolf {
            return self.wait(player, from);
        }

        let targets = rules::enumerate_targets(
            from,
            &attacker,
            &self.state.board,
            self.state.frozen.as_ref(),
        );
        if from == to || !targets.contains(&to) {
            return Err(RuleError::IllegalMove { from, to });
        }

        self.history.push(self.state.clone());

        let mut events = Vec::new();
        let mut captured = false;
        let mut traded = false;

        let on_attacked = self
            .state
            .board
            .piece(to)
            .and_then(|defender| AbilityEffect::triggered_by(defender, EffectTrigger::OnAttacked));
        if let Some(effect) = on_attacked {
            let ctx = EffectContext::new(EffectTrigger::OnAttacked, player, to);
            let resolution = effect.apply(&ctx, &mut self.state, &mut self.rng);
            events.extend(resolution.events);
        }

        let Some(mut mover) = self.state.board.take(from) else {
            return Err(RuleError::NoPiece { position: from });
        };
        mover.guard = Guard::Vulnerable;
        let animal = mover.animal;

        // 猫若已瞬移，目标格此时为空。
        match self.state.board.take(to) {
            Some(defender) => {
                let defender_owner = defender.owner;
                captured = true;
                match rules::clash(animal, defender.animal) {
                    Clash::Trade => {
                        traded = true;
                        self.state.stats[player].trades += 1;
                        events.push(GameEvent::Traded {
                            captor: player,
                            attacker: animal,
                            defender: defender.animal,
                        });
                        events.extend(self.state.capture_piece(
                            defender,
                            player,
                            to,
                            CaptureKind::Trade,
                        ));
                        events.extend(self.state.capture_piece(
                            mover,
                            player,
                            from,
                            CaptureKind::Trade,
                        ));
                    }
                    Clash::Capture => {
                        events.push(GameEvent::Moved {
                            player,
                            from,
                            to,
                            animal,
                        });
                        events.extend(self.state.capture_piece(
                            defender,
                            player,
                            to,
                            CaptureKind::Capture,
                        ));
                        self.state.board.put(to, mover);
                        if let Some(effect) =
                            self.state.board.piece(to).and_then(|piece| {
                                AbilityEffect::triggered_by(piece, EffectTrigger::OnCapture)
                            })
                        {
                            let ctx = EffectContext::new(EffectTrigger::OnCapture, player, to)
                                .with_target_player(defender_owner);
                            let resolution = effect.apply(&ctx, &mut self.state, &mut self.rng);
                            events.extend(resolution.events);
                        }
                    }
                }
            }
            None => {
                events.push(GameEvent::Moved {
                    player,
                    from,
                    to,
                    animal,
                });
                self.state.board.put(to, mover);
            }
        }

        self.update_tiger_streak(player, animal, traded);
        if animal == AnimalType::Tiger && !self.state.is_finished() {
            events.extend(self.try_evolve(player, attacker.id, to));
        }

        tracing::debug!(%player, %from, %to, %animal, captured, "move accepted");
        Ok(self.finish_turn(player, events, captured))
    }

    fn update_tiger_streak(&mut self, player: Player, animal: AnimalType, traded: bool) {
        let streak = &mut self.state.tiger_streak[player];
        if traded {
            *streak = 0;
        } else if animal == AnimalType::Tiger && self.state.evo_available[player] {
            *streak = streak.saturating_add(1);
        } else {
            *streak = 0;
        }
        let current = *streak;
        let best = &mut self.state.stats[player].max_tiger_streak;
        *best = (*best).max(current);
    }

    fn try_evolve(&mut self, player: Player, tiger_id: PieceId, at: Position) -> Vec<GameEvent> {
        let ready = self.state.evo_available[player]
            && self.state.tiger_streak[player] >= self.config.evolution_moves
            && self.state.board.piece(at).is_some_and(|piece| piece.id == tiger_id);
        if !ready {
            return Vec::new();
        }
        let Some(effect) = self
            .state
            .board
            .piece(at)
            .and_then(|tiger| AbilityEffect::triggered_by(tiger, EffectTrigger::OnMove))
        else {
            return Vec::new();
        };
        let ctx = EffectContext::new(EffectTrigger::OnMove, player, at);
        effect.apply(&ctx, &mut self.state, &mut self.rng).events
    }

    /// 狼原地潜伏：获得免疫，直到它下一次移动。
    pub fn wait(&mut self, player: Player, position: Position) -> Result<Vec<GameEvent>, RuleError> {
        self.ensure_can_act(player)?;
        self.ensure_moves_allowed()?;
        let piece = self.owned_piece(player, position)?;
        if piece.animal != AnimalType::Wolf {
            return Err(RuleError::NotAWolf { position });
        }

        self.history.push(self.state.clone());

        if let Some(wolf) = self.state.board.piece_mut(position) {
            wolf.guard = Guard::Immune;
        }
        self.state.tiger_streak[player] = 0;

        tracing::debug!(%player, %position, "wolf waits");
        let events = vec![GameEvent::WolfWaited { player, position }];
        Ok(self.finish_turn(player, events, false))
    }

    pub fn surrender(&mut self, player: Player) -> Result<Vec<GameEvent>, RuleError> {
        self.ensure_can_act(player)?;
        self.history.push(self.state.clone());

        let mut events = vec![GameEvent::Surrendered { player }];
        events.extend(self.state.declare_outcome(Outcome::Win {
            winner: player.opponent(),
            reason: VictoryReason::Surrender,
        }));
        Ok(self.finish_turn(player, events, false))
    }

    /// 悔一步。终局后不限行动方；红方每次消耗一次悔棋机会。
    pub fn undo(&mut self, player: Player) -> Result<Vec<GameEvent>, RuleError> {
        match self.state.phase {
            GamePhase::NotStarted => return Err(RuleError::GameNotStarted),
            GamePhase::Terminal => {}
            GamePhase::FirstTurnPending | GamePhase::InProgress => {
                if self.state.turn != player {
                    return Err(RuleError::NotPlayerTurn { player });
                }
            }
        }
        if self.history.is_empty() {
            return Err(RuleError::NothingToUndo);
        }
        if self.undo_credits[player] == Some(0) {
            tracing::warn!(%player, "undo denied, no credits left");
            self.log.push(LogEntry {
                turn: self.state.turn_number,
                player,
                action: "No undos left!".to_string(),
                detail: None,
            });
            return Err(RuleError::OutOfUndoCredits { player });
        }

        let Some(snapshot) = self.history.pop() else {
            return Err(RuleError::NothingToUndo);
        };
        self.state = snapshot;
        if let Some(credits) = self.undo_credits[player].as_mut() {
            *credits -= 1;
        }

        let event = GameEvent::Undone {
            player,
            remaining: self.undo_credits[player],
        };
        tracing::debug!(%player, depth = self.history.len(), "undo applied");
        self.log.push(LogEntry {
            turn: self.state.turn_number,
            player,
            action: event.summary(),
            detail: None,
        });
        Ok(vec![event])
    }

    fn finish_turn(
        &mut self,
        player: Player,
        mut events: Vec<GameEvent>,
        captured: bool,
    ) -> Vec<GameEvent> {
        if self
            .state
            .frozen
            .as_ref()
            .is_some_and(|frozen| frozen.player == player)
        {
            self.state.frozen = None;
        }
        self.state.no_move_counts[player] = 0;
        self.record(player, &events);
        self.state.turn_number += 1;
        if captured {
            self.state.no_capture_turns = 0;
        } else {
            self.state.no_capture_turns = self.state.no_capture_turns.saturating_add(1);
        }

        if !self.state.is_finished() {
            self.state.turn = player.opponent();
            events.extend(self.check_showdown());
        }
        if !self.state.is_finished() {
            events.extend(self.resolve_turn_start());
        }
        events
    }

    fn record(&mut self, player: Player, events: &[GameEvent]) {
        let Some((first, rest)) = events.split_first() else {
            return;
        };
        let detail = if rest.is_empty() {
            None
        } else {
            Some(
                rest.iter()
                    .map(GameEvent::summary)
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        };
        self.log.push(LogEntry {
            turn: self.state.turn_number,
            player,
            action: first.summary(),
            detail,
        });
    }

    /// 双方各剩一子且连续若干回合无吃子时直接比大小。
    fn check_showdown(&mut self) -> Option<GameEvent> {
        if self.state.no_capture_turns < self.config.showdown_quiet_turns {
            return None;
        }
        let mut last = PerPlayer::<Option<AnimalType>>::default();
        for player in Player::ALL {
            let mut owned = self
                .state
                .board
                .cells()
                .filter_map(|(_, cell)| cell.piece.as_ref())
                .filter(|piece| piece.owner == player);
            let only = owned.next()?;
            if owned.next().is_some() {
                return None;
            }
            last[player] = Some(only.animal);
        }
        let (red, blue) = (last.red?, last.blue?);

        let outcome = if rules::outranks(red, blue) {
            Outcome::Win {
                winner: Player::Red,
                reason: VictoryReason::Showdown,
            }
        } else if rules::outranks(blue, red) {
            Outcome::Win {
                winner: Player::Blue,
                reason: VictoryReason::Showdown,
            }
        } else {
            Outcome::Draw
        };
        tracing::debug!(%red, %blue, "final showdown");
        self.state.declare_outcome(outcome)
    }

    /// 轮到的一方若无合法行动，则判负或跳过，直到有人能行动或对局结束。
    fn resolve_turn_start(&mut self) -> Vec<GameEvent> {
        let mut events = Vec::new();
        while !self.state.is_finished() && self.state.phase.accepts_actions() {
            let player = self.state.turn;
            if rules::has_legal_action(&self.state.board, player, self.state.frozen.as_ref()) {
                break;
            }

            if self.state.board.count_owned(player) == 0
                && self.state.captured_originals(player.opponent()) == PIECES_PER_SIDE
            {
                events.extend(self.state.declare_outcome(Outcome::Win {
                    winner: player.opponent(),
                    reason: VictoryReason::ForcedConcession,
                }));
                break;
            }

            let count = self.state.no_move_counts[player].saturating_add(1);
            self.state.no_move_counts[player] = count;
            let skipped = GameEvent::TurnSkipped {
                player,
                count,
                limit: self.config.stall_limit,
            };
            tracing::debug!(%player, count, "turn skipped");
            self.log.push(LogEntry {
                turn: self.state.turn_number,
                player,
                action: skipped.summary(),
                detail: None,
            });
            events.push(skipped);

            if count >= self.config.stall_limit {
                events.extend(self.state.declare_outcome(Outcome::Win {
                    winner: player.opponent(),
                    reason: VictoryReason::Stalled,
                }));
                break;
            }

            if self
                .state
                .frozen
                .as_ref()
                .is_some_and(|frozen| frozen.player == player)
            {
                self.state.frozen = None;
            }
            self.state.turn = player.opponent();
        }
        events
    }
}
