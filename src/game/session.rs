use std::cell::{RefCell, RefMut};

use serde::Serialize;

use super::config::GameConfig;
use super::engine::{ActionResolution, GameMachine, GameView};
use super::rules::RuleError;
use super::state::{GameEvent, Player};
use super::stats::{record_events, AggregateStats, StatsStore};
use crate::ai::{AiAgent, AiConfig, AiDecision, AiScheduler, GameAction, PendingDecision};

/// 前端渲染所需的完整视图。
#[derive(Debug, Clone, Serialize)]
pub struct SessionView<'a> {
    #[serde(flatten)]
    pub game: GameView<'a>,
    pub lifetime: AggregateStats,
    pub tutorial_seen: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AiTurn {
    pub decision: AiDecision,
    pub resolution: ActionResolution,
}

/// 一局人机对战：状态机、AI、调度槽与战绩存储的组合。
pub struct GameSession {
    machine: GameMachine,
    agent: AiAgent,
    scheduler: AiScheduler,
    store: Box<dyn StatsStore>,
    human: Player,
}

impl GameSession {
    pub fn new(config: GameConfig, ai_config: AiConfig, store: Box<dyn StatsStore>) -> Self {
        Self {
            machine: GameMachine::new(config),
            agent: AiAgent::new(ai_config),
            scheduler: AiScheduler::new(),
            store,
            human: Player::Red,
        }
    }

    pub fn with_seed(
        config: GameConfig,
        ai_config: AiConfig,
        store: Box<dyn StatsStore>,
        seed: u64,
    ) -> Self {
        Self {
            machine: GameMachine::with_seed(config, seed),
            agent: AiAgent::with_seed(ai_config, seed.wrapping_add(1)),
            scheduler: AiScheduler::new(),
            store,
            human: Player::Red,
        }
    }

    /// 共享句柄上的重入保护：上一个行动尚未结束时拒绝新的行动。
    pub fn lock(cell: &RefCell<GameSession>) -> Result<RefMut<'_, GameSession>, RuleError> {
        cell.try_borrow_mut().map_err(|_| RuleError::ActionInFlight)
    }

    pub fn human(&self) -> Player {
        self.human
    }

    pub fn ai(&self) -> Player {
        self.human.opponent()
    }

    pub fn machine(&self) -> &GameMachine {
        &self.machine
    }

    pub fn pending(&self) -> Option<PendingDecision> {
        self.scheduler.pending().copied()
    }

    pub fn view(&self) -> SessionView<'_> {
        SessionView {
            game: self.machine.view(self.scheduler.is_pending()),
            lifetime: self.store.read_aggregate(),
            tutorial_seen: self.store.tutorial_seen(),
        }
    }

    pub fn lifetime_stats(&self) -> AggregateStats {
        self.store.read_aggregate()
    }

    pub fn mark_tutorial_seen(&mut self) {
        self.store.mark_tutorial_seen();
    }

    pub fn start(&mut self) -> ActionResolution {
        self.scheduler.cancel();
        let events = self.machine.start();
        self.after_transition(events)
    }

    pub fn start_with(&mut self, first: Player) -> ActionResolution {
        self.scheduler.cancel();
        let events = self.machine.start_with(first);
        self.after_transition(events)
    }

    pub fn submit(
        &mut self,
        player: Player,
        action: GameAction,
    ) -> Result<ActionResolution, RuleError> {
        let events = match action {
            GameAction::Flip { position } => self.machine.flip(player, position),
            GameAction::Move { from, to } => self.machine.move_piece(player, from, to),
            GameAction::Wait { position } => self.machine.wait(player, position),
            GameAction::Surrender => self.machine.surrender(player),
        }?;
        record_events(self.store.as_mut(), &events, self.human);
        Ok(self.after_transition(events))
    }

    pub fn undo(&mut self, player: Player) -> Result<ActionResolution, RuleError> {
        let events = self.machine.undo(player)?;
        self.scheduler.cancel();
        Ok(self.after_transition(events))
    }

    /// 兑现一张 AI 票据：基于只读局面决策，再走与人类相同的提交路径。
    pub fn run_ai(&mut self, ticket: u64) -> Result<AiTurn, RuleError> {
        let state = self.machine.state();
        let pending = self
            .scheduler
            .take_if_current(ticket, state.turn_number)
            .ok_or(RuleError::StaleDecision)?;
        if pending.player != state.turn {
            return Err(RuleError::StaleDecision);
        }

        let decision = self.agent.decide_action(state, pending.player);
        let action = decision.action.ok_or(RuleError::StaleDecision)?;
        tracing::debug!(ticket, ?action, "ai decision ready");
        let resolution = self.submit(pending.player, action)?;
        Ok(AiTurn {
            decision,
            resolution,
        })
    }

    fn after_transition(&mut self, events: Vec<GameEvent>) -> ActionResolution {
        let state = self.machine.state();
        if state.is_finished() {
            self.scheduler.cancel();
        } else if state.phase.accepts_actions() && state.turn == self.ai() {
            let delay = self.agent.config().think_delay_ms;
            self.scheduler.schedule(state.turn, state.turn_number, delay);
        }
        ActionResolution::new(self.machine.state().clone(), events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiPace;
    use crate::game::stats::MemoryStatsStore;

    fn session(seed: u64) -> GameSession {
        GameSession::with_seed(
            GameConfig::default(),
            AiConfig::from_pace(AiPace::Instant),
            Box::new(MemoryStatsStore::new()),
            seed,
        )
    }

    fn first_hidden(session: &GameSession) -> GameAction {
        GameAction::Flip {
            position: session.machine().state().board.hidden_positions()[0],
        }
    }

    #[test]
    fn ai_is_scheduled_after_human_action() {
        let mut session = session(1);
        session.start_with(Player::Red);
        assert!(session.pending().is_none());

        let action = first_hidden(&session);
        session.submit(Player::Red, action).expect("human flips");
        let pending = session.pending().expect("ai should be scheduled");
        assert_eq!(pending.player, Player::Blue);
        assert_eq!(pending.delay_ms, 0);
        assert!(session.view().game.ai_pending);

        let turn = session.run_ai(pending.ticket).expect("ai acts");
        assert!(turn.decision.action.is_some());
        assert_eq!(session.machine().state().turn, Player::Red);
        assert!(session.pending().is_none());
    }

    #[test]
    fn ai_opens_when_it_moves_first() {
        let mut session = session(2);
        session.start_with(Player::Blue);
        let pending = session.pending().expect("ai should open");
        assert_eq!(
            session
                .submit(Player::Red, first_hidden(&session))
                .map(|_| ()),
            Err(RuleError::NotPlayerTurn { player: Player::Red })
        );
        session.run_ai(pending.ticket).expect("ai flips first");
        assert_eq!(session.machine().state().turn, Player::Red);
    }

    #[test]
    fn stale_ticket_is_refused() {
        let mut session = session(3);
        session.start_with(Player::Blue);
        let pending = session.pending().expect("ai should open");
        assert_eq!(
            session.run_ai(pending.ticket + 1).map(|_| ()),
            Err(RuleError::StaleDecision)
        );
        session.run_ai(pending.ticket).expect("current ticket still works");
        assert_eq!(
            session.run_ai(pending.ticket).map(|_| ()),
            Err(RuleError::StaleDecision)
        );
    }

    #[test]
    fn surrender_records_a_loss_and_clears_the_slot() {
        let mut session = session(4);
        session.start_with(Player::Red);
        session
            .submit(Player::Red, GameAction::Surrender)
            .expect("surrender accepted");
        assert!(session.pending().is_none());
        assert_eq!(
            session.lifetime_stats(),
            AggregateStats {
                wins: 0,
                total: 1,
                captures: 0,
                evolutions: 0,
            }
        );
    }

    #[test]
    fn reentrant_access_is_rejected() {
        let shared = RefCell::new(session(5));
        let held = GameSession::lock(&shared).expect("first lock");
        assert!(matches!(
            GameSession::lock(&shared),
            Err(RuleError::ActionInFlight)
        ));
        drop(held);
        assert!(GameSession::lock(&shared).is_ok());
    }

    #[test]
    fn view_serializes_flat() {
        let mut session = session(6);
        session.start_with(Player::Red);
        session.mark_tutorial_seen();
        let json = serde_json::to_value(session.view()).expect("view serializes");
        assert_eq!(json["ai_pending"], serde_json::json!(false));
        assert_eq!(json["tutorial_seen"], serde_json::json!(true));
        assert!(json["state"]["board"].is_object());
    }

    #[test]
    fn full_session_against_ai() {
        let mut session = session(7);
        let mut stand_in = AiAgent::with_seed(AiConfig::default(), 99);
        session.start();

        for _ in 0..400 {
            if session.machine().state().is_finished() {
                break;
            }
            match session.pending() {
                Some(pending) => {
                    session.run_ai(pending.ticket).expect("ai acts");
                }
                None => {
                    let state = session.machine().state();
                    let action = stand_in
                        .decide_action(state, Player::Red)
                        .action
                        .expect("human stand-in acts");
                    session.submit(Player::Red, action).expect("legal action");
                }
            }
            assert_eq!(session.machine().state().integrity_check(), Ok(()));
        }

        if session.machine().state().is_finished() {
            let won = session.machine().state().outcome.as_ref().and_then(|o| o.winner());
            let total = session.lifetime_stats().total;
            assert_eq!(total, u32::from(won.is_some()));
        }
    }
}
