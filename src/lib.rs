pub mod ai;
pub mod game;
pub mod storage;

use std::cell::RefCell;
use std::rc::Rc;
use std::str::FromStr;

use gloo_timers::future::TimeoutFuture;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::Promise;

pub use ai::{AiAgent, AiConfig, AiDecision, AiPace, AiScheduler, GameAction, PendingDecision};
pub use game::{
    ActionResolution, AggregateStats, AnimalType, GameConfig, GameEvent, GameMachine, GamePhase,
    GameSession, GameState, IntegrityError, MemoryStatsStore, Outcome, Player, Position,
    RuleError, StatsStore, VictoryReason,
};
pub use storage::LocalStorageStats;

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
}

fn to_js_error(error: RuleError) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(serde_to_js_error)
}

fn parse_player(player: &str) -> Result<Player, JsValue> {
    Player::from_str(player).map_err(|_| JsValue::from_str(&format!("unknown player: {player}")))
}

fn ai_config_for(pace: Option<String>) -> AiConfig {
    pace.as_deref()
        .and_then(|value| AiPace::from_str(value).ok())
        .map(AiConfig::from_pace)
        .unwrap_or_default()
}

/// 浏览器中使用 localStorage，否则退回内存存储。
fn default_store() -> Box<dyn StatsStore> {
    match LocalStorageStats::open() {
        Some(store) => Box::new(store),
        None => Box::new(MemoryStatsStore::new()),
    }
}

#[wasm_bindgen]
pub struct GameEngine {
    session: Rc<RefCell<GameSession>>,
}

impl GameEngine {
    fn with_session<T, F>(&self, action: F) -> Result<T, JsValue>
    where
        F: FnOnce(&mut GameSession) -> Result<T, RuleError>,
    {
        let mut session = GameSession::lock(&self.session).map_err(to_js_error)?;
        action(&mut session).map_err(to_js_error)
    }

    fn submit_human(&self, action: GameAction) -> Result<String, JsValue> {
        let resolution = self.with_session(|session| {
            let human = session.human();
            session.submit(human, action)
        })?;
        to_json(&resolution)
    }
}

#[wasm_bindgen]
impl GameEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>, ai_pace: Option<String>) -> Result<GameEngine, JsValue> {
        let config: GameConfig = match config_json {
            Some(json) => serde_json::from_str(&json).map_err(serde_to_js_error)?,
            None => GameConfig::default(),
        };
        let session = GameSession::new(config, ai_config_for(ai_pace), default_store());
        Ok(GameEngine {
            session: Rc::new(RefCell::new(session)),
        })
    }

    pub fn start(&self) -> Result<String, JsValue> {
        let resolution = self.with_session(|session| Ok(session.start()))?;
        to_json(&resolution)
    }

    /// 人类玩家翻牌。
    pub fn flip(&self, x: u8, y: u8) -> Result<String, JsValue> {
        self.submit_human(GameAction::Flip {
            position: Position::new(x, y),
        })
    }

    #[wasm_bindgen(js_name = "move")]
    pub fn move_piece(&self, from_x: u8, from_y: u8, to_x: u8, to_y: u8) -> Result<String, JsValue> {
        self.submit_human(GameAction::Move {
            from: Position::new(from_x, from_y),
            to: Position::new(to_x, to_y),
        })
    }

    pub fn wait(&self, x: u8, y: u8) -> Result<String, JsValue> {
        self.submit_human(GameAction::Wait {
            position: Position::new(x, y),
        })
    }

    pub fn surrender(&self) -> Result<String, JsValue> {
        self.submit_human(GameAction::Surrender)
    }

    pub fn undo(&self) -> Result<String, JsValue> {
        let resolution = self.with_session(|session| {
            let human = session.human();
            session.undo(human)
        })?;
        to_json(&resolution)
    }

    /// 以 JSON 提交任意一方的行动，如 `{"type":"Flip","position":{"x":0,"y":0}}`。
    pub fn submit_json(&self, player: &str, action_json: &str) -> Result<String, JsValue> {
        let player = parse_player(player)?;
        let action: GameAction = serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        let resolution = self.with_session(|session| session.submit(player, action))?;
        to_json(&resolution)
    }

    pub fn view_json(&self) -> Result<String, JsValue> {
        let session = self
            .session
            .try_borrow()
            .map_err(|_| to_js_error(RuleError::ActionInFlight))?;
        to_json(&session.view())
    }

    pub fn lifetime_stats(&self) -> Result<JsValue, JsValue> {
        let stats = self.with_session(|session| Ok(session.lifetime_stats()))?;
        to_value(&stats).map_err(JsValue::from)
    }

    pub fn mark_tutorial_seen(&self) -> Result<(), JsValue> {
        self.with_session(|session| {
            session.mark_tutorial_seen();
            Ok(())
        })
    }

    pub fn ai_pending(&self) -> bool {
        self.session
            .try_borrow()
            .map(|session| session.pending().is_some())
            .unwrap_or(true)
    }

    /// 等待思考延迟后执行排队中的 AI 决策；没有待办时返回 `null`。
    pub fn think_ai(&self) -> Promise {
        let session = Rc::clone(&self.session);
        let pending = session
            .try_borrow()
            .ok()
            .and_then(|session| session.pending());

        future_to_promise(async move {
            let Some(pending) = pending else {
                return Ok(JsValue::NULL);
            };
            if pending.delay_ms > 0 {
                TimeoutFuture::new(pending.delay_ms).await;
            }
            let turn = GameSession::lock(&session)
                .map_err(to_js_error)?
                .run_ai(pending.ticket)
                .map_err(to_js_error)?;
            let json = to_json(&turn)?;
            web_sys::console::log_1(&format!("AI: {json}").into());
            Ok(JsValue::from_str(&json))
        })
    }
}

/// 按种子发一副新牌，返回等待首翻的局面。
#[wasm_bindgen(js_name = "createGameState")]
pub fn create_game_state(seed: Option<u64>) -> Result<JsValue, JsValue> {
    let mut machine = match seed {
        Some(seed) => GameMachine::with_seed(GameConfig::default(), seed),
        None => GameMachine::new(GameConfig::default()),
    };
    machine.start();
    to_value(machine.state()).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    state
        .integrity_check()
        .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))?;
    Ok(())
}

/// 列出某个明子的全部合法落点。
#[wasm_bindgen(js_name = "legalTargets")]
pub fn legal_targets(state: JsValue, x: u8, y: u8) -> Result<JsValue, JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    let from = Position::new(x, y);
    let targets = state
        .board
        .cell(from)
        .filter(|cell| cell.revealed)
        .and_then(|cell| cell.piece.as_ref())
        .map(|piece| game::rules::enumerate_targets(from, piece, &state.board, state.frozen.as_ref()))
        .unwrap_or_default();
    to_value(&targets).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "computeAiMove")]
pub fn compute_ai_move(
    state: JsValue,
    player: String,
    seed: Option<u64>,
) -> Result<JsValue, JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    let player = parse_player(&player)?;
    let config = AiConfig::from_pace(AiPace::Instant);
    let mut agent = match seed {
        Some(seed) => AiAgent::with_seed(config, seed),
        None => AiAgent::new(config),
    };
    let decision = agent.decide_action(&state, player);
    to_value(&decision).map_err(JsValue::from)
}

/// 洗一副牌，供前端调试发牌动画。
#[wasm_bindgen(js_name = "shuffledDeck")]
pub fn shuffled_deck(seed: u64) -> Result<JsValue, JsValue> {
    let mut rng = SmallRng::seed_from_u64(seed);
    to_value(&game::rules::build_shuffled_deck(&mut rng)).map_err(JsValue::from)
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
