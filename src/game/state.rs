use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

/// 棋盘边长。
pub const GRID_SIZE: usize = 4;
/// 每方棋子数量。
pub const PIECES_PER_SIDE: usize = 8;
/// 全局棋子总数，棋盘与双方手牌之和恒等于该值。
pub const TOTAL_PIECES: usize = PIECES_PER_SIDE * 2;

/// 棋子标识，在一局内唯一。
pub type PieceId = u8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum AnimalType {
    Rat,
    Cat,
    Dog,
    Wolf,
    Leopard,
    Tiger,
    Lion,
    Elephant,
    BigTiger,
}

impl AnimalType {
    /// 发牌使用的八种基础兽类（不含进化形态）。
    pub const BASE: [AnimalType; PIECES_PER_SIDE] = [
        AnimalType::Rat,
        AnimalType::Cat,
        AnimalType::Dog,
        AnimalType::Wolf,
        AnimalType::Leopard,
        AnimalType::Tiger,
        AnimalType::Lion,
        AnimalType::Elephant,
    ];

    pub const fn rank(self) -> u8 {
        match self {
            AnimalType::Rat => 1,
            AnimalType::Cat => 2,
            AnimalType::Dog => 3,
            AnimalType::Wolf => 4,
            AnimalType::Leopard => 5,
            AnimalType::Tiger => 6,
            AnimalType::Lion => 7,
            AnimalType::Elephant => 8,
            AnimalType::BigTiger => 9,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            AnimalType::Rat => "rat",
            AnimalType::Cat => "cat",
            AnimalType::Dog => "dog",
            AnimalType::Wolf => "wolf",
            AnimalType::Leopard => "leopard",
            AnimalType::Tiger => "tiger",
            AnimalType::Lion => "lion",
            AnimalType::Elephant => "elephant",
            AnimalType::BigTiger => "bigTiger",
        }
    }

    /// 被吃入手牌时进化形态退回普通虎。
    pub const fn normalized(self) -> Self {
        match self {
            AnimalType::BigTiger => AnimalType::Tiger,
            other => other,
        }
    }
}

impl fmt::Display for AnimalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Player {
    Red,
    Blue,
}

impl Player {
    pub const ALL: [Player; 2] = [Player::Red, Player::Blue];

    pub const fn opponent(self) -> Self {
        match self {
            Player::Red => Player::Blue,
            Player::Blue => Player::Red,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Player::Red => "red",
            Player::Blue => "blue",
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Player {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "red" | "human" => Ok(Player::Red),
            "blue" | "ai" => Ok(Player::Blue),
            _ => Err(()),
        }
    }
}

/// 按阵营区分的一对数值（连击、进化标记、手牌等）。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PerPlayer<T> {
    pub red: T,
    pub blue: T,
}

impl<T> PerPlayer<T> {
    pub const fn new(red: T, blue: T) -> Self {
        Self { red, blue }
    }

    pub fn splat(value: T) -> Self
    where
        T: Clone,
    {
        Self {
            red: value.clone(),
            blue: value,
        }
    }
}

impl<T> Index<Player> for PerPlayer<T> {
    type Output = T;

    fn index(&self, player: Player) -> &T {
        match player {
            Player::Red => &self.red,
            Player::Blue => &self.blue,
        }
    }
}

impl<T> IndexMut<Player> for PerPlayer<T> {
    fn index_mut(&mut self, player: Player) -> &mut T {
        match player {
            Player::Red => &mut self.red,
            Player::Blue => &mut self.blue,
        }
    }
}

/// 猫、鼠的一次性技能状态。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Ability {
    #[default]
    Ready,
    Spent,
}

/// 狼原地潜伏后获得的免疫状态。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Guard {
    #[default]
    Vulnerable,
    Immune,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Piece {
    pub id: PieceId,
    pub animal: AnimalType,
    pub owner: Player,
    /// 发牌时的阵营；被吃后仍计入胜负统计。
    pub original_owner: Player,
    #[serde(default)]
    pub ability: Ability,
    #[serde(default)]
    pub guard: Guard,
}

impl Piece {
    pub fn new(id: PieceId, animal: AnimalType, owner: Player) -> Self {
        Self {
            id,
            animal,
            owner,
            original_owner: owner,
            ability: Ability::Ready,
            guard: Guard::Vulnerable,
        }
    }

    pub fn is_immune(&self) -> bool {
        self.guard == Guard::Immune
    }

    pub fn ability_ready(&self) -> bool {
        self.ability == Ability::Ready
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: u8,
    pub y: u8,
}

impl Position {
    /// 狗的警戒翻牌与 AI 安全检查共用的邻格顺序：下、上、右、左。
    pub const NEIGHBOR_OFFSETS: [(i8, i8); 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];

    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }

    pub fn is_on_board(self) -> bool {
        (self.x as usize) < GRID_SIZE && (self.y as usize) < GRID_SIZE
    }

    pub fn offset(self, dx: i8, dy: i8) -> Option<Position> {
        let x = self.x as i16 + dx as i16;
        let y = self.y as i16 + dy as i16;
        let limit = GRID_SIZE as i16;
        if (0..limit).contains(&x) && (0..limit).contains(&y) {
            Some(Position::new(x as u8, y as u8))
        } else {
            None
        }
    }

    pub fn neighbors(self) -> impl Iterator<Item = Position> {
        Self::NEIGHBOR_OFFSETS
            .into_iter()
            .filter_map(move |(dx, dy)| self.offset(dx, dy))
    }

    /// 行优先扫描顺序，"先找到者优先"的规则都依赖此顺序。
    pub fn all() -> impl Iterator<Item = Position> {
        (0..GRID_SIZE as u8).flat_map(|y| (0..GRID_SIZE as u8).map(move |x| Position::new(x, y)))
    }

    pub fn is_central(self) -> bool {
        (1..=2).contains(&self.x) && (1..=2).contains(&self.y)
    }

    pub fn delta(self, other: Position) -> (u8, u8) {
        (self.x.abs_diff(other.x), self.y.abs_diff(other.y))
    }

    /// 正交两格移动时被跨越的中间格。
    pub fn midpoint(self, other: Position) -> Position {
        Position::new(
            ((self.x as u16 + other.x as u16) / 2) as u8,
            ((self.y as u16 + other.y as u16) / 2) as u8,
        )
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cell {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub piece: Option<Piece>,
    pub revealed: bool,
}

impl Cell {
    pub fn hidden(piece: Piece) -> Self {
        Self {
            piece: Some(piece),
            revealed: false,
        }
    }

    pub fn is_open_empty(&self) -> bool {
        self.revealed && self.piece.is_none()
    }

    /// 已翻开且属于指定阵营的棋子。
    pub fn revealed_piece_of(&self, player: Player) -> Option<&Piece> {
        if !self.revealed {
            return None;
        }
        self.piece.as_ref().filter(|piece| piece.owner == player)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Board {
    cells: [[Cell; GRID_SIZE]; GRID_SIZE],
}

impl Board {
    /// 所有格子已翻开且为空的棋盘，供测试与残局构造使用。
    pub fn open() -> Self {
        let mut board = Board::default();
        for pos in Position::all() {
            if let Some(cell) = board.cell_mut(pos) {
                cell.revealed = true;
            }
        }
        board
    }

    pub fn from_pieces(pieces: Vec<Piece>) -> Self {
        let mut board = Board::default();
        for (pos, piece) in Position::all().zip(pieces) {
            if let Some(cell) = board.cell_mut(pos) {
                *cell = Cell::hidden(piece);
            }
        }
        board
    }

    pub fn cell(&self, pos: Position) -> Option<&Cell> {
        self.cells.get(pos.y as usize)?.get(pos.x as usize)
    }

    pub fn cell_mut(&mut self, pos: Position) -> Option<&mut Cell> {
        self.cells.get_mut(pos.y as usize)?.get_mut(pos.x as usize)
    }

    pub fn piece(&self, pos: Position) -> Option<&Piece> {
        self.cell(pos)?.piece.as_ref()
    }

    pub fn piece_mut(&mut self, pos: Position) -> Option<&mut Piece> {
        self.cell_mut(pos)?.piece.as_mut()
    }

    pub fn take(&mut self, pos: Position) -> Option<Piece> {
        self.cell_mut(pos)?.piece.take()
    }

    pub fn put(&mut self, pos: Position, piece: Piece) {
        if let Some(cell) = self.cell_mut(pos) {
            cell.piece = Some(piece);
        }
    }

    /// 在已翻开的格子上放置棋子。
    pub fn place(&mut self, pos: Position, piece: Piece) {
        if let Some(cell) = self.cell_mut(pos) {
            cell.piece = Some(piece);
            cell.revealed = true;
        }
    }

    pub fn cells(&self) -> impl Iterator<Item = (Position, &Cell)> {
        Position::all().filter_map(move |pos| self.cell(pos).map(|cell| (pos, cell)))
    }

    pub fn hidden_positions(&self) -> Vec<Position> {
        self.cells()
            .filter(|(_, cell)| !cell.revealed)
            .map(|(pos, _)| pos)
            .collect()
    }

    pub fn empty_positions(&self) -> Vec<Position> {
        self.cells()
            .filter(|(_, cell)| cell.is_open_empty())
            .map(|(pos, _)| pos)
            .collect()
    }

    pub fn revealed_pieces_of(&self, player: Player) -> impl Iterator<Item = (Position, &Piece)> {
        self.cells()
            .filter_map(move |(pos, cell)| cell.revealed_piece_of(player).map(|piece| (pos, piece)))
    }

    /// 棋盘上属于该阵营的棋子数（含未翻开的）。
    pub fn count_owned(&self, player: Player) -> usize {
        self.cells()
            .filter(|(_, cell)| cell.piece.as_ref().is_some_and(|piece| piece.owner == player))
            .count()
    }

    pub fn piece_count(&self) -> usize {
        self.cells().filter(|(_, cell)| cell.piece.is_some()).count()
    }

    pub fn find_piece(&self, id: PieceId) -> Option<Position> {
        self.cells()
            .find(|(_, cell)| cell.piece.as_ref().is_some_and(|piece| piece.id == id))
            .map(|(pos, _)| pos)
    }
}

/// 狮子吃子后对手被冻结的兽类。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrozenUnits {
    pub player: Player,
    pub animals: Vec<AnimalType>,
}

impl FrozenUnits {
    pub fn applies_to(&self, piece: &Piece) -> bool {
        self.player == piece.owner && self.animals.contains(&piece.animal)
    }
}

/// 游戏阶段。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum GamePhase {
    #[default]
    NotStarted,
    FirstTurnPending,
    InProgress,
    Terminal,
}

impl GamePhase {
    /// 静态阶段转换表。悔棋可从终局回到进行中。
    pub const fn can_transition_to(self, next: GamePhase) -> bool {
        matches!(
            (self, next),
            (GamePhase::NotStarted, GamePhase::FirstTurnPending)
                | (GamePhase::FirstTurnPending, GamePhase::InProgress)
                | (GamePhase::FirstTurnPending, GamePhase::Terminal)
                | (GamePhase::InProgress, GamePhase::Terminal)
                | (GamePhase::InProgress, GamePhase::FirstTurnPending)
                | (GamePhase::Terminal, GamePhase::InProgress)
                | (GamePhase::Terminal, GamePhase::FirstTurnPending)
                | (_, GamePhase::NotStarted)
        )
    }

    pub const fn accepts_actions(self) -> bool {
        matches!(self, GamePhase::FirstTurnPending | GamePhase::InProgress)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum VictoryReason {
    /// 手牌集齐对方全部八枚原始棋子。
    AllPiecesCaptured,
    /// 吃掉对方进化后的大虎。
    EvolutionKill,
    /// 棋盘无子且原始棋子全部被对方收走。
    ForcedConcession,
    /// 连续三回合无棋可走。
    Stalled,
    /// 终局对决中点数占优。
    Showdown,
    Surrender,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Outcome {
    Win {
        winner: Player,
        reason: VictoryReason,
    },
    Draw,
}

impl Outcome {
    pub fn winner(&self) -> Option<Player> {
        match self {
            Outcome::Win { winner, .. } => Some(*winner),
            Outcome::Draw => None,
        }
    }
}

/// 游戏事件流。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    GameStarted {
        first_player: Player,
    },
    Flipped {
        player: Player,
        position: Position,
        animal: AnimalType,
        owner: Player,
    },
    DogAlert {
        position: Position,
        animal: AnimalType,
    },
    Ambush {
        captor: Player,
        position: Position,
        victim: AnimalType,
    },
    Moved {
        player: Player,
        from: Position,
        to: Position,
        animal: AnimalType,
    },
    Captured {
        captor: Player,
        /// 被吃前的持有方；兑子时攻击方自己的棋子也会出现在这里。
        owner: Player,
        position: Position,
        animal: AnimalType,
    },
    Traded {
        captor: Player,
        attacker: AnimalType,
        defender: AnimalType,
    },
    CatEscaped {
        owner: Player,
        from: Position,
        to: Position,
    },
    UnitsFrozen {
        player: Player,
        animals: Vec<AnimalType>,
    },
    Evolved {
        player: Player,
        position: Position,
    },
    WolfWaited {
        player: Player,
        position: Position,
    },
    TurnSkipped {
        player: Player,
        count: u8,
        limit: u8,
    },
    Surrendered {
        player: Player,
    },
    Undone {
        player: Player,
        #[serde(skip_serializing_if = "Option::is_none")]
        remaining: Option<u8>,
    },
    GameOver {
        outcome: Outcome,
    },
}

impl GameEvent {
    pub fn summary(&self) -> String {
        match self {
            GameEvent::GameStarted { first_player } => {
                format!("Game started, {first_player} flips first")
            }
            GameEvent::Flipped {
                position,
                animal,
                owner,
                ..
            } => format!("Flipped {owner} {animal} at {position}"),
            GameEvent::DogAlert { position, animal } => {
                format!("Dog alert revealed {animal} at {position}")
            }
            GameEvent::Ambush {
                position, victim, ..
            } => format!("Rat ambushed {victim} at {position}"),
            GameEvent::Moved {
                from, to, animal, ..
            } => format!("Moved {animal} {from} -> {to}"),
            GameEvent::Captured {
                position, animal, ..
            } => format!("Captured {animal} at {position}"),
            GameEvent::Traded {
                attacker, defender, ..
            } => format!("Trade! {attacker} x {defender}"),
            GameEvent::CatEscaped { to, .. } => format!("Cat used 9 lives, escaped to {to}"),
            GameEvent::UnitsFrozen { player, .. } => format!("Lion roar froze {player} cat and rat"),
            GameEvent::Evolved { position, .. } => format!("Tiger evolved at {position}"),
            GameEvent::WolfWaited { position, .. } => {
                format!("Wolf stealth at {position} (immune)")
            }
            GameEvent::TurnSkipped {
                player,
                count,
                limit,
            } => format!("{player} has no moves, skipped ({count}/{limit})"),
            GameEvent::Surrendered { player } => format!("{player} surrendered"),
            GameEvent::Undone { remaining, .. } => match remaining {
                Some(left) => format!("Undo successful ({left} left)"),
                None => "Undo successful".to_string(),
            },
            GameEvent::GameOver { outcome } => match outcome {
                Outcome::Win { winner, reason } => format!("{winner} wins ({reason:?})"),
                Outcome::Draw => "Draw".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CaptureKind {
    Capture,
    Trade,
    Ambush,
}

/// 对局日志的一条记录。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub turn: u32,
    pub player: Player,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// 单局统计，终局展示用。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerStats {
    pub flips: u32,
    pub captures: u32,
    pub trades: u32,
    pub max_tiger_streak: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    PieceCountMismatch { expected: usize, actual: usize },
    HiddenCellEmpty { position: Position },
    DuplicatePieceId { id: PieceId },
    HandOwnerMismatch { player: Player, id: PieceId },
}

/// 游戏整体状态，悔棋快照即为其完整拷贝。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameState {
    pub board: Board,
    pub turn: Player,
    pub phase: GamePhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(default)]
    pub hands: PerPlayer<Vec<Piece>>,
    #[serde(default)]
    pub tiger_streak: PerPlayer<u8>,
    pub evo_available: PerPlayer<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frozen: Option<FrozenUnits>,
    #[serde(default)]
    pub no_move_counts: PerPlayer<u8>,
    #[serde(default)]
    pub no_capture_turns: u8,
    pub turn_number: u32,
    #[serde(default)]
    pub stats: PerPlayer<PlayerStats>,
}

impl GameState {
    pub fn new(board: Board, turn: Player) -> Self {
        Self {
            board,
            turn,
            phase: GamePhase::NotStarted,
            outcome: None,
            hands: PerPlayer::default(),
            tiger_streak: PerPlayer::default(),
            evo_available: PerPlayer::splat(true),
            frozen: None,
            no_move_counts: PerPlayer::default(),
            no_capture_turns: 0,
            turn_number: 1,
            stats: PerPlayer::default(),
        }
    }

    pub fn with_phase(mut self, phase: GamePhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn is_finished(&self) -> bool {
        self.phase == GamePhase::Terminal
    }

    pub fn hand(&self, player: Player) -> &[Piece] {
        &self.hands[player]
    }

    /// 该阵营手牌中来自对手的原始棋子数。
    pub fn captured_originals(&self, captor: Player) -> usize {
        self.hands[captor]
            .iter()
            .filter(|piece| piece.original_owner == captor.opponent())
            .count()
    }

    pub fn is_frozen(&self, piece: &Piece) -> bool {
        self.frozen
            .as_ref()
            .is_some_and(|frozen| frozen.applies_to(piece))
    }

    /// 把棋子收入吃子方手牌，并处理进化资格与胜负判定。
    pub fn capture_piece(
        &mut self,
        mut piece: Piece,
        captor: Player,
        position: Position,
        kind: CaptureKind,
    ) -> Vec<GameEvent> {
        let mut events = Vec::new();
        let prior_owner = piece.owner;
        let animal = piece.animal;

        if matches!(animal, AnimalType::Tiger | AnimalType::BigTiger) {
            self.evo_available[prior_owner] = false;
            self.tiger_streak[prior_owner] = 0;
        }

        piece.animal = animal.normalized();
        piece.owner = captor;
        piece.guard = Guard::Vulnerable;
        self.hands[captor].push(piece);
        if kind != CaptureKind::Trade {
            self.stats[captor].captures += 1;
        }
        events.push(GameEvent::Captured {
            captor,
            owner: prior_owner,
            position,
            animal,
        });

        if animal == AnimalType::BigTiger && prior_owner != captor {
            events.extend(self.declare_outcome(Outcome::Win {
                winner: captor,
                reason: VictoryReason::EvolutionKill,
            }));
        }
        if self.captured_originals(captor) == PIECES_PER_SIDE {
            events.extend(self.declare_outcome(Outcome::Win {
                winner: captor,
                reason: VictoryReason::AllPiecesCaptured,
            }));
        }
        events
    }

    /// 首个判定生效，之后的判定被忽略。
    pub fn declare_outcome(&mut self, outcome: Outcome) -> Option<GameEvent> {
        if self.outcome.is_some() {
            return None;
        }
        tracing::info!(?outcome, turn = self.turn_number, "game over");
        self.outcome = Some(outcome.clone());
        self.phase = GamePhase::Terminal;
        Some(GameEvent::GameOver { outcome })
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        let mut seen = HashSet::new();
        let mut total = 0;

        for (position, cell) in self.board.cells() {
            match &cell.piece {
                Some(piece) => {
                    total += 1;
                    if !seen.insert(piece.id) {
                        return Err(IntegrityError::DuplicatePieceId { id: piece.id });
                    }
                }
                None if !cell.revealed => {
                    return Err(IntegrityError::HiddenCellEmpty { position });
                }
                None => {}
            }
        }

        for player in Player::ALL {
            for piece in &self.hands[player] {
                total += 1;
                if piece.owner != player {
                    return Err(IntegrityError::HandOwnerMismatch {
                        player,
                        id: piece.id,
                    });
                }
                if !seen.insert(piece.id) {
                    return Err(IntegrityError::DuplicatePieceId { id: piece.id });
                }
            }
        }

        if total != TOTAL_PIECES {
            return Err(IntegrityError::PieceCountMismatch {
                expected: TOTAL_PIECES,
                actual: total,
            });
        }

        Ok(())
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(Board::default(), Player::Red)
    }
}
