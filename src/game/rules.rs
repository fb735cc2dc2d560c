use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::state::{
    AnimalType, Board, Cell, FrozenUnits, IntegrityError, Piece, PieceId, Player, Position,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "type")]
pub enum RuleError {
    #[error("game has not been started")]
    GameNotStarted,
    #[error("game is already finished")]
    GameFinished,
    #[error("it is not {player}'s turn")]
    NotPlayerTurn { player: Player },
    #[error("another action is still being applied")]
    ActionInFlight,
    #[error("position {position} is off the board")]
    InvalidPosition { position: Position },
    #[error("cell {position} is already revealed")]
    AlreadyRevealed { position: Position },
    #[error("cell {position} is still face down")]
    CellHidden { position: Position },
    #[error("no piece at {position}")]
    NoPiece { position: Position },
    #[error("piece at {position} does not belong to {player}")]
    NotOwnPiece { player: Player, position: Position },
    #[error("the first action of the game must be a flip")]
    FlipRequired,
    #[error("{from} -> {to} is not a legal move")]
    IllegalMove { from: Position, to: Position },
    #[error("only a wolf can wait in place")]
    NotAWolf { position: Position },
    #[error("no earlier state to restore")]
    NothingToUndo,
    #[error("{player} has no undo credits left")]
    OutOfUndoCredits { player: Player },
    #[error("scheduled decision is no longer current")]
    StaleDecision,
    #[error("state failed integrity check: {error:?}")]
    IntegrityViolation { error: IntegrityError },
}

/// 一次进攻的结算方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clash {
    Capture,
    Trade,
}

/// 洗好的 16 张牌，红蓝各一套基础兽类。
pub fn build_shuffled_deck<R: Rng + ?Sized>(rng: &mut R) -> Vec<Piece> {
    let mut deck = Vec::with_capacity(AnimalType::BASE.len() * 2);
    let mut next_id: PieceId = 0;
    for animal in AnimalType::BASE {
        for owner in Player::ALL {
            deck.push(Piece::new(next_id, animal, owner));
            next_id += 1;
        }
    }
    deck.shuffle(rng);
    deck
}

pub fn new_board<R: Rng + ?Sized>(rng: &mut R) -> Board {
    Board::from_pieces(build_shuffled_deck(rng))
}

/// 兽类之间的克制关系，按优先级逐条匹配。
pub fn captures(attacker: AnimalType, defender: AnimalType) -> bool {
    use AnimalType::*;

    match (attacker, defender) {
        (Rat, Elephant) => true,
        (Elephant, Rat) => false,
        (BigTiger, Elephant) => false,
        (BigTiger, Lion) => true,
        (BigTiger, other) => other.rank() <= Tiger.rank(),
        (Elephant, BigTiger) => true,
        (_, BigTiger) => false,
        (attacker, defender) => attacker.rank() >= defender.rank(),
    }
}

pub fn can_capture(attacker: &Piece, target: &Cell) -> bool {
    if !target.revealed {
        return false;
    }
    match &target.piece {
        None => true,
        Some(defender) if defender.owner == attacker.owner || defender.is_immune() => false,
        Some(defender) => captures(attacker.animal, defender.animal),
    }
}

/// 已确认可以进攻后，判断是吃子还是兑子。
pub fn clash(attacker: AnimalType, defender: AnimalType) -> Clash {
    use AnimalType::*;

    match (attacker, defender) {
        (Rat, Elephant) | (Elephant, BigTiger) => Clash::Capture,
        (BigTiger, _) | (_, BigTiger) => Clash::Capture,
        (a, d) if a.rank() == d.rank() => Clash::Trade,
        _ => Clash::Capture,
    }
}

/// 终局对决的胜负关系：鼠克象、象克大虎，其余按点数。
pub fn outranks(a: AnimalType, b: AnimalType) -> bool {
    use AnimalType::*;

    match (a, b) {
        (Rat, Elephant) | (Elephant, BigTiger) => true,
        (Elephant, Rat) | (BigTiger, Elephant) => false,
        (a, b) => a.rank() > b.rank(),
    }
}

fn can_reach(from: Position, to: Position, piece: &Piece, board: &Board) -> bool {
    use AnimalType::*;

    let (dx, dy) = from.delta(to);
    match (piece.animal, dx, dy) {
        (_, 1, 0) | (_, 0, 1) => true,
        (BigTiger, 1, 1) => true,
        (BigTiger, 2, 0) | (BigTiger, 0, 2) => board.cell(from.midpoint(to)).is_some_and(|mid| {
            mid.is_open_empty()
                || mid
                    .piece
                    .as_ref()
                    .is_some_and(|jumped| jumped.owner != piece.owner)
        }),
        (Leopard, 2, 0) | (Leopard, 0, 2) => board
            .cell(from.midpoint(to))
            .is_some_and(Cell::is_open_empty),
        _ => false,
    }
}

pub fn enumerate_targets(
    from: Position,
    piece: &Piece,
    board: &Board,
    frozen: Option<&FrozenUnits>,
) -> Vec<Position> {
    if frozen.is_some_and(|frozen| frozen.applies_to(piece)) {
        return Vec::new();
    }

    let mut targets = Vec::new();
    for (to, cell) in board.cells() {
        if to == from {
            if piece.animal == AnimalType::Wolf {
                targets.push(to);
            }
            continue;
        }
        if !cell.revealed {
            continue;
        }
        if cell
            .piece
            .as_ref()
            .is_some_and(|other| other.owner == piece.owner)
        {
            continue;
        }
        if can_reach(from, to, piece, board) && can_capture(piece, cell) {
            targets.push(to);
        }
    }
    targets
}

/// 该阵营本回合是否至少有一个合法行动（翻牌或移动）。
pub fn has_legal_action(board: &Board, player: Player, frozen: Option<&FrozenUnits>) -> bool {
    if board.cells().any(|(_, cell)| !cell.revealed) {
        return true;
    }
    board
        .revealed_pieces_of(player)
        .any(|(pos, piece)| !enumerate_targets(pos, piece, board, frozen).is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    use AnimalType::*;

    fn piece(id: PieceId, animal: AnimalType, owner: Player) -> Piece {
        Piece::new(id, animal, owner)
    }

    fn open_cell(defender: Piece) -> Cell {
        Cell {
            piece: Some(defender),
            revealed: true,
        }
    }

    #[test]
    fn deck_has_one_of_each_per_side() {
        let mut rng = SmallRng::seed_from_u64(7);
        let deck = build_shuffled_deck(&mut rng);
        assert_eq!(deck.len(), 16);

        let kinds: HashSet<(AnimalType, Player)> =
            deck.iter().map(|piece| (piece.animal, piece.owner)).collect();
        assert_eq!(kinds.len(), 16, "each animal appears once per side");
        assert!(deck.iter().all(|piece| piece.animal != BigTiger));

        let ids: HashSet<PieceId> = deck.iter().map(|piece| piece.id).collect();
        assert_eq!(ids.len(), 16);
    }

    #[test]
    fn shuffle_depends_on_seed() {
        let a = build_shuffled_deck(&mut SmallRng::seed_from_u64(1));
        let b = build_shuffled_deck(&mut SmallRng::seed_from_u64(2));
        assert_ne!(a, b);
    }

    #[test]
    fn new_board_is_fully_hidden() {
        let board = new_board(&mut SmallRng::seed_from_u64(3));
        assert_eq!(board.hidden_positions().len(), 16);
        assert_eq!(board.piece_count(), 16);
    }

    #[test]
    fn rank_overrides() {
        assert!(captures(Rat, Elephant));
        assert!(!captures(Elephant, Rat));
        assert!(captures(Elephant, BigTiger));
        assert!(!captures(BigTiger, Elephant));
        assert!(captures(BigTiger, Lion));
        assert!(captures(BigTiger, Tiger));
        assert!(!captures(Lion, BigTiger));
        assert!(!captures(BigTiger, BigTiger));
        assert!(captures(Cat, Cat));
        assert!(!captures(Cat, Dog));
    }

    #[test]
    fn can_capture_respects_cell_state() {
        let attacker = piece(0, Lion, Player::Red);

        let hidden = Cell::hidden(piece(1, Rat, Player::Blue));
        assert!(!can_capture(&attacker, &hidden));

        let empty = Cell {
            piece: None,
            revealed: true,
        };
        assert!(can_capture(&attacker, &empty));

        assert!(!can_capture(&attacker, &open_cell(piece(2, Cat, Player::Red))));

        let mut wolf = piece(3, Wolf, Player::Blue);
        wolf.guard = crate::game::state::Guard::Immune;
        assert!(!can_capture(&attacker, &open_cell(wolf)));

        assert!(can_capture(&attacker, &open_cell(piece(4, Dog, Player::Blue))));
    }

    #[test]
    fn clash_kinds() {
        assert_eq!(clash(Dog, Dog), Clash::Trade);
        assert_eq!(clash(Lion, Dog), Clash::Capture);
        assert_eq!(clash(Rat, Elephant), Clash::Capture);
        assert_eq!(clash(Elephant, BigTiger), Clash::Capture);
    }

    #[test]
    fn showdown_dominance() {
        assert!(outranks(Rat, Elephant));
        assert!(!outranks(Elephant, Rat));
        assert!(outranks(Lion, Tiger));
        assert!(!outranks(Dog, Dog));
    }

    #[test]
    fn ordinary_piece_moves_one_step() {
        let mut board = Board::open();
        let from = Position::new(1, 1);
        let dog = piece(0, Dog, Player::Red);
        board.place(from, dog.clone());

        let targets: HashSet<Position> = enumerate_targets(from, &dog, &board, None)
            .into_iter()
            .collect();
        let expected: HashSet<Position> = [(1, 2), (1, 0), (2, 1), (0, 1)]
            .into_iter()
            .map(|(x, y)| Position::new(x, y))
            .collect();
        assert_eq!(targets, expected);
    }

    #[test]
    fn hidden_and_own_cells_are_skipped() {
        let mut board = Board::open();
        let from = Position::new(0, 0);
        let dog = piece(0, Dog, Player::Red);
        board.place(from, dog.clone());
        board.place(Position::new(1, 0), piece(1, Cat, Player::Red));
        if let Some(cell) = board.cell_mut(Position::new(0, 1)) {
            *cell = Cell::hidden(piece(2, Rat, Player::Blue));
        }

        assert!(enumerate_targets(from, &dog, &board, None).is_empty());
    }

    #[test]
    fn leopard_jumps_only_over_empty() {
        let mut board = Board::open();
        let from = Position::new(0, 0);
        let leopard = piece(0, Leopard, Player::Red);
        board.place(from, leopard.clone());
        board.place(Position::new(2, 0), piece(1, Dog, Player::Blue));
        board.place(Position::new(0, 1), piece(2, Cat, Player::Blue));
        board.place(Position::new(0, 2), piece(3, Rat, Player::Blue));

        let targets = enumerate_targets(from, &leopard, &board, None);
        assert!(targets.contains(&Position::new(2, 0)), "jump over empty");
        assert!(
            !targets.contains(&Position::new(0, 2)),
            "cannot jump over an occupied cell"
        );
        assert!(targets.contains(&Position::new(0, 1)), "plain capture");
    }

    #[test]
    fn big_tiger_jumps_enemies_and_moves_diagonally() {
        let mut board = Board::open();
        let from = Position::new(1, 1);
        let big = piece(0, BigTiger, Player::Red);
        board.place(from, big.clone());
        board.place(Position::new(1, 2), piece(1, Cat, Player::Blue));
        board.place(Position::new(1, 3), piece(2, Dog, Player::Blue));
        board.place(Position::new(2, 1), piece(3, Wolf, Player::Red));
        board.place(Position::new(3, 1), piece(4, Rat, Player::Blue));
        board.place(Position::new(2, 2), piece(5, Elephant, Player::Blue));
        board.place(Position::new(0, 0), piece(6, Lion, Player::Blue));

        let targets = enumerate_targets(from, &big, &board, None);
        assert!(targets.contains(&Position::new(1, 3)), "jump over enemy");
        assert!(
            !targets.contains(&Position::new(3, 1)),
            "cannot jump over own piece"
        );
        assert!(
            !targets.contains(&Position::new(2, 2)),
            "elephant stops the big tiger"
        );
        assert!(targets.contains(&Position::new(0, 0)), "diagonal lion kill");
    }

    #[test]
    fn big_tiger_jumps_face_down_enemy_but_not_face_down_ally() {
        let mut board = Board::open();
        let from = Position::new(0, 0);
        let big = piece(0, BigTiger, Player::Red);
        board.place(from, big.clone());
        if let Some(cell) = board.cell_mut(Position::new(1, 0)) {
            *cell = Cell::hidden(piece(1, Dog, Player::Blue));
        }
        if let Some(cell) = board.cell_mut(Position::new(0, 1)) {
            *cell = Cell::hidden(piece(2, Cat, Player::Red));
        }

        let targets = enumerate_targets(from, &big, &board, None);
        assert!(
            targets.contains(&Position::new(2, 0)),
            "face-down enemy can be jumped"
        );
        assert!(
            !targets.contains(&Position::new(0, 2)),
            "face-down own piece still blocks"
        );
        assert!(!targets.contains(&Position::new(1, 0)), "hidden cell is not a target");
    }

    #[test]
    fn wolf_can_target_itself() {
        let mut board = Board::open();
        let from = Position::new(3, 3);
        let wolf = piece(0, Wolf, Player::Blue);
        board.place(from, wolf.clone());
        assert!(enumerate_targets(from, &wolf, &board, None).contains(&from));
    }

    #[test]
    fn frozen_units_have_no_targets() {
        let mut board = Board::open();
        let from = Position::new(1, 1);
        let cat = piece(0, Cat, Player::Blue);
        board.place(from, cat.clone());
        let frozen = FrozenUnits {
            player: Player::Blue,
            animals: vec![Cat, Rat],
        };
        assert!(enumerate_targets(from, &cat, &board, Some(&frozen)).is_empty());

        let other_side = FrozenUnits {
            player: Player::Red,
            animals: vec![Cat, Rat],
        };
        assert!(!enumerate_targets(from, &cat, &board, Some(&other_side)).is_empty());
    }

    #[test]
    fn legal_action_detection() {
        let mut board = Board::open();
        board.place(Position::new(0, 0), piece(0, Cat, Player::Red));
        board.place(Position::new(1, 0), piece(1, Lion, Player::Blue));
        board.place(Position::new(0, 1), piece(2, Elephant, Player::Blue));
        assert!(!has_legal_action(&board, Player::Red, None));
        assert!(has_legal_action(&board, Player::Blue, None));

        if let Some(cell) = board.cell_mut(Position::new(3, 3)) {
            *cell = Cell::hidden(piece(3, Dog, Player::Blue));
        }
        assert!(has_legal_action(&board, Player::Red, None), "flip is available");
    }
}
