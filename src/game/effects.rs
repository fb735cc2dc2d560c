use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::state::{
    Ability, AnimalType, CaptureKind, FrozenUnits, GameEvent, GameState, Piece, Player, Position,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EffectTrigger {
    /// 棋子被翻开。
    OnFlip,
    /// 棋子即将被吃。
    OnAttacked,
    /// 棋子吃掉了对方棋子。
    OnCapture,
    /// 棋子完成一次移动。
    OnMove,
}

/// 各兽类的特殊能力。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AbilityEffect {
    DogAlert,
    RatAmbush,
    CatEscape,
    LionRoar,
    Evolution,
}

impl AbilityEffect {
    /// 棋子在该时机是否有可触发的能力；一次性能力已用过则返回 `None`。
    pub fn triggered_by(piece: &Piece, trigger: EffectTrigger) -> Option<Self> {
        match (trigger, piece.animal) {
            (EffectTrigger::OnFlip, AnimalType::Dog) => Some(AbilityEffect::DogAlert),
            (EffectTrigger::OnFlip, AnimalType::Rat) if piece.ability_ready() => {
                Some(AbilityEffect::RatAmbush)
            }
            (EffectTrigger::OnAttacked, AnimalType::Cat) if piece.ability_ready() => {
                Some(AbilityEffect::CatEscape)
            }
            (EffectTrigger::OnCapture, AnimalType::Lion) => Some(AbilityEffect::LionRoar),
            (EffectTrigger::OnMove, AnimalType::Tiger) => Some(AbilityEffect::Evolution),
            _ => None,
        }
    }

    pub fn apply<R: Rng + ?Sized>(
        self,
        ctx: &EffectContext,
        state: &mut GameState,
        rng: &mut R,
    ) -> EffectResolution {
        tracing::trace!(
            effect = ?self,
            trigger = ?ctx.trigger,
            source = %ctx.source,
            "ability triggered"
        );
        match self {
            AbilityEffect::DogAlert => dog_alert(ctx, state),
            AbilityEffect::RatAmbush => rat_ambush(ctx, state),
            AbilityEffect::CatEscape => cat_escape(ctx, state, rng),
            AbilityEffect::LionRoar => lion_roar(ctx, state),
            AbilityEffect::Evolution => evolution(ctx, state),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EffectContext {
    pub trigger: EffectTrigger,
    /// 当前行动方。
    pub actor: Player,
    /// 能力来源棋子所在格。
    pub source: Position,
    pub target_player: Option<Player>,
}

impl EffectContext {
    pub fn new(trigger: EffectTrigger, actor: Player, source: Position) -> Self {
        Self {
            trigger,
            actor,
            source,
            target_player: None,
        }
    }

    pub fn with_target_player(mut self, player: Player) -> Self {
        self.target_player = Some(player);
        self
    }
}

#[derive(Default, Debug, Clone)]
pub struct EffectResolution {
    pub events: Vec<GameEvent>,
    pub captured: bool,
}

impl EffectResolution {
    fn from_events(events: Vec<GameEvent>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }
}

/// 翻开己方的狗时，额外翻开第一个仍未翻开的相邻格。
fn dog_alert(ctx: &EffectContext, state: &mut GameState) -> EffectResolution {
    let owned_by_actor = state
        .board
        .piece(ctx.source)
        .is_some_and(|dog| dog.owner == ctx.actor);
    if !owned_by_actor {
        return EffectResolution::default();
    }

    let hidden_neighbor = ctx.source.neighbors().find(|pos| {
        state
            .board
            .cell(*pos)
            .is_some_and(|cell| !cell.revealed)
    });
    let Some(position) = hidden_neighbor else {
        return EffectResolution::default();
    };

    let mut events = Vec::new();
    if let Some(cell) = state.board.cell_mut(position) {
        cell.revealed = true;
        if let Some(piece) = &cell.piece {
            events.push(GameEvent::DogAlert {
                position,
                animal: piece.animal,
            });
        }
    }
    EffectResolution::from_events(events)
}

/// 鼠被翻开时吃掉场上点数最高的敌方明子，不受常规吃子规则约束。
fn rat_ambush(ctx: &EffectContext, state: &mut GameState) -> EffectResolution {
    let Some(rat) = state.board.piece_mut(ctx.source) else {
        return EffectResolution::default();
    };
    rat.ability = Ability::Spent;
    let captor = rat.owner;

    let mut best: Option<(Position, u8)> = None;
    for (pos, piece) in state.board.revealed_pieces_of(captor.opponent()) {
        let rank = piece.animal.rank();
        if best.map_or(true, |(_, top)| rank > top) {
            best = Some((pos, rank));
        }
    }

    let Some((position, _)) = best else {
        return EffectResolution::default();
    };
    let Some(victim) = state.board.take(position) else {
        return EffectResolution::default();
    };

    let mut events = vec![GameEvent::Ambush {
        captor,
        position,
        victim: victim.animal,
    }];
    events.extend(state.capture_piece(victim, captor, position, CaptureKind::Ambush));
    EffectResolution {
        events,
        captured: true,
    }
}

/// 猫被吃时随机瞬移到一个已翻开的空格；无空格时照常被吃。
fn cat_escape<R: Rng + ?Sized>(
    ctx: &EffectContext,
    state: &mut GameState,
    rng: &mut R,
) -> EffectResolution {
    let empties = state.board.empty_positions();
    let Some(&refuge) = empties.choose(rng) else {
        return EffectResolution::default();
    };
    let Some(mut cat) = state.board.take(ctx.source) else {
        return EffectResolution::default();
    };

    cat.ability = Ability::Spent;
    let owner = cat.owner;
    state.board.put(refuge, cat);
    EffectResolution::from_events(vec![GameEvent::CatEscaped {
        owner,
        from: ctx.source,
        to: refuge,
    }])
}

/// 狮子吃子后，被吃方的猫和鼠在其下一回合无法行动。
fn lion_roar(ctx: &EffectContext, state: &mut GameState) -> EffectResolution {
    let Some(player) = ctx.target_player else {
        return EffectResolution::default();
    };
    let animals = vec![AnimalType::Cat, AnimalType::Rat];
    state.frozen = Some(FrozenUnits {
        player,
        animals: animals.clone(),
    });
    EffectResolution::from_events(vec![GameEvent::UnitsFrozen { player, animals }])
}

/// 虎原地进化为大虎，进化资格随之永久失效。
fn evolution(ctx: &EffectContext, state: &mut GameState) -> EffectResolution {
    let Some(tiger) = state.board.piece_mut(ctx.source) else {
        return EffectResolution::default();
    };
    if tiger.animal != AnimalType::Tiger {
        return EffectResolution::default();
    }
    tiger.animal = AnimalType::BigTiger;
    let player = tiger.owner;
    state.evo_available[player] = false;
    state.tiger_streak[player] = 0;
    tracing::debug!(%player, position = %ctx.source, "tiger evolved");
    EffectResolution::from_events(vec![GameEvent::Evolved {
        player,
        position: ctx.source,
    }])
}
