//! Reconciliation of local state with remote updates.
//!
//! Three kinds of input reach a session: broadcast moves from the peer
//! (fast, best effort), change notifications from the store (durable),
//! and explicit authoritative reads (refresh). [`reconcile`] decides for
//! each whether to apply it, and reports a game end at most once.
//!
//! Ordering uses [`Progress`]: status rank first, then occupied cells.
//! Both only grow under legal play, so an update with lower progress
//! than the local view is older than it.

use tictactoe_sync_types::{
    Board, BroadcastMove, Mark, MoveRecord, PlayerId, Room, RoomChange, RoomStatus,
};

use crate::board;

/// What a session shows: board, turn, status and winner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameView {
    /// Board cells.
    pub board: Board,
    /// Turn holder, unset once the game ends.
    pub current_turn: Option<PlayerId>,
    /// Room status.
    pub status: RoomStatus,
    /// Winner, if the game ended with one.
    pub winner_id: Option<PlayerId>,
}

impl GameView {
    /// Project a room record onto a view.
    pub fn from_room(room: &Room) -> Self {
        Self {
            board: room.board.clone(),
            current_turn: room.current_turn,
            status: room.status,
            winner_id: room.winner_id,
        }
    }

    /// Ordering key for this view.
    pub fn progress(&self) -> Progress {
        Progress {
            status_rank: self.status.rank(),
            occupied: self.board.occupied_count(),
        }
    }

    /// Check if the game is over.
    pub fn is_finished(&self) -> bool {
        self.status == RoomStatus::Finished
    }
}

/// Monotonic ordering key: `(status rank, occupied cells)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Progress {
    /// `RoomStatus::rank`.
    pub status_rank: u8,
    /// Occupied cell count.
    pub occupied: usize,
}

/// How an update reached the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Fast-path broadcast from a participant.
    Broadcast {
        /// Participant that published it.
        sender: PlayerId,
    },
    /// Store change notification.
    Change,
    /// Explicit authoritative read.
    Refresh,
}

/// An update ready to reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    /// Where it came from.
    pub origin: Origin,
    /// State it describes.
    pub view: GameView,
    /// Most recent move, if known.
    pub last_move: Option<MoveRecord>,
}

impl Incoming {
    /// Wrap a broadcast move.
    pub fn broadcast(msg: &BroadcastMove) -> Self {
        let status = if msg.game_ended {
            RoomStatus::Finished
        } else {
            RoomStatus::Playing
        };
        Self {
            origin: Origin::Broadcast {
                sender: msg.sender_id,
            },
            view: GameView {
                board: msg.board.clone(),
                current_turn: msg.current_turn,
                status,
                winner_id: msg.winner_id,
            },
            last_move: Some(msg.last_move.clone()),
        }
    }

    /// Wrap a store change notification.
    pub fn change(change: &RoomChange) -> Self {
        Self {
            origin: Origin::Change,
            view: GameView::from_room(&change.room),
            last_move: change.room.move_history.last().cloned(),
        }
    }

    /// Wrap an authoritative read.
    pub fn refresh(room: &Room) -> Self {
        Self {
            origin: Origin::Refresh,
            view: GameView::from_room(room),
            last_move: room.move_history.last().cloned(),
        }
    }
}

/// Who is reconciling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileContext {
    /// Local participant.
    pub me: PlayerId,
    /// Local participant's mark.
    pub my_mark: Mark,
    /// A local optimistic move is awaiting its durable write.
    pub move_pending: bool,
}

/// Why an update was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Same state as local.
    Duplicate,
    /// Our own broadcast.
    SelfOrigin,
    /// Older than local.
    Stale,
}

/// Final state of a game as seen by one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameResult {
    /// Winner, `None` for a draw.
    pub winner_id: Option<PlayerId>,
    /// Cells of the completed line, if the game was won on the board.
    pub winning_line: Option<Vec<usize>>,
    /// Winner got the game because the other participant left.
    pub forfeit: bool,
    /// Board at the end.
    pub final_board: Board,
}

impl GameResult {
    /// Derive the result from a finished view.
    ///
    /// `me`/`my_mark` resolve which mark the winner played.
    pub fn evaluate(view: &GameView, me: PlayerId, my_mark: Mark) -> Self {
        let winning_line = view.winner_id.and_then(|winner| {
            let mark = if winner == me { my_mark } else { my_mark.other() };
            board::winning_line(&view.board, mark)
        });
        Self {
            winner_id: view.winner_id,
            forfeit: view.winner_id.is_some() && winning_line.is_none(),
            winning_line,
            final_board: view.board.clone(),
        }
    }

    /// Check if `player` won.
    pub fn is_winner(&self, player: PlayerId) -> bool {
        self.winner_id == Some(player)
    }

    /// Check if the game was drawn.
    pub fn is_draw(&self) -> bool {
        self.winner_id.is_none()
    }
}

/// What the session should do with an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Drop it; local state stands.
    Ignored(IgnoreReason),
    /// Older than a pending local move; wait for the write to settle.
    Deferred,
    /// Replace local state with the incoming one.
    Applied {
        /// Opponent move carried by the update, if any.
        opponent_move: Option<MoveRecord>,
        /// Set only on the transition into `Finished`.
        game_result: Option<GameResult>,
    },
}

/// Reconciled state plus the action taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// State after reconciling.
    pub view: GameView,
    /// What happened.
    pub action: ReconcileAction,
}

impl Reconciled {
    fn keep(local: &GameView, action: ReconcileAction) -> Self {
        Self {
            view: local.clone(),
            action,
        }
    }

    /// Check if local state changed.
    pub fn is_applied(&self) -> bool {
        matches!(self.action, ReconcileAction::Applied { .. })
    }
}

/// Merge an incoming update into the local view.
///
/// Rules, in order:
/// - own broadcasts are ignored
/// - an update equal to local state is a duplicate
/// - broadcasts and change notifications not ahead of local are stale
/// - while a local move is pending, an update behind it is deferred
/// - anything else is applied; entering `Finished` yields a [`GameResult`]
pub fn reconcile(local: &GameView, incoming: &Incoming, ctx: ReconcileContext) -> Reconciled {
    if let Origin::Broadcast { sender } = incoming.origin {
        if sender == ctx.me {
            return Reconciled::keep(local, ReconcileAction::Ignored(IgnoreReason::SelfOrigin));
        }
    }

    if incoming.view == *local {
        return Reconciled::keep(local, ReconcileAction::Ignored(IgnoreReason::Duplicate));
    }

    let ahead = incoming.view.progress().cmp(&local.progress());

    match incoming.origin {
        Origin::Broadcast { .. } => {
            if ahead.is_le() {
                return Reconciled::keep(local, ReconcileAction::Ignored(IgnoreReason::Stale));
            }
            if ctx.move_pending {
                return Reconciled::keep(local, ReconcileAction::Deferred);
            }
        }
        Origin::Change => {
            if ahead.is_lt() {
                let action = if ctx.move_pending {
                    ReconcileAction::Deferred
                } else {
                    ReconcileAction::Ignored(IgnoreReason::Stale)
                };
                return Reconciled::keep(local, action);
            }
        }
        Origin::Refresh => {
            if ctx.move_pending && ahead.is_lt() {
                return Reconciled::keep(local, ReconcileAction::Deferred);
            }
        }
    }

    let opponent_move = incoming
        .last_move
        .clone()
        .filter(|m| m.mover_id != ctx.me)
        .filter(|m| local.board.get(m.cell_index).is_some_and(|c| c.is_empty()));

    let game_result = (incoming.view.is_finished() && !local.is_finished())
        .then(|| GameResult::evaluate(&incoming.view, ctx.me, ctx.my_mark));

    Reconciled {
        view: incoming.view.clone(),
        action: ReconcileAction::Applied {
            opponent_move,
            game_result,
        },
    }
}
