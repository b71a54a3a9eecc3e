//! Store updates, change notifications and broadcast payloads.
//!
//! A [`RoomPatch`] is one atomic update to the room record, optionally
//! guarded by a [`WriteCondition`]. A [`RoomChange`] is what the store
//! emits after a successful write. A [`BroadcastMove`] is the ephemeral
//! fast-path message a mover publishes to the room topic.

use serde::{Deserialize, Serialize};

use crate::{Board, BoardSize, MoveRecord, PlayerId, Room, RoomId, RoomStatus, WireError};

/// A partial update to a room record, applied atomically.
///
/// `None` means "leave unchanged". Nullable fields use `Option<Option<_>>`
/// so that a patch can explicitly unset them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPatch {
    /// Assign the guest.
    pub guest_id: Option<PlayerId>,
    /// Replace the board.
    pub board: Option<Board>,
    /// Set or unset the turn holder.
    pub current_turn: Option<Option<PlayerId>>,
    /// Advance the status.
    pub status: Option<RoomStatus>,
    /// Set or unset the winner.
    pub winner_id: Option<Option<PlayerId>>,
    /// Clear the move log before appending.
    pub reset_history: bool,
    /// Moves appended to the log.
    pub append_moves: Vec<MoveRecord>,
}

impl RoomPatch {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the guest.
    pub fn guest(mut self, guest: PlayerId) -> Self {
        self.guest_id = Some(guest);
        self
    }

    /// Replace the board.
    pub fn board(mut self, board: Board) -> Self {
        self.board = Some(board);
        self
    }

    /// Set the turn holder (`None` unsets it).
    pub fn current_turn(mut self, turn: Option<PlayerId>) -> Self {
        self.current_turn = Some(turn);
        self
    }

    /// Set the status.
    pub fn status(mut self, status: RoomStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the winner (`None` records a draw or clears it).
    pub fn winner(mut self, winner: Option<PlayerId>) -> Self {
        self.winner_id = Some(winner);
        self
    }

    /// Clear the move log.
    pub fn reset_history(mut self) -> Self {
        self.reset_history = true;
        self
    }

    /// Append one move to the log.
    pub fn append_move(mut self, record: MoveRecord) -> Self {
        self.append_moves.push(record);
        self
    }

    /// Apply this patch to a room in place.
    pub fn apply_to(&self, room: &mut Room) {
        if let Some(guest) = self.guest_id {
            room.guest_id = Some(guest);
        }
        if let Some(board) = &self.board {
            room.board = board.clone();
        }
        if let Some(turn) = self.current_turn {
            room.current_turn = turn;
        }
        if let Some(status) = self.status {
            room.status = status;
        }
        if let Some(winner) = self.winner_id {
            room.winner_id = winner;
        }
        if self.reset_history {
            room.move_history.clear();
        }
        room.move_history.extend(self.append_moves.iter().cloned());
    }

    /// Check if applying this patch from `current` would break the
    /// `waiting -> playing -> finished` order.
    ///
    /// Rewriting the current status is allowed.
    pub fn breaks_lifecycle(&self, current: RoomStatus) -> bool {
        match self.status {
            Some(next) => next != current && !current.can_transition_to(next),
            None => false,
        }
    }

    /// Check if this patch writes the terminal `Finished` status.
    pub fn is_terminal(&self) -> bool {
        self.status == Some(RoomStatus::Finished)
    }
}

/// A single guard checked against the stored record before writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precondition {
    /// The host has not changed since read.
    HostIs(PlayerId),
    /// No guest has been assigned yet.
    GuestUnset,
    /// The room is in the given status.
    StatusIs(RoomStatus),
    /// The given participant holds the turn.
    TurnIs(PlayerId),
}

impl Precondition {
    /// Check this guard against a room.
    pub fn holds(&self, room: &Room) -> bool {
        match self {
            Precondition::HostIs(host) => room.host_id == *host,
            Precondition::GuestUnset => room.guest_id.is_none(),
            Precondition::StatusIs(status) => room.status == *status,
            Precondition::TurnIs(player) => room.current_turn == Some(*player),
        }
    }
}

/// Conjunction of [`Precondition`]s for an optimistic-concurrency write.
///
/// An empty condition always holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteCondition {
    checks: Vec<Precondition>,
}

impl WriteCondition {
    /// A condition that always holds.
    pub fn none() -> Self {
        Self::default()
    }

    /// Require the host to be unchanged.
    pub fn host_is(mut self, host: PlayerId) -> Self {
        self.checks.push(Precondition::HostIs(host));
        self
    }

    /// Require no guest.
    pub fn guest_unset(mut self) -> Self {
        self.checks.push(Precondition::GuestUnset);
        self
    }

    /// Require a status.
    pub fn status_is(mut self, status: RoomStatus) -> Self {
        self.checks.push(Precondition::StatusIs(status));
        self
    }

    /// Require a turn holder.
    pub fn turn_is(mut self, player: PlayerId) -> Self {
        self.checks.push(Precondition::TurnIs(player));
        self
    }

    /// The individual guards.
    pub fn checks(&self) -> &[Precondition] {
        &self.checks
    }

    /// The first guard that fails against `room`, if any.
    pub fn first_violation(&self, room: &Room) -> Option<Precondition> {
        self.checks.iter().copied().find(|c| !c.holds(room))
    }

    /// Check whether every guard holds.
    pub fn holds(&self, room: &Room) -> bool {
        self.first_violation(room).is_none()
    }
}

/// Change notification emitted by the store after a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomChange {
    /// The full record after the write.
    pub room: Room,
}

/// Fast-path move message published on the per-room topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastMove {
    /// The move that produced this state.
    pub last_move: MoveRecord,
    /// Board after the move.
    pub board: Board,
    /// Next turn holder, unset if the game ended.
    pub current_turn: Option<PlayerId>,
    /// Whether this move ended the game.
    pub game_ended: bool,
    /// Winner if the game ended with a win.
    pub winner_id: Option<PlayerId>,
    /// Participant that published this message.
    pub sender_id: PlayerId,
}

impl BroadcastMove {
    /// Event name used on the room topic.
    pub const EVENT: &'static str = "move";

    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        rmp_serde::to_vec(self).map_err(WireError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        rmp_serde::from_slice(bytes).map_err(WireError::Deserialization)
    }
}

/// Outcome record written once when a game ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameHistory {
    /// Room the game was played in.
    pub room_id: RoomId,
    /// Host.
    pub player1_id: PlayerId,
    /// Guest.
    pub player2_id: PlayerId,
    /// Winner, `None` for a draw.
    pub winner_id: Option<PlayerId>,
    /// Board dimension.
    pub board_size: BoardSize,
    /// Board at the end of the game.
    pub final_board: Board,
    /// Every accepted move in order.
    pub moves: Vec<MoveRecord>,
    /// Unix timestamp in milliseconds.
    pub finished_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cell, Mark};

    fn playing_room() -> (Room, PlayerId, PlayerId) {
        let host = PlayerId::new();
        let guest = PlayerId::new();
        let mut room = Room::new(RoomId::new(), "r", BoardSize::THREE, host);
        room.guest_id = Some(guest);
        room.status = RoomStatus::Playing;
        room.current_turn = Some(host);
        (room, host, guest)
    }

    #[test]
    fn patch_applies_only_set_fields() {
        let (mut room, host, guest) = playing_room();
        let before = room.clone();

        RoomPatch::new().current_turn(Some(guest)).apply_to(&mut room);

        assert_eq!(room.current_turn, Some(guest));
        assert_eq!(room.board, before.board);
        assert_eq!(room.status, before.status);
        assert_eq!(room.host_id, host);
    }

    #[test]
    fn patch_can_unset_turn() {
        let (mut room, host, _) = playing_room();
        RoomPatch::new()
            .current_turn(None)
            .status(RoomStatus::Finished)
            .winner(Some(host))
            .apply_to(&mut room);

        assert!(room.current_turn.is_none());
        assert_eq!(room.winner_id, Some(host));
        assert!(room.is_finished());
    }

    #[test]
    fn patch_status_follows_lifecycle() {
        let join = RoomPatch::new().status(RoomStatus::Playing);
        assert!(!join.breaks_lifecycle(RoomStatus::Waiting));
        assert!(!join.breaks_lifecycle(RoomStatus::Playing));
        assert!(join.breaks_lifecycle(RoomStatus::Finished));

        let finish = RoomPatch::new().status(RoomStatus::Finished);
        assert!(finish.breaks_lifecycle(RoomStatus::Waiting));
        assert!(!finish.breaks_lifecycle(RoomStatus::Playing));

        assert!(!RoomPatch::new().breaks_lifecycle(RoomStatus::Finished));
    }

    #[test]
    fn patch_appends_and_resets_history() {
        let (mut room, host, _) = playing_room();
        let record = MoveRecord {
            cell_index: 0,
            mark: Mark::X,
            mover_id: host,
            timestamp: 1,
        };
        RoomPatch::new().append_move(record.clone()).apply_to(&mut room);
        RoomPatch::new().append_move(record.clone()).apply_to(&mut room);
        assert_eq!(room.move_history.len(), 2);

        RoomPatch::new().reset_history().apply_to(&mut room);
        assert!(room.move_history.is_empty());
    }

    #[test]
    fn condition_reports_first_violation() {
        let (room, host, guest) = playing_room();
        let condition = WriteCondition::none()
            .status_is(RoomStatus::Playing)
            .turn_is(guest);

        assert!(!condition.holds(&room));
        assert_eq!(
            condition.first_violation(&room),
            Some(Precondition::TurnIs(guest))
        );
        assert!(WriteCondition::none().turn_is(host).holds(&room));
    }

    #[test]
    fn empty_condition_always_holds() {
        let (room, _, _) = playing_room();
        assert!(WriteCondition::none().holds(&room));
    }

    #[test]
    fn guest_unset_fails_once_joined() {
        let (room, host, _) = playing_room();
        let condition = WriteCondition::none().host_is(host).guest_unset();
        assert_eq!(
            condition.first_violation(&room),
            Some(Precondition::GuestUnset)
        );
    }

    #[test]
    fn broadcast_move_bytes_roundtrip() {
        let (room, host, guest) = playing_room();
        let mut board = room.board.clone();
        board.set(4, Cell::Marked(Mark::X));
        let msg = BroadcastMove {
            last_move: MoveRecord {
                cell_index: 4,
                mark: Mark::X,
                mover_id: host,
                timestamp: 1_705_000_000_000,
            },
            board,
            current_turn: Some(guest),
            game_ended: false,
            winner_id: None,
            sender_id: host,
        };

        let bytes = msg.to_bytes().unwrap();
        let restored = BroadcastMove::from_bytes(&bytes).unwrap();
        assert_eq!(msg, restored);
    }

    #[test]
    fn broadcast_move_rejects_garbage() {
        let result = BroadcastMove::from_bytes(&[0xc1, 0x00, 0x12]);
        assert!(matches!(result, Err(WireError::Deserialization(_))));
    }
}
