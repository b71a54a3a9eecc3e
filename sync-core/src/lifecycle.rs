//! Room lifecycle planning: create, join, leave.
//!
//! Each operation validates against a room snapshot and returns the patch
//! and write condition the client must send. The condition is what makes
//! a concurrent second writer fail with a conflict instead of clobbering.

use thiserror::Error;
use tictactoe_sync_types::{
    Board, BoardSize, GameHistory, PlayerId, Room, RoomId, RoomPatch, RoomStatus, WriteCondition,
};

/// Reasons a room cannot be created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CreateError {
    /// Room name is empty or whitespace.
    #[error("room name must not be blank")]
    BlankName,
}

/// Reasons a join is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    /// Another guest already holds the seat.
    #[error("room is already full")]
    AlreadyFull,
    /// Host tried to join their own room.
    #[error("cannot join your own room")]
    SelfJoin,
    /// Room is not waiting for a guest.
    #[error("room is not joinable (status: {status})")]
    NotJoinable {
        /// Current status.
        status: RoomStatus,
    },
    /// Stored room already has host == guest.
    #[error("invalid room configuration: host and guest are the same player")]
    InvalidRoomConfiguration,
}

impl JoinError {
    /// The room can no longer be played.
    pub fn is_fatal(&self) -> bool {
        matches!(self, JoinError::InvalidRoomConfiguration)
    }
}

/// Reasons a leave is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeaveError {
    /// Caller is neither host nor guest.
    #[error("player is not a participant in this room")]
    NotAParticipant,
    /// Stored room has host == guest.
    #[error("invalid room configuration: host and guest are the same player")]
    InvalidRoomConfiguration,
}

/// Write needed to take the guest seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinPlan {
    /// Caller is already the guest. Nothing to write.
    AlreadyJoined,
    /// Conditional update that assigns the seat and starts the game.
    Claim {
        /// Guest, status, turn, board and history reset.
        patch: RoomPatch,
        /// Host unchanged, seat free, still waiting.
        condition: WriteCondition,
    },
}

/// Write needed to leave a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeavePlan {
    /// Mid-game: the other participant wins by forfeit.
    Forfeit {
        /// Finished status, winner, unset turn.
        patch: RoomPatch,
        /// Still playing.
        condition: WriteCondition,
        /// Participant awarded the game.
        winner: PlayerId,
    },
    /// Waiting or finished: nothing to write, only unsubscribe.
    Detach,
}

/// Build a new room in `Waiting` with an empty board and no turn holder.
pub fn new_room(
    id: RoomId,
    name: &str,
    size: BoardSize,
    host: PlayerId,
) -> Result<Room, CreateError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CreateError::BlankName);
    }
    Ok(Room::new(id, name, size, host))
}

/// Validate a join and build its conditional write.
pub fn plan_join(room: &Room, guest: PlayerId) -> Result<JoinPlan, JoinError> {
    if room.is_self_play() {
        return Err(JoinError::InvalidRoomConfiguration);
    }
    if guest == room.host_id {
        return Err(JoinError::SelfJoin);
    }
    match room.guest_id {
        Some(existing) if existing == guest => return Ok(JoinPlan::AlreadyJoined),
        Some(_) => return Err(JoinError::AlreadyFull),
        None => {}
    }
    if room.status != RoomStatus::Waiting {
        return Err(JoinError::NotJoinable {
            status: room.status,
        });
    }

    let patch = RoomPatch::new()
        .guest(guest)
        .status(RoomStatus::Playing)
        .current_turn(Some(room.host_id))
        .board(Board::empty(room.board_size()))
        .winner(None)
        .reset_history();
    let condition = WriteCondition::none()
        .host_is(room.host_id)
        .guest_unset()
        .status_is(RoomStatus::Waiting);

    Ok(JoinPlan::Claim { patch, condition })
}

/// Validate a leave and build its write, if any.
pub fn plan_leave(room: &Room, leaver: PlayerId) -> Result<LeavePlan, LeaveError> {
    if room.is_self_play() {
        return Err(LeaveError::InvalidRoomConfiguration);
    }
    if !room.is_participant(leaver) {
        return Err(LeaveError::NotAParticipant);
    }
    if room.status != RoomStatus::Playing {
        return Ok(LeavePlan::Detach);
    }
    let winner = room
        .opponent_of(leaver)
        .ok_or(LeaveError::NotAParticipant)?;

    Ok(LeavePlan::Forfeit {
        patch: RoomPatch::new()
            .status(RoomStatus::Finished)
            .winner(Some(winner))
            .current_turn(None),
        condition: WriteCondition::none().status_is(RoomStatus::Playing),
        winner,
    })
}

/// Outcome record for a finished room.
///
/// `None` unless the room is finished and both seats are filled.
pub fn history_record(room: &Room, finished_at: u64) -> Option<GameHistory> {
    if !room.is_finished() {
        return None;
    }
    Some(GameHistory {
        room_id: room.id,
        player1_id: room.host_id,
        player2_id: room.guest_id?,
        winner_id: room.winner_id,
        board_size: room.board_size(),
        final_board: room.board.clone(),
        moves: room.move_history.clone(),
        finished_at,
    })
}
