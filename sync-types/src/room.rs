//! The authoritative room record and its participants.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Board, BoardSize, Mark, PlayerId, RoomId};

/// Room lifecycle status.
///
/// Transitions only forward: `Waiting -> Playing -> Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Created by the host, no guest yet.
    Waiting,
    /// Both participants assigned, moves accepted.
    Playing,
    /// Terminal. No further mutation.
    Finished,
}

impl RoomStatus {
    /// Position in the lifecycle (0, 1, 2).
    pub fn rank(&self) -> u8 {
        match self {
            RoomStatus::Waiting => 0,
            RoomStatus::Playing => 1,
            RoomStatus::Finished => 2,
        }
    }

    /// Check whether `next` is the immediate successor of this status.
    pub fn can_transition_to(&self, next: RoomStatus) -> bool {
        matches!(
            (self, next),
            (RoomStatus::Waiting, RoomStatus::Playing) | (RoomStatus::Playing, RoomStatus::Finished)
        )
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomStatus::Waiting => write!(f, "waiting"),
            RoomStatus::Playing => write!(f, "playing"),
            RoomStatus::Finished => write!(f, "finished"),
        }
    }
}

/// A registered player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Stable unique identifier.
    pub id: PlayerId,
    /// Display name (not unique).
    pub display_name: String,
}

impl Player {
    /// Create a player with a fresh id.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            id: PlayerId::new(),
            display_name: display_name.into(),
        }
    }
}

/// One accepted move, kept for history/audit only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// Flat cell index.
    pub cell_index: usize,
    /// Mark placed.
    pub mark: Mark,
    /// Who moved.
    pub mover_id: PlayerId,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
}

/// The shared, persisted record for one game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Room identifier.
    pub id: RoomId,
    /// Human-readable room name.
    pub name: String,
    /// Creator; plays `X` and moves first.
    pub host_id: PlayerId,
    /// Second participant, unset until someone joins.
    pub guest_id: Option<PlayerId>,
    /// Current board.
    pub board: Board,
    /// Participant allowed to move next, unset once the game ends.
    pub current_turn: Option<PlayerId>,
    /// Lifecycle status.
    pub status: RoomStatus,
    /// Winner, set only for a finished non-draw game.
    pub winner_id: Option<PlayerId>,
    /// Append-only move log. Never consulted for legality.
    pub move_history: Vec<MoveRecord>,
}

impl Room {
    /// Create a room in `Waiting` with an all-empty board.
    pub fn new(id: RoomId, name: impl Into<String>, size: BoardSize, host_id: PlayerId) -> Self {
        Self {
            id,
            name: name.into(),
            host_id,
            guest_id: None,
            board: Board::empty(size),
            current_turn: None,
            status: RoomStatus::Waiting,
            winner_id: None,
            move_history: Vec::new(),
        }
    }

    /// Board dimension, fixed at creation.
    pub fn board_size(&self) -> BoardSize {
        self.board.size()
    }

    /// Check whether `id` is the host or the guest.
    pub fn is_participant(&self, id: PlayerId) -> bool {
        self.host_id == id || self.guest_id == Some(id)
    }

    /// The other participant, if both are assigned and `id` is one of them.
    pub fn opponent_of(&self, id: PlayerId) -> Option<PlayerId> {
        let guest = self.guest_id?;
        if id == self.host_id {
            Some(guest)
        } else if id == guest {
            Some(self.host_id)
        } else {
            None
        }
    }

    /// Mark played by `id`: host is `X`, guest is `O`.
    pub fn mark_for(&self, id: PlayerId) -> Option<Mark> {
        if id == self.host_id {
            Some(Mark::X)
        } else if self.guest_id == Some(id) {
            Some(Mark::O)
        } else {
            None
        }
    }

    /// Host and guest are the same identity (data corruption).
    pub fn is_self_play(&self) -> bool {
        self.guest_id == Some(self.host_id)
    }

    /// Check if the room has reached its terminal state.
    pub fn is_finished(&self) -> bool {
        self.status == RoomStatus::Finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined_room() -> (Room, PlayerId, PlayerId) {
        let host = PlayerId::new();
        let guest = PlayerId::new();
        let mut room = Room::new(RoomId::new(), "test", BoardSize::THREE, host);
        room.guest_id = Some(guest);
        (room, host, guest)
    }

    #[test]
    fn new_room_is_waiting_and_empty() {
        let room = Room::new(RoomId::new(), "lobby", BoardSize::FIVE, PlayerId::new());
        assert_eq!(room.status, RoomStatus::Waiting);
        assert_eq!(room.board.occupied_count(), 0);
        assert_eq!(room.board.cells().len(), 25);
        assert!(room.current_turn.is_none());
        assert!(room.guest_id.is_none());
    }

    #[test]
    fn marks_follow_roles() {
        let (room, host, guest) = joined_room();
        assert_eq!(room.mark_for(host), Some(Mark::X));
        assert_eq!(room.mark_for(guest), Some(Mark::O));
        assert_eq!(room.mark_for(PlayerId::new()), None);
    }

    #[test]
    fn opponent_lookup() {
        let (room, host, guest) = joined_room();
        assert_eq!(room.opponent_of(host), Some(guest));
        assert_eq!(room.opponent_of(guest), Some(host));
        assert_eq!(room.opponent_of(PlayerId::new()), None);
    }

    #[test]
    fn self_play_detected() {
        let host = PlayerId::new();
        let mut room = Room::new(RoomId::new(), "bad", BoardSize::THREE, host);
        assert!(!room.is_self_play());
        room.guest_id = Some(host);
        assert!(room.is_self_play());
    }

    #[test]
    fn status_transitions_only_forward() {
        assert!(RoomStatus::Waiting.can_transition_to(RoomStatus::Playing));
        assert!(RoomStatus::Playing.can_transition_to(RoomStatus::Finished));
        assert!(!RoomStatus::Finished.can_transition_to(RoomStatus::Playing));
        assert!(!RoomStatus::Playing.can_transition_to(RoomStatus::Waiting));
        assert!(!RoomStatus::Playing.can_transition_to(RoomStatus::Playing));
        assert!(!RoomStatus::Waiting.can_transition_to(RoomStatus::Finished));
    }

    #[test]
    fn room_json_roundtrip_keeps_board() {
        let (mut room, host, _) = joined_room();
        room.board.set(4, crate::Cell::Marked(Mark::X));
        room.current_turn = Some(host);
        let json = serde_json::to_string(&room).unwrap();
        let restored: Room = serde_json::from_str(&json).unwrap();
        assert_eq!(room, restored);
    }
}
