//! Turn coordinator: who may move, and what a move changes.
//!
//! A move is legal only if the room is `Playing`, the mover holds the
//! turn, the mover is a participant, and the target cell is empty. A room
//! whose host and guest are the same identity refuses every move.
//!
//! [`plan_move`] turns a legal request into a [`MovePlan`]: the new board,
//! the next turn holder, and the durable patch/broadcast the client sends.
//! Nothing here mutates the room.

use thiserror::Error;
use tictactoe_sync_types::{
    Board, BroadcastMove, Mark, MoveRecord, PlayerId, Room, RoomPatch, RoomStatus,
    WriteCondition,
};

use crate::board::{self, IllegalMove, Outcome};

/// Reasons a move request is refused. None of them change state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    /// Index past the end of the board.
    #[error("cell {index} is out of range (board has {cells} cells)")]
    OutOfRange {
        /// Requested index.
        index: usize,
        /// Number of cells on the board.
        cells: usize,
    },
    /// Target cell already holds a mark.
    #[error("cell {index} is already occupied")]
    CellOccupied {
        /// Requested index.
        index: usize,
    },
    /// Another participant holds the turn.
    #[error("not your turn")]
    NotYourTurn,
    /// Room is not in `Playing`.
    #[error("game is not active (status: {status})")]
    GameNotActive {
        /// Current status.
        status: RoomStatus,
    },
    /// Mover is neither host nor guest.
    #[error("player is not a participant in this room")]
    NotAParticipant,
    /// Host and guest are the same identity. Fatal to the room.
    #[error("invalid room configuration: host and guest are the same player")]
    InvalidRoomConfiguration,
}

impl MoveError {
    /// The room can no longer be played.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MoveError::InvalidRoomConfiguration)
    }
}

impl From<IllegalMove> for MoveError {
    fn from(err: IllegalMove) -> Self {
        match err {
            IllegalMove::OutOfRange { index, cells } => MoveError::OutOfRange { index, cells },
            IllegalMove::CellOccupied { index } => MoveError::CellOccupied { index },
        }
    }
}

/// Result of evaluating the board after a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Next turn holder, `None` once the game ends.
    pub next_turn: Option<PlayerId>,
    /// Winner, set only for a win.
    pub winner: Option<PlayerId>,
    /// Status after the move.
    pub status: RoomStatus,
    /// How the game ended, if it did.
    pub outcome: Option<Outcome>,
}

impl TurnOutcome {
    /// Check if this move ended the game.
    pub fn is_terminal(&self) -> bool {
        self.status == RoomStatus::Finished
    }
}

/// Reject rooms that must never be played.
pub fn check_configuration(room: &Room) -> Result<(), MoveError> {
    if room.is_self_play() {
        return Err(MoveError::InvalidRoomConfiguration);
    }
    Ok(())
}

/// Check every precondition of a move and return the mover's mark.
pub fn validate_move(room: &Room, mover: PlayerId, index: usize) -> Result<Mark, MoveError> {
    check_configuration(room)?;

    if room.status != RoomStatus::Playing {
        return Err(MoveError::GameNotActive {
            status: room.status,
        });
    }

    let mark = room.mark_for(mover).ok_or(MoveError::NotAParticipant)?;

    if room.current_turn != Some(mover) {
        return Err(MoveError::NotYourTurn);
    }

    match room.board.get(index) {
        None => Err(MoveError::OutOfRange {
            index,
            cells: room.board.cells().len(),
        }),
        Some(cell) if !cell.is_empty() => Err(MoveError::CellOccupied { index }),
        Some(_) => Ok(mark),
    }
}

/// Derive the next turn holder from the board after `mover` played.
///
/// Win or draw ends the game: the turn is unset and the winner is the
/// mover on a win, unset on a draw. Otherwise the turn passes to the
/// other participant.
pub fn next_turn(
    room: &Room,
    mover: PlayerId,
    board_after: &Board,
) -> Result<TurnOutcome, MoveError> {
    check_configuration(room)?;
    let mark = room.mark_for(mover).ok_or(MoveError::NotAParticipant)?;

    match board::outcome(board_after, mark) {
        Some(outcome) => {
            let winner = match outcome {
                Outcome::Win { .. } => Some(mover),
                Outcome::Draw => None,
            };
            Ok(TurnOutcome {
                next_turn: None,
                winner,
                status: RoomStatus::Finished,
                outcome: Some(outcome),
            })
        }
        None => {
            let other = room.opponent_of(mover).ok_or(MoveError::NotAParticipant)?;
            Ok(TurnOutcome {
                next_turn: Some(other),
                winner: None,
                status: RoomStatus::Playing,
                outcome: None,
            })
        }
    }
}

/// A validated move and everything it changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    /// The move itself.
    pub record: MoveRecord,
    /// Board after the move.
    pub board: Board,
    /// Turn/status/winner after the move.
    pub turn: TurnOutcome,
}

impl MovePlan {
    /// The single atomic update for the durable path.
    pub fn patch(&self) -> RoomPatch {
        RoomPatch::new()
            .board(self.board.clone())
            .current_turn(self.turn.next_turn)
            .status(self.turn.status)
            .winner(self.turn.winner)
            .append_move(self.record.clone())
    }

    /// Guard for the durable write: still playing, mover still holds the turn.
    ///
    /// Once one terminal write lands the status is `Finished` and the turn is
    /// unset, so a second write from the same mover fails the guard.
    pub fn condition(&self) -> WriteCondition {
        WriteCondition::none()
            .status_is(RoomStatus::Playing)
            .turn_is(self.record.mover_id)
    }

    /// Fast-path message for the room topic.
    pub fn broadcast(&self) -> BroadcastMove {
        BroadcastMove {
            last_move: self.record.clone(),
            board: self.board.clone(),
            current_turn: self.turn.next_turn,
            game_ended: self.turn.is_terminal(),
            winner_id: self.turn.winner,
            sender_id: self.record.mover_id,
        }
    }

    /// The room as it looks once the move is committed.
    pub fn apply_to(&self, room: &Room) -> Room {
        let mut next = room.clone();
        self.patch().apply_to(&mut next);
        next
    }
}

/// Validate a move request and compute its effects.
pub fn plan_move(
    room: &Room,
    mover: PlayerId,
    index: usize,
    timestamp: u64,
) -> Result<MovePlan, MoveError> {
    let mark = validate_move(room, mover, index)?;
    let board = board::apply_move(&room.board, index, mark)?;
    let turn = next_turn(room, mover, &board)?;
    Ok(MovePlan {
        record: MoveRecord {
            cell_index: index,
            mark,
            mover_id: mover,
            timestamp,
        },
        board,
        turn,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tictactoe_sync_types::{BoardSize, Cell, RoomId};

    fn playing(size: BoardSize) -> (Room, PlayerId, PlayerId) {
        let host = PlayerId::new();
        let guest = PlayerId::new();
        let mut room = Room::new(RoomId::new(), "t", size, host);
        room.guest_id = Some(guest);
        room.status = RoomStatus::Playing;
        room.current_turn = Some(host);
        (room, host, guest)
    }

    /// Play `moves` alternately starting with the turn holder.
    fn play(room: &mut Room, moves: &[usize]) -> Vec<MovePlan> {
        let mut plans = Vec::new();
        for (i, &index) in moves.iter().enumerate() {
            let mover = room.current_turn.expect("game ended early");
            let plan = plan_move(room, mover, index, i as u64).unwrap();
            *room = plan.apply_to(room);
            plans.push(plan);
        }
        plans
    }

    // ===========================================
    // Legality
    // ===========================================

    #[test]
    fn wrong_turn_is_rejected_without_change() {
        let (room, _, guest) = playing(BoardSize::THREE);
        let before = room.clone();
        assert_eq!(plan_move(&room, guest, 0, 0), Err(MoveError::NotYourTurn));
        assert_eq!(room, before);
    }

    #[test]
    fn outsider_is_not_a_participant() {
        let (room, _, _) = playing(BoardSize::THREE);
        assert_eq!(
            plan_move(&room, PlayerId::new(), 0, 0),
            Err(MoveError::NotAParticipant)
        );
    }

    #[test]
    fn waiting_room_is_not_active() {
        let host = PlayerId::new();
        let room = Room::new(RoomId::new(), "w", BoardSize::THREE, host);
        assert_eq!(
            plan_move(&room, host, 0, 0),
            Err(MoveError::GameNotActive {
                status: RoomStatus::Waiting
            })
        );
    }

    #[test]
    fn occupied_and_out_of_range_are_illegal() {
        let (mut room, host, _) = playing(BoardSize::THREE);
        room.board.set(0, Cell::Marked(Mark::O));

        let err = plan_move(&room, host, 0, 0).unwrap_err();
        assert_eq!(err, MoveError::CellOccupied { index: 0 });
        assert!(!err.is_fatal());

        let err = plan_move(&room, host, 42, 0).unwrap_err();
        assert_eq!(err, MoveError::OutOfRange { index: 42, cells: 9 });
    }

    #[test]
    fn self_play_room_refuses_every_move() {
        let host = PlayerId::new();
        let mut room = Room::new(RoomId::new(), "corrupt", BoardSize::THREE, host);
        room.guest_id = Some(host);
        room.status = RoomStatus::Playing;
        room.current_turn = Some(host);
        let before = room.clone();

        for index in 0..9 {
            let err = plan_move(&room, host, index, 0).unwrap_err();
            assert_eq!(err, MoveError::InvalidRoomConfiguration);
            assert!(err.is_fatal());
        }
        assert_eq!(room, before);
    }

    // ===========================================
    // Turn progression
    // ===========================================

    #[test]
    fn turn_alternates_until_terminal() {
        let (mut room, host, guest) = playing(BoardSize::THREE);
        // X: 0, 1, 2 wins on the last move; O: 3, 4
        let plans = play(&mut room, &[0, 3, 1, 4, 2]);

        let turns: Vec<_> = plans.iter().map(|p| p.turn.next_turn).collect();
        assert_eq!(
            turns,
            vec![Some(guest), Some(host), Some(guest), Some(host), None]
        );
    }

    #[test]
    fn host_top_row_wins() {
        let (mut room, host, _) = playing(BoardSize::THREE);
        let plans = play(&mut room, &[0, 3, 1, 4, 2]);

        let last = plans.last().unwrap();
        assert!(board::check_win(&last.board, Mark::X));
        assert_eq!(room.status, RoomStatus::Finished);
        assert_eq!(room.winner_id, Some(host));
        assert!(room.current_turn.is_none());
        assert_eq!(
            last.turn.outcome,
            Some(Outcome::Win {
                mark: Mark::X,
                line: vec![0, 1, 2]
            })
        );
    }

    #[test]
    fn full_board_without_line_is_a_draw() {
        let (mut room, _, _) = playing(BoardSize::THREE);
        // X O X / X O O / O X X
        play(&mut room, &[0, 1, 2, 4, 3, 5, 7, 6, 8]);

        assert!(board::is_draw(&room.board));
        assert_eq!(room.status, RoomStatus::Finished);
        assert!(room.winner_id.is_none());
        assert!(room.current_turn.is_none());
        assert_eq!(room.move_history.len(), 9);
    }

    #[test]
    fn no_moves_after_finished() {
        let (mut room, host, guest) = playing(BoardSize::THREE);
        play(&mut room, &[0, 3, 1, 4, 2]);
        for who in [host, guest] {
            assert!(matches!(
                plan_move(&room, who, 8, 0),
                Err(MoveError::GameNotActive { .. })
            ));
        }
    }

    // ===========================================
    // Plan outputs
    // ===========================================

    #[test]
    fn plan_condition_guards_turn_and_status() {
        let (room, host, _) = playing(BoardSize::THREE);
        let plan = plan_move(&room, host, 4, 10).unwrap();

        assert!(plan.condition().holds(&room));
        let after = plan.apply_to(&room);
        assert!(!plan.condition().holds(&after));
    }

    #[test]
    fn broadcast_mirrors_patch() {
        let (room, host, guest) = playing(BoardSize::FIVE);
        let plan = plan_move(&room, host, 12, 99).unwrap();
        let msg = plan.broadcast();

        assert_eq!(msg.sender_id, host);
        assert_eq!(msg.current_turn, Some(guest));
        assert!(!msg.game_ended);
        assert_eq!(msg.board, plan.board);
        assert_eq!(msg.last_move.cell_index, 12);
        assert_eq!(msg.last_move.timestamp, 99);
    }
}
