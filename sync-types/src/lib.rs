//! # sync-types
//!
//! Record and wire types for the tictactoe-sync turn protocol.
//!
//! This crate provides the foundational types used across all tictactoe-sync crates:
//! - [`PlayerId`], [`RoomId`] - Identity types
//! - [`Board`], [`BoardSize`], [`Cell`], [`Mark`] - Board storage
//! - [`Room`], [`RoomStatus`], [`Player`], [`MoveRecord`] - The authoritative record
//! - [`RoomPatch`], [`WriteCondition`], [`RoomChange`] - Durable-path updates
//! - [`BroadcastMove`] - Fast-path payload
//! - [`WireError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod board;
mod error;
mod ids;
mod messages;
mod room;

pub use board::{Board, BoardSize, Cell, Mark};
pub use error::WireError;
pub use ids::{PlayerId, RoomId};
pub use messages::{BroadcastMove, GameHistory, Precondition, RoomChange, RoomPatch, WriteCondition};
pub use room::{MoveRecord, Player, Room, RoomStatus};
