//! Client errors.

use thiserror::Error;
use tictactoe_sync_core::{CreateError, JoinError, LeaveError, LedgerError, MoveError};
use tictactoe_sync_types::WireError;

use crate::backend::{ChannelError, StoreError};
use crate::config::ConfigError;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Durable store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Realtime channel error.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Payload encoding error.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Move refused before anything was written.
    #[error("move rejected: {0}")]
    Move(#[from] MoveError),

    /// Join refused.
    #[error("join rejected: {0}")]
    Join(#[from] JoinError),

    /// Leave refused.
    #[error("leave rejected: {0}")]
    Leave(#[from] LeaveError),

    /// Room creation refused.
    #[error("create rejected: {0}")]
    Create(#[from] CreateError),

    /// A move is already awaiting its durable write.
    #[error("{0}")]
    Ledger(#[from] LedgerError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The durable write failed and the optimistic move was undone.
    #[error("move at cell {index} rolled back: {source}")]
    MoveRolledBack {
        /// Cell of the undone move.
        index: usize,
        /// Why the write failed.
        #[source]
        source: StoreError,
    },

    /// Display name is empty or whitespace.
    #[error("player name must not be blank")]
    BlankPlayerName,

    /// The session has left its room.
    #[error("session closed")]
    SessionClosed,
}

impl ClientError {
    /// The room can no longer be played and should be abandoned.
    pub fn is_fatal(&self) -> bool {
        match self {
            ClientError::Move(e) => e.is_fatal(),
            ClientError::Join(e) => e.is_fatal(),
            ClientError::Leave(LeaveError::InvalidRoomConfiguration) => true,
            _ => false,
        }
    }

    /// Actor mistake (wrong turn, occupied cell, ...): show a transient notice.
    pub fn is_actor_error(&self) -> bool {
        match self {
            ClientError::Move(e) => !e.is_fatal(),
            ClientError::Join(e) => !e.is_fatal(),
            ClientError::Ledger(_) => true,
            _ => false,
        }
    }
}
