//! Lobby: player registry and room lifecycle.
//!
//! Join and leave are planned by sync-core and written here as single
//! conditional updates. A join that loses the race for the guest seat
//! surfaces the store's `Conflict` unchanged.

use std::time::{SystemTime, UNIX_EPOCH};
use tictactoe_sync_core::{history_record, new_room, plan_join, plan_leave, JoinPlan, LeavePlan};
use tictactoe_sync_types::{BoardSize, Player, PlayerId, Room, RoomId, RoomStatus};

use crate::backend::RoomStore;
use crate::config::ClientConfig;
use crate::error::ClientError;

/// Entry point for everything that happens outside a running game.
pub struct Lobby<S: RoomStore> {
    store: S,
    record_history: bool,
}

impl<S: RoomStore> Lobby<S> {
    /// Create a lobby over `store`.
    pub fn new(store: S, config: &ClientConfig) -> Self {
        Self {
            store,
            record_history: config.game.record_history,
        }
    }

    /// Register a player under a fresh id. Names need not be unique.
    pub async fn register_player(&self, display_name: &str) -> Result<Player, ClientError> {
        let name = display_name.trim();
        if name.is_empty() {
            return Err(ClientError::BlankPlayerName);
        }
        let player = self.store.insert_player(Player::new(name)).await?;
        tracing::info!("Registered player {} ({})", player.display_name, player.id);
        Ok(player)
    }

    /// All players registered under `display_name`.
    pub async fn find_players_by_name(&self, display_name: &str) -> Result<Vec<Player>, ClientError> {
        Ok(self
            .store
            .find_players_by_name(display_name.trim())
            .await?)
    }

    /// Create a waiting room hosted by `host`.
    pub async fn create_room(
        &self,
        name: &str,
        size: BoardSize,
        host: PlayerId,
    ) -> Result<Room, ClientError> {
        let room = new_room(RoomId::new(), name, size, host)?;
        let room = self.store.insert_room(room).await?;
        tracing::info!(
            "Created {}x{} room {} ({})",
            size.side(),
            size.side(),
            room.name,
            room.id
        );
        Ok(room)
    }

    /// Rooms waiting for a guest.
    pub async fn list_open_rooms(&self) -> Result<Vec<Room>, ClientError> {
        Ok(self.store.list_rooms(RoomStatus::Waiting).await?)
    }

    /// Take the guest seat and start the game.
    ///
    /// # Errors
    ///
    /// `Join(..)` if the room cannot be joined as read, `Store(Conflict)`
    /// if another guest claimed the seat between the read and the write.
    pub async fn join_room(&self, room_id: RoomId, guest: PlayerId) -> Result<Room, ClientError> {
        let room = self.store.read_room(room_id).await?;
        let (patch, condition) = match plan_join(&room, guest)? {
            JoinPlan::AlreadyJoined => {
                tracing::debug!("Player {} already seated in room {}", guest, room_id);
                return Ok(room);
            }
            JoinPlan::Claim { patch, condition } => (patch, condition),
        };

        match self.store.update_room(room_id, &patch, &condition).await {
            Ok(room) => {
                tracing::info!("Player {} joined room {}", guest, room_id);
                Ok(room)
            }
            Err(e) if e.is_conflict() => {
                tracing::warn!("Join race lost for room {}: {}", room_id, e);
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Leave a room outside a running session.
    ///
    /// Mid-game this forfeits to the other participant and returns the
    /// finished room. Otherwise nothing is written and `None` is returned.
    pub async fn leave_room(
        &self,
        room_id: RoomId,
        leaver: PlayerId,
    ) -> Result<Option<Room>, ClientError> {
        let room = self.store.read_room(room_id).await?;
        commit_leave(&self.store, &room, leaver, self.record_history).await
    }
}

/// Write the leave planned for `room`, recording history on forfeit.
pub(crate) async fn commit_leave<S: RoomStore + ?Sized>(
    store: &S,
    room: &Room,
    leaver: PlayerId,
    record_history: bool,
) -> Result<Option<Room>, ClientError> {
    let (patch, condition, winner) = match plan_leave(room, leaver)? {
        LeavePlan::Detach => {
            tracing::debug!("Player {} left room {} without a write", leaver, room.id);
            return Ok(None);
        }
        LeavePlan::Forfeit {
            patch,
            condition,
            winner,
        } => (patch, condition, winner),
    };

    let stored = store.update_room(room.id, &patch, &condition).await?;
    tracing::info!(
        "Player {} forfeited room {} to {}",
        leaver,
        room.id,
        winner
    );
    if record_history {
        save_history(store, &stored).await;
    }
    Ok(Some(stored))
}

/// Insert the history record for a finished room. Failures are logged only.
pub(crate) async fn save_history<S: RoomStore + ?Sized>(store: &S, room: &Room) {
    let Some(record) = history_record(room, now_millis()) else {
        return;
    };
    match store.insert_history(record).await {
        Ok(()) => tracing::debug!("Saved history for room {}", room.id),
        Err(e) => tracing::warn!("Failed to save history for room {}: {}", room.id, e),
    }
}

/// Milliseconds since the Unix epoch (0 if the clock is before it).
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
