//! In-memory backend for tests and simulation.
//!
//! Cloning shares state, so two sessions built from clones of one
//! `MemoryBackend` see the same store and the same broadcast topics.
//! Faults can be injected per call; every update is logged.

use super::{
    ChannelError, Realtime, RoomStore, StoreError, Subscription, SubscriptionId,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tictactoe_sync_types::{
    GameHistory, Player, Room, RoomChange, RoomId, RoomPatch, RoomStatus, WriteCondition,
};
use tokio::sync::mpsc;

/// One `update_room` call as seen by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRecord {
    /// Target room.
    pub room_id: RoomId,
    /// Patch that was requested.
    pub patch: RoomPatch,
    /// Whether the write was applied.
    pub accepted: bool,
}

/// In-memory store plus realtime channel.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<MemoryBackendInner>>,
}

#[derive(Debug)]
struct ChangeSub {
    id: SubscriptionId,
    room_id: RoomId,
    tx: mpsc::UnboundedSender<RoomChange>,
}

#[derive(Debug)]
struct BroadcastSub {
    id: SubscriptionId,
    topic: String,
    event: String,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

#[derive(Debug, Default)]
struct MemoryBackendInner {
    rooms: HashMap<RoomId, Room>,
    players: Vec<Player>,
    history: Vec<GameHistory>,
    next_subscription: u64,
    change_subs: Vec<ChangeSub>,
    broadcast_subs: Vec<BroadcastSub>,
    update_log: Vec<UpdateRecord>,
    published: usize,
    drop_broadcasts: bool,
    fail_next_update: Option<String>,
    fail_next_publish: Option<String>,
    fail_subscribes: VecDeque<String>,
}

impl MemoryBackendInner {
    fn next_id(&mut self) -> SubscriptionId {
        self.next_subscription += 1;
        SubscriptionId(self.next_subscription)
    }

    fn notify(&mut self, room: &Room) {
        // Closed receivers are pruned here
        self.change_subs.retain(|sub| {
            sub.room_id != room.id || sub.tx.send(RoomChange { room: room.clone() }).is_ok()
        });
    }
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, MemoryBackendInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of a stored room.
    pub fn room(&self, id: RoomId) -> Option<Room> {
        self.inner().rooms.get(&id).cloned()
    }

    /// Overwrite a stored room without notifying subscribers.
    ///
    /// Used to seed records no client would write (e.g. host == guest).
    pub fn put_room(&self, room: Room) {
        self.inner().rooms.insert(room.id, room);
    }

    /// Every `update_room` call so far, accepted or not.
    pub fn update_log(&self) -> Vec<UpdateRecord> {
        self.inner().update_log.clone()
    }

    /// Accepted updates that wrote `Finished` to `room_id`.
    pub fn terminal_writes(&self, room_id: RoomId) -> usize {
        self.inner()
            .update_log
            .iter()
            .filter(|r| r.accepted && r.room_id == room_id && r.patch.is_terminal())
            .count()
    }

    /// Finished-game records.
    pub fn history(&self) -> Vec<GameHistory> {
        self.inner().history.clone()
    }

    /// Number of successful `publish_broadcast` calls.
    pub fn published_count(&self) -> usize {
        self.inner().published
    }

    /// Number of live subscriptions (changes plus broadcasts).
    pub fn subscriber_count(&self) -> usize {
        let inner = self.inner();
        inner.change_subs.len() + inner.broadcast_subs.len()
    }

    /// Accept broadcasts but never deliver them.
    pub fn drop_broadcasts(&self, drop: bool) {
        self.inner().drop_broadcasts = drop;
    }

    /// Cause the next update_room() to fail with the given error.
    pub fn fail_next_update(&self, error: &str) {
        self.inner().fail_next_update = Some(error.to_string());
    }

    /// Cause the next publish_broadcast() to fail with the given error.
    pub fn fail_next_publish(&self, error: &str) {
        self.inner().fail_next_publish = Some(error.to_string());
    }

    /// Cause the next subscribe call to fail. Calls queue up.
    pub fn fail_next_subscribe(&self, error: &str) {
        self.inner().fail_subscribes.push_back(error.to_string());
    }

    /// Drop every live subscription, as if the connection broke.
    pub fn disconnect_all(&self) {
        let mut inner = self.inner();
        inner.change_subs.clear();
        inner.broadcast_subs.clear();
    }
}

impl Clone for MemoryBackend {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl RoomStore for MemoryBackend {
    async fn read_room(&self, id: RoomId) -> Result<Room, StoreError> {
        self.inner()
            .rooms
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("room {}", id)))
    }

    async fn insert_room(&self, room: Room) -> Result<Room, StoreError> {
        let mut inner = self.inner();
        if inner.rooms.contains_key(&room.id) {
            return Err(StoreError::Conflict(format!("room {} already exists", room.id)));
        }
        inner.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn update_room(
        &self,
        id: RoomId,
        patch: &RoomPatch,
        condition: &WriteCondition,
    ) -> Result<Room, StoreError> {
        let mut guard = self.inner();
        let inner = &mut *guard;
        let mut log = UpdateRecord {
            room_id: id,
            patch: patch.clone(),
            accepted: false,
        };

        // Check for forced failure
        if let Some(error) = inner.fail_next_update.take() {
            inner.update_log.push(log);
            return Err(StoreError::Unavailable(error));
        }

        let Some(room) = inner.rooms.get_mut(&id) else {
            inner.update_log.push(log);
            return Err(StoreError::NotFound(format!("room {}", id)));
        };

        if let Some(violated) = condition.first_violation(room) {
            inner.update_log.push(log);
            return Err(StoreError::Conflict(format!(
                "room {}: {:?} does not hold",
                id, violated
            )));
        }

        if patch.breaks_lifecycle(room.status) {
            inner.update_log.push(log);
            return Err(StoreError::Conflict(format!(
                "room {}: cannot move from {} to {:?}",
                id, room.status, patch.status
            )));
        }

        patch.apply_to(room);
        let stored = room.clone();
        log.accepted = true;
        inner.update_log.push(log);
        inner.notify(&stored);
        Ok(stored)
    }

    async fn list_rooms(&self, status: RoomStatus) -> Result<Vec<Room>, StoreError> {
        let mut rooms: Vec<Room> = self
            .inner()
            .rooms
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rooms)
    }

    async fn insert_player(&self, player: Player) -> Result<Player, StoreError> {
        let mut inner = self.inner();
        if inner.players.iter().any(|p| p.id == player.id) {
            return Err(StoreError::Conflict(format!("player {} already exists", player.id)));
        }
        inner.players.push(player.clone());
        Ok(player)
    }

    async fn find_players_by_name(&self, name: &str) -> Result<Vec<Player>, StoreError> {
        Ok(self
            .inner()
            .players
            .iter()
            .filter(|p| p.display_name == name)
            .cloned()
            .collect())
    }

    async fn insert_history(&self, record: GameHistory) -> Result<(), StoreError> {
        let mut inner = self.inner();
        if inner.history.iter().any(|h| h.room_id == record.room_id) {
            return Err(StoreError::Conflict(format!(
                "history for room {} already recorded",
                record.room_id
            )));
        }
        inner.history.push(record);
        Ok(())
    }
}

#[async_trait]
impl Realtime for MemoryBackend {
    async fn subscribe_changes(
        &self,
        room_id: RoomId,
    ) -> Result<Subscription<RoomChange>, ChannelError> {
        let mut inner = self.inner();
        if let Some(error) = inner.fail_subscribes.pop_front() {
            return Err(ChannelError::SubscribeFailed(error));
        }
        let id = inner.next_id();
        let (tx, rx) = mpsc::unbounded_channel();
        inner.change_subs.push(ChangeSub { id, room_id, tx });
        Ok(Subscription::new(id, rx))
    }

    async fn subscribe_broadcast(
        &self,
        topic: &str,
        event: &str,
    ) -> Result<Subscription<Vec<u8>>, ChannelError> {
        let mut inner = self.inner();
        if let Some(error) = inner.fail_subscribes.pop_front() {
            return Err(ChannelError::SubscribeFailed(error));
        }
        let id = inner.next_id();
        let (tx, rx) = mpsc::unbounded_channel();
        inner.broadcast_subs.push(BroadcastSub {
            id,
            topic: topic.to_string(),
            event: event.to_string(),
            tx,
        });
        Ok(Subscription::new(id, rx))
    }

    async fn publish_broadcast(
        &self,
        topic: &str,
        event: &str,
        payload: Vec<u8>,
    ) -> Result<(), ChannelError> {
        let mut inner = self.inner();
        if let Some(error) = inner.fail_next_publish.take() {
            return Err(ChannelError::PublishFailed(error));
        }
        inner.published += 1;
        if inner.drop_broadcasts {
            return Ok(());
        }
        inner.broadcast_subs.retain(|sub| {
            sub.topic != topic || sub.event != event || sub.tx.send(payload.clone()).is_ok()
        });
        Ok(())
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), ChannelError> {
        let mut inner = self.inner();
        inner.change_subs.retain(|s| s.id != id);
        inner.broadcast_subs.retain(|s| s.id != id);
        Ok(())
    }
}
