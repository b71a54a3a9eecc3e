//! Backend abstraction for tictactoe-sync.
//!
//! The hosted persistence/realtime service is split into two traits:
//! - [`RoomStore`]: durable records (rooms, players, history) with
//!   conditional room updates
//! - [`Realtime`]: change feeds on room records plus an ephemeral
//!   publish/subscribe broadcast path
//!
//! # Example
//!
//! ```ignore
//! let backend = MemoryBackend::new();
//! let room = backend.insert_room(room).await?;
//! let mut changes = backend.subscribe_changes(room.id).await?;
//! backend.update_room(room.id, &patch, &condition).await?;
//! let change = changes.recv().await;
//! ```

mod memory;

pub use memory::{MemoryBackend, UpdateRecord};

use async_trait::async_trait;
use thiserror::Error;
use tictactoe_sync_types::{
    GameHistory, Player, Room, RoomChange, RoomId, RoomPatch, RoomStatus, WriteCondition,
};
use tokio::sync::mpsc;

/// Durable store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record with that key.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write condition failed or the key already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The store could not be reached or rejected the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Check if this is an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Realtime channel errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Subscribing failed.
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),

    /// Publishing a broadcast failed.
    #[error("publish failed: {0}")]
    PublishFailed(String),

    /// The channel was closed.
    #[error("channel closed")]
    Closed,

    /// Resubscription gave up.
    #[error("subscription retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        /// Consecutive failed attempts.
        attempts: u32,
    },
}

/// Handle for one live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// A live subscription delivering items of type `T`.
///
/// `recv()` returns `None` once the backend drops the subscription.
#[derive(Debug)]
pub struct Subscription<T> {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Wrap a receiver.
    pub fn new(id: SubscriptionId, rx: mpsc::UnboundedReceiver<T>) -> Self {
        Self { id, rx }
    }

    /// Handle to pass to [`Realtime::unsubscribe`].
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next item.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take the next item if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

/// Durable record store.
///
/// `update_room` applies the whole patch atomically, and only if every
/// guard in `condition` holds against the stored record.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Read a room.
    async fn read_room(&self, id: RoomId) -> Result<Room, StoreError>;

    /// Insert a new room.
    async fn insert_room(&self, room: Room) -> Result<Room, StoreError>;

    /// Conditionally update a room; returns the stored record after the write.
    async fn update_room(
        &self,
        id: RoomId,
        patch: &RoomPatch,
        condition: &WriteCondition,
    ) -> Result<Room, StoreError>;

    /// List rooms in the given status.
    async fn list_rooms(&self, status: RoomStatus) -> Result<Vec<Room>, StoreError>;

    /// Insert a player.
    async fn insert_player(&self, player: Player) -> Result<Player, StoreError>;

    /// All players whose display name matches exactly.
    async fn find_players_by_name(&self, name: &str) -> Result<Vec<Player>, StoreError>;

    /// Insert a finished-game record.
    async fn insert_history(&self, record: GameHistory) -> Result<(), StoreError>;
}

/// Change feed and broadcast channel.
#[async_trait]
pub trait Realtime: Send + Sync {
    /// Subscribe to writes on one room.
    async fn subscribe_changes(
        &self,
        room_id: RoomId,
    ) -> Result<Subscription<RoomChange>, ChannelError>;

    /// Subscribe to one event on a broadcast topic.
    async fn subscribe_broadcast(
        &self,
        topic: &str,
        event: &str,
    ) -> Result<Subscription<Vec<u8>>, ChannelError>;

    /// Publish an ephemeral message to a topic.
    async fn publish_broadcast(
        &self,
        topic: &str,
        event: &str,
        payload: Vec<u8>,
    ) -> Result<(), ChannelError>;

    /// Drop a subscription.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), ChannelError>;
}

/// A full backend: store plus realtime.
pub trait Backend: RoomStore + Realtime + Clone + 'static {}

impl<T: RoomStore + Realtime + Clone + 'static> Backend for T {}
