//! # sync-client
//!
//! Async client for the tictactoe-sync turn protocol.
//!
//! This is the library a game front end talks to. It performs the I/O the
//! pure state machines in sync-core ask for.
//!
//! ## Features
//!
//! - **Backend Abstraction**: durable store and realtime channel as traits, with an in-memory backend
//! - **Two Delivery Paths**: durable change feed for correctness, broadcast for latency
//! - **Optimistic Moves**: provisional apply, conditional write, rollback on failure
//! - **Bounded Resubscription**: backoff with jitter, refresh after every recovery
//!
//! ## Example
//!
//! ```ignore
//! use tictactoe_sync_client::{ClientConfig, GameSession, Lobby, MemoryBackend};
//!
//! let backend = MemoryBackend::new();
//! let lobby = Lobby::new(backend.clone(), &ClientConfig::default());
//! let host = lobby.register_player("ada").await?;
//! let room = lobby.create_room("den", BoardSize::THREE, host.id).await?;
//!
//! let mut session = GameSession::initialize(backend, room.id, host.id, config).await?;
//! session.request_move(4).await?;
//! while let Ok(event) = session.next_event().await {
//!     // render
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod channel;
pub mod config;
pub mod error;
pub mod lobby;
pub mod session;

pub use backend::{
    Backend, ChannelError, MemoryBackend, Realtime, RoomStore, StoreError, Subscription,
    SubscriptionId, UpdateRecord,
};
pub use channel::{Inbound, SyncChannel};
pub use config::{BroadcastConfig, ClientConfig, ConfigError, GameConfig, RetryConfig};
pub use error::ClientError;
pub use lobby::Lobby;
pub use session::{GameSession, MoveOutcome, SessionEvent};
