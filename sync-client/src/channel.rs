//! SyncChannel - the room's synchronization channel.
//!
//! Drives [`SubscriptionState`] from sync-core and performs the I/O it
//! asks for: subscribing to the room's change feed and broadcast topic,
//! sleeping out retry delays, publishing fast-path moves.
//!
//! ```text
//! GameSession → SyncChannel → Realtime → backend
//!                   ↓
//!              sync-core (SubscriptionState)
//! ```

use std::collections::VecDeque;
use tictactoe_sync_core::{Action, ChannelEvent, Event, RetryPolicy, SubscriptionState};
use tictactoe_sync_types::{BroadcastMove, RoomChange, RoomId};
use tokio::time::Instant;

use crate::backend::{ChannelError, Realtime, Subscription};
use crate::config::ClientConfig;

/// Something the channel delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Durable change notification.
    Change(RoomChange),
    /// Decoded broadcast move.
    Broadcast(BroadcastMove),
    /// The channel recovered; re-read the room from the store.
    Refresh,
    /// Subscription lifecycle event.
    Lifecycle(ChannelEvent),
}

/// Subscription driver for one room.
pub struct SyncChannel<R: Realtime> {
    realtime: R,
    room_id: RoomId,
    topic: String,
    event: String,
    broadcast_enabled: bool,
    policy: RetryPolicy,
    state: SubscriptionState,
    changes: Option<Subscription<RoomChange>>,
    broadcasts: Option<Subscription<Vec<u8>>>,
    retry_at: Option<Instant>,
    outbox: VecDeque<Inbound>,
}

impl<R: Realtime> SyncChannel<R> {
    /// Create an unsubscribed channel for `room_id`.
    pub fn new(realtime: R, room_id: RoomId, config: &ClientConfig) -> Self {
        Self {
            realtime,
            room_id,
            topic: config.topic_for(room_id),
            event: config.broadcast.event.clone(),
            broadcast_enabled: config.broadcast.enabled,
            policy: config.retry.policy(),
            state: SubscriptionState::new(),
            changes: None,
            broadcasts: None,
            retry_at: None,
            outbox: VecDeque::new(),
        }
    }

    /// Current subscription state.
    pub fn state(&self) -> &SubscriptionState {
        &self.state
    }

    /// Broadcast topic for this room.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Start subscribing. Failures are retried with backoff by `recv()`.
    pub async fn open(&mut self) {
        self.drive(Event::SubscribeRequested).await;
    }

    /// Resubscribe and refresh after regaining visibility/focus.
    pub async fn visibility_regained(&mut self) {
        self.drive(Event::VisibilityRegained).await;
    }

    /// Drop all subscriptions.
    pub async fn close(&mut self) {
        self.drive(Event::CloseRequested).await;
        self.outbox.clear();
    }

    /// Wait for the next inbound item.
    ///
    /// Sleeps out retry delays while resubscribing. Malformed broadcasts
    /// are dropped with a warning.
    ///
    /// # Errors
    ///
    /// `RetriesExhausted` once the retry budget is spent, `Closed` if the
    /// channel was never opened or has been closed.
    pub async fn recv(&mut self) -> Result<Inbound, ChannelError> {
        loop {
            if let Some(item) = self.outbox.pop_front() {
                return Ok(item);
            }

            match self.state.clone() {
                SubscriptionState::Subscribed => {
                    if let Some(item) = self.next_message().await {
                        return Ok(item);
                    }
                }
                SubscriptionState::Retrying { .. } => {
                    let deadline = self.retry_at.unwrap_or_else(Instant::now);
                    tokio::time::sleep_until(deadline).await;
                    self.retry_at = None;
                    self.drive(Event::RetryTimer).await;
                }
                SubscriptionState::Failed { failures } => {
                    return Err(ChannelError::RetriesExhausted { attempts: failures });
                }
                SubscriptionState::Unsubscribed | SubscriptionState::Subscribing { .. } => {
                    return Err(ChannelError::Closed);
                }
            }
        }
    }

    /// Take an already-queued item without waiting.
    pub fn try_recv(&mut self) -> Option<Inbound> {
        if let Some(item) = self.outbox.pop_front() {
            return Some(item);
        }
        if let Some(change) = self.changes.as_mut().and_then(Subscription::try_recv) {
            return Some(Inbound::Change(change));
        }
        while let Some(bytes) = self.broadcasts.as_mut().and_then(Subscription::try_recv) {
            if let Some(msg) = self.decode(&bytes) {
                return Some(Inbound::Broadcast(msg));
            }
        }
        None
    }

    /// Publish a fast-path move. Returns `false` if broadcasting is disabled.
    ///
    /// Best effort: the durable path carries the move regardless.
    pub async fn publish(&self, msg: &BroadcastMove) -> Result<bool, ChannelError> {
        if !self.broadcast_enabled {
            return Ok(false);
        }
        let payload = msg
            .to_bytes()
            .map_err(|e| ChannelError::PublishFailed(e.to_string()))?;
        self.realtime
            .publish_broadcast(&self.topic, &self.event, payload)
            .await?;
        tracing::debug!(
            "Published move at cell {} on {}",
            msg.last_move.cell_index,
            self.topic
        );
        Ok(true)
    }

    /// Wait on both feeds. `None` if nothing deliverable arrived.
    async fn next_message(&mut self) -> Option<Inbound> {
        let changes = self.changes.as_mut();
        let broadcasts = self.broadcasts.as_mut();

        let received = tokio::select! {
            change = recv_or_pending(changes) => change.map(Received::Change),
            bytes = recv_or_pending(broadcasts) => bytes.map(Received::Bytes),
        };

        match received {
            Some(Received::Change(change)) => Some(Inbound::Change(change)),
            Some(Received::Bytes(bytes)) => self.decode(&bytes).map(Inbound::Broadcast),
            None => {
                tracing::warn!("Room {} feed closed, resubscribing", self.room_id);
                self.drive(Event::ChannelError {
                    error: "feed closed".into(),
                })
                .await;
                None
            }
        }
    }

    fn decode(&self, bytes: &[u8]) -> Option<BroadcastMove> {
        match BroadcastMove::from_bytes(bytes) {
            Ok(msg) => Some(msg),
            Err(e) => {
                tracing::warn!("Dropping malformed broadcast on {}: {}", self.topic, e);
                None
            }
        }
    }

    /// Feed an event to the state machine and execute the resulting actions.
    async fn drive(&mut self, event: Event) {
        let mut events = VecDeque::from([event]);
        while let Some(event) = events.pop_front() {
            let (state, actions) = self.state.clone().on_event(event, &self.policy);
            self.state = state;
            for action in actions {
                if let Some(next) = self.execute(action).await {
                    events.push_back(next);
                }
            }
        }
    }

    async fn execute(&mut self, action: Action) -> Option<Event> {
        match action {
            Action::Subscribe => Some(match self.subscribe().await {
                Ok(()) => Event::SubscribeSucceeded,
                Err(e) => Event::SubscribeFailed {
                    error: e.to_string(),
                },
            }),
            Action::Unsubscribe => {
                self.unsubscribe().await;
                None
            }
            Action::StartRetryTimer { delay } => {
                tracing::info!("Retrying room {} subscription in {:?}", self.room_id, delay);
                self.retry_at = Some(Instant::now() + delay);
                None
            }
            Action::CancelRetry => {
                self.retry_at = None;
                None
            }
            Action::RefreshFromStore => {
                self.outbox.push_back(Inbound::Refresh);
                None
            }
            Action::EmitEvent(event) => {
                log_event(self.room_id, &event);
                self.outbox.push_back(Inbound::Lifecycle(event));
                None
            }
        }
    }

    async fn subscribe(&mut self) -> Result<(), ChannelError> {
        let changes = self.realtime.subscribe_changes(self.room_id).await?;
        if self.broadcast_enabled {
            match self
                .realtime
                .subscribe_broadcast(&self.topic, &self.event)
                .await
            {
                Ok(sub) => self.broadcasts = Some(sub),
                Err(e) => {
                    // Half a subscription is no subscription
                    let _ = self.realtime.unsubscribe(changes.id()).await;
                    return Err(e);
                }
            }
        }
        self.changes = Some(changes);
        Ok(())
    }

    async fn unsubscribe(&mut self) {
        for id in [
            self.changes.take().map(|s| s.id()),
            self.broadcasts.take().map(|s| s.id()),
        ]
        .into_iter()
        .flatten()
        {
            if let Err(e) = self.realtime.unsubscribe(id).await {
                tracing::debug!("Unsubscribe {:?} failed: {}", id, e);
            }
        }
    }
}

enum Received {
    Change(RoomChange),
    Bytes(Vec<u8>),
}

/// Receive from an optional subscription; never resolves if absent.
async fn recv_or_pending<T>(sub: Option<&mut Subscription<T>>) -> Option<T> {
    match sub {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}

fn log_event(room_id: RoomId, event: &ChannelEvent) {
    match event {
        ChannelEvent::Subscribed => tracing::info!("Subscribed to room {}", room_id),
        ChannelEvent::Recovered => tracing::info!("Resubscribed to room {}", room_id),
        ChannelEvent::Interrupted { error } => {
            tracing::warn!("Room {} channel interrupted: {}", room_id, error)
        }
        ChannelEvent::SubscribeFailed { attempt, error } => {
            tracing::warn!(
                "Room {} subscribe attempt {} failed: {}",
                room_id,
                attempt,
                error
            )
        }
        ChannelEvent::GaveUp { attempts, error } => {
            tracing::error!(
                "Giving up on room {} after {} attempts: {}",
                room_id,
                attempts,
                error
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, RoomStore};
    use crate::config::RetryConfig;
    use tictactoe_sync_types::{
        Board, BoardSize, Mark, MoveRecord, PlayerId, Room, RoomPatch, WriteCondition,
    };

    fn fast_config() -> ClientConfig {
        ClientConfig::default().with_retry(RetryConfig {
            initial_delay_ms: 5,
            second_delay_ms: 10,
            max_delay_ms: 20,
            max_jitter_ms: 0,
            max_attempts: 3,
        })
    }

    async fn setup() -> (MemoryBackend, Room) {
        let backend = MemoryBackend::new();
        let room = Room::new(RoomId::new(), "c", BoardSize::THREE, PlayerId::new());
        let room = backend.insert_room(room).await.unwrap();
        (backend, room)
    }

    fn sample_move(sender: PlayerId) -> BroadcastMove {
        BroadcastMove {
            last_move: MoveRecord {
                cell_index: 0,
                mark: Mark::X,
                mover_id: sender,
                timestamp: 0,
            },
            board: Board::empty(BoardSize::THREE),
            current_turn: None,
            game_ended: false,
            winner_id: None,
            sender_id: sender,
        }
    }

    // ===========================================
    // Subscribe / Receive Tests
    // ===========================================

    #[tokio::test]
    async fn open_subscribes_both_feeds() {
        let (backend, room) = setup().await;
        let mut channel = SyncChannel::new(backend.clone(), room.id, &fast_config());

        channel.open().await;

        assert!(channel.state().is_subscribed());
        assert_eq!(backend.subscriber_count(), 2);
        assert_eq!(
            channel.recv().await.unwrap(),
            Inbound::Lifecycle(ChannelEvent::Subscribed)
        );
    }

    #[tokio::test]
    async fn broadcast_disabled_subscribes_changes_only() {
        let (backend, room) = setup().await;
        let config = fast_config().without_broadcast();
        let mut channel = SyncChannel::new(backend.clone(), room.id, &config);

        channel.open().await;
        assert_eq!(backend.subscriber_count(), 1);
        assert!(!channel.publish(&sample_move(room.host_id)).await.unwrap());
        assert_eq!(backend.published_count(), 0);
    }

    #[tokio::test]
    async fn receives_changes_and_broadcasts() {
        let (backend, room) = setup().await;
        let mut channel = SyncChannel::new(backend.clone(), room.id, &fast_config());
        channel.open().await;
        let _ = channel.recv().await;

        backend
            .update_room(
                room.id,
                &RoomPatch::new().guest(PlayerId::new()),
                &WriteCondition::none(),
            )
            .await
            .unwrap();
        assert!(matches!(channel.recv().await.unwrap(), Inbound::Change(_)));

        let msg = sample_move(room.host_id);
        assert!(channel.publish(&msg).await.unwrap());
        assert_eq!(channel.recv().await.unwrap(), Inbound::Broadcast(msg));
    }

    #[tokio::test]
    async fn malformed_broadcast_is_skipped() {
        let (backend, room) = setup().await;
        let config = fast_config();
        let mut channel = SyncChannel::new(backend.clone(), room.id, &config);
        channel.open().await;
        let _ = channel.recv().await;

        let topic = config.topic_for(room.id);
        backend
            .publish_broadcast(&topic, "move", vec![0xc1])
            .await
            .unwrap();
        let msg = sample_move(room.host_id);
        backend
            .publish_broadcast(&topic, "move", msg.to_bytes().unwrap())
            .await
            .unwrap();

        assert_eq!(channel.recv().await.unwrap(), Inbound::Broadcast(msg));
    }

    // ===========================================
    // Retry Tests
    // ===========================================

    #[tokio::test]
    async fn failed_subscribe_retries_then_refreshes() {
        let (backend, room) = setup().await;
        backend.fail_next_subscribe("offline");
        let mut channel = SyncChannel::new(backend.clone(), room.id, &fast_config());

        channel.open().await;
        assert!(channel.state().is_pending());
        assert!(matches!(
            channel.recv().await.unwrap(),
            Inbound::Lifecycle(ChannelEvent::SubscribeFailed { attempt: 1, .. })
        ));

        // Sleeps out the delay, resubscribes, asks for a refresh
        assert_eq!(channel.recv().await.unwrap(), Inbound::Refresh);
        assert_eq!(
            channel.recv().await.unwrap(),
            Inbound::Lifecycle(ChannelEvent::Recovered)
        );
        assert!(channel.state().is_subscribed());
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let (backend, room) = setup().await;
        for _ in 0..3 {
            backend.fail_next_subscribe("offline");
        }
        let mut channel = SyncChannel::new(backend.clone(), room.id, &fast_config());
        channel.open().await;

        let mut failures = 0;
        loop {
            match channel.recv().await {
                Ok(Inbound::Lifecycle(ChannelEvent::SubscribeFailed { .. })) => failures += 1,
                Ok(Inbound::Lifecycle(ChannelEvent::GaveUp { attempts, .. })) => {
                    assert_eq!(attempts, 3);
                }
                Ok(other) => panic!("unexpected {:?}", other),
                Err(ChannelError::RetriesExhausted { attempts }) => {
                    assert_eq!(attempts, 3);
                    break;
                }
                Err(e) => panic!("unexpected error {}", e),
            }
        }
        assert_eq!(failures, 2);
        assert_eq!(backend.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn broken_feed_resubscribes_and_refreshes() {
        let (backend, room) = setup().await;
        let mut channel = SyncChannel::new(backend.clone(), room.id, &fast_config());
        channel.open().await;
        let _ = channel.recv().await;

        backend.disconnect_all();

        assert!(matches!(
            channel.recv().await.unwrap(),
            Inbound::Lifecycle(ChannelEvent::Interrupted { .. })
        ));
        assert!(matches!(
            channel.recv().await.unwrap(),
            Inbound::Lifecycle(ChannelEvent::SubscribeFailed { .. })
        ));
        assert_eq!(channel.recv().await.unwrap(), Inbound::Refresh);
        assert!(channel.state().is_subscribed());
        assert_eq!(backend.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn visibility_regained_requests_refresh() {
        let (backend, room) = setup().await;
        let mut channel = SyncChannel::new(backend.clone(), room.id, &fast_config());
        channel.open().await;
        let _ = channel.recv().await;

        channel.visibility_regained().await;
        assert_eq!(channel.recv().await.unwrap(), Inbound::Refresh);
        assert_eq!(backend.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn closed_channel_reports_closed() {
        let (backend, room) = setup().await;
        let mut channel = SyncChannel::new(backend.clone(), room.id, &fast_config());
        channel.open().await;
        channel.close().await;

        assert_eq!(backend.subscriber_count(), 0);
        assert!(matches!(channel.recv().await, Err(ChannelError::Closed)));
    }
}
