//! GameSession - one participant's view of one room.
//!
//! A session owns everything the game needs: the last settled room record,
//! the optimistic move ledger and the room's [`SyncChannel`]. Local moves
//! are applied provisionally, written durably, then broadcast. Remote
//! updates from either feed go through [`reconcile`] before they touch
//! local state.
//!
//! ```text
//! begin_move  ─→ plan_move ─→ ledger.begin
//! commit_move ─→ update_room ─┬→ confirm → publish
//!                             └→ rollback
//! next_event   ←─ reconcile ←─ SyncChannel (changes | broadcasts | refresh)
//! ```

use std::collections::VecDeque;
use tictactoe_sync_core::{
    plan_move, reconcile, ChannelEvent, GameResult, GameView, Incoming, LedgerError,
    MoveError, MoveLedger, MovePlan, Origin, ReconcileAction, ReconcileContext,
};
use tictactoe_sync_types::{Mark, MoveRecord, PlayerId, Room, RoomId, RoomStatus};

use crate::backend::{Backend, StoreError};
use crate::channel::{Inbound, SyncChannel};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::lobby::{commit_leave, now_millis, save_history};

/// Something the UI should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The room was read and the session is live.
    Initialized {
        /// Room as read at start.
        room: Room,
        /// Mark this participant plays.
        my_mark: Mark,
    },
    /// A guest took the open seat and moves are now accepted.
    GameStarted {
        /// Room as it now stands.
        room: Room,
    },
    /// The opponent's move was applied.
    OpponentMoved {
        /// The move.
        record: MoveRecord,
        /// State after it.
        view: GameView,
    },
    /// The game reached its terminal state.
    GameEnded(GameResult),
    /// Local state was replaced by a re-read or a correcting update.
    Resynced {
        /// State after the re-read.
        view: GameView,
    },
    /// Channel lifecycle notice (interrupted, recovered, gave up, ...).
    Channel(ChannelEvent),
}

/// Result of a committed local move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    /// The move as written.
    pub record: MoveRecord,
    /// Stored state after the move.
    pub view: GameView,
    /// Set if this move ended the game.
    pub result: Option<GameResult>,
    /// Whether the fast-path broadcast went out.
    pub broadcast: bool,
}

/// A participant's live game.
pub struct GameSession<B: Backend> {
    backend: B,
    config: ClientConfig,
    me: PlayerId,
    my_mark: Mark,
    room: Room,
    ledger: MoveLedger,
    in_flight: Option<MovePlan>,
    channel: SyncChannel<B>,
    events: VecDeque<SessionEvent>,
    closed: bool,
}

impl<B: Backend> GameSession<B> {
    /// Read the room, open its channel and queue [`SessionEvent::Initialized`].
    ///
    /// # Errors
    ///
    /// `Store(NotFound)` for an unknown room, `Move(NotAParticipant)` if
    /// `me` holds neither seat.
    pub async fn initialize(
        backend: B,
        room_id: RoomId,
        me: PlayerId,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let room = backend.read_room(room_id).await?;
        let my_mark = room.mark_for(me).ok_or(MoveError::NotAParticipant)?;
        if room.is_self_play() {
            tracing::error!("Room {} has the same host and guest", room_id);
        }

        let mut channel = SyncChannel::new(backend.clone(), room_id, &config);
        channel.open().await;

        tracing::info!(
            "Session for {} in room {} playing {} ({})",
            me,
            room_id,
            my_mark,
            room.status
        );

        let events = VecDeque::from([SessionEvent::Initialized {
            room: room.clone(),
            my_mark,
        }]);
        Ok(Self {
            backend,
            config,
            me,
            my_mark,
            ledger: MoveLedger::new(GameView::from_room(&room)),
            in_flight: None,
            room,
            channel,
            events,
            closed: false,
        })
    }

    /// This participant.
    pub fn me(&self) -> PlayerId {
        self.me
    }

    /// Mark this participant plays.
    pub fn my_mark(&self) -> Mark {
        self.my_mark
    }

    /// Current view, including a provisional move if one is in flight.
    pub fn view(&self) -> &GameView {
        self.ledger.view()
    }

    /// Last settled room record.
    pub fn room(&self) -> &Room {
        &self.room
    }

    /// The room's channel.
    pub fn channel(&self) -> &SyncChannel<B> {
        &self.channel
    }

    /// Check if it is this participant's move.
    pub fn is_my_turn(&self) -> bool {
        let view = self.ledger.view();
        view.status == RoomStatus::Playing && view.current_turn == Some(self.me)
    }

    /// Check if the session has left its room.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Place a mark at `index`: [`begin_move`](Self::begin_move) then
    /// [`commit_move`](Self::commit_move).
    pub async fn request_move(&mut self, index: usize) -> Result<MoveOutcome, ClientError> {
        self.begin_move(index)?;
        self.commit_move().await
    }

    /// Validate a move and show it provisionally.
    ///
    /// Nothing is written yet. Until [`commit_move`](Self::commit_move)
    /// settles it, [`view`](Self::view) shows the mark, the turn has passed
    /// and remote updates older than the move are held back.
    ///
    /// # Errors
    ///
    /// `Move(..)` if the move is illegal, `Ledger(MovePending)` if another
    /// move is already in flight.
    pub fn begin_move(&mut self, index: usize) -> Result<GameView, ClientError> {
        self.ensure_open()?;
        let plan = plan_move(&self.room, self.me, index, now_millis())?;
        let view = self.ledger.begin(&plan)?.clone();
        self.in_flight = Some(plan);
        Ok(view)
    }

    /// Write the begun move as one conditional update.
    ///
    /// Only after the write lands is the move broadcast. A terminal move
    /// also writes the history record.
    ///
    /// # Errors
    ///
    /// `Ledger(NothingPending)` without a begun move, `Ledger(Superseded)`
    /// if a remote update replaced it first (nothing is written),
    /// `MoveRolledBack` if the durable write failed and the provisional
    /// move was undone.
    pub async fn commit_move(&mut self) -> Result<MoveOutcome, ClientError> {
        self.ensure_open()?;
        let plan = self.in_flight.take().ok_or(LedgerError::NothingPending)?;
        let index = plan.record.cell_index;
        if !self.ledger.has_pending() {
            return Err(LedgerError::Superseded { index }.into());
        }

        let stored = match self
            .backend
            .update_room(self.room.id, &plan.patch(), &plan.condition())
            .await
        {
            Ok(stored) => stored,
            Err(e) => return Err(self.roll_back(index, e)),
        };

        let view = GameView::from_room(&stored);
        self.ledger.confirm(view.clone());
        self.room = stored;
        tracing::debug!(
            "Committed {} at cell {} in room {}",
            plan.record.mark,
            index,
            self.room.id
        );

        let broadcast = match self.channel.publish(&plan.broadcast()).await {
            Ok(sent) => sent,
            Err(e) => {
                tracing::warn!("Broadcast for room {} failed: {}", self.room.id, e);
                false
            }
        };

        let result = if plan.turn.is_terminal() {
            tracing::info!(
                "Room {} finished by {} (winner: {:?})",
                self.room.id,
                self.me,
                plan.turn.winner
            );
            if self.config.game.record_history {
                save_history(&self.backend, &self.room).await;
            }
            let result = GameResult::evaluate(&view, self.me, self.my_mark);
            self.events.push_back(SessionEvent::GameEnded(result.clone()));
            Some(result)
        } else {
            None
        };

        Ok(MoveOutcome {
            record: plan.record,
            view,
            result,
            broadcast,
        })
    }

    /// Leave the room and close the session.
    ///
    /// Mid-game the opponent wins by forfeit and the result is returned.
    /// If the game ended concurrently the leave writes nothing.
    pub async fn request_leave(&mut self) -> Result<Option<GameResult>, ClientError> {
        self.ensure_open()?;
        let result = match commit_leave(
            &self.backend,
            &self.room,
            self.me,
            self.config.game.record_history,
        )
        .await
        {
            Ok(Some(stored)) => {
                let view = GameView::from_room(&stored);
                self.ledger.accept(view.clone());
                self.room = stored;
                Some(GameResult::evaluate(&view, self.me, self.my_mark))
            }
            Ok(None) => None,
            Err(ClientError::Store(e)) if e.is_conflict() => {
                tracing::info!("Room {} changed before leave: {}", self.room.id, e);
                None
            }
            Err(e) => return Err(e),
        };
        self.close().await;
        Ok(result)
    }

    /// Drop the channel without writing anything.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.channel.close().await;
        self.events.clear();
        if self.in_flight.take().is_some() {
            self.ledger.rollback();
        }
        self.closed = true;
        tracing::debug!("Session for {} in room {} closed", self.me, self.room.id);
    }

    /// Resubscribe and re-read after the UI regains visibility.
    pub async fn on_visibility_regained(&mut self) -> Result<(), ClientError> {
        self.ensure_open()?;
        self.channel.visibility_regained().await;
        Ok(())
    }

    /// Authoritative read-and-reconcile against the stored room.
    pub async fn refresh(&mut self) -> Result<GameView, ClientError> {
        self.ensure_open()?;
        let room = self.backend.read_room(self.room.id).await?;
        self.apply(Incoming::refresh(&room), Some(room));
        Ok(self.ledger.view().clone())
    }

    /// Wait for the next event.
    ///
    /// Duplicate, stale and self-originated updates are absorbed here and
    /// never surface.
    ///
    /// # Errors
    ///
    /// `Channel(RetriesExhausted)` once resubscription gives up,
    /// `SessionClosed` after leaving.
    pub async fn next_event(&mut self) -> Result<SessionEvent, ClientError> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Ok(event);
            }
            self.ensure_open()?;
            let inbound = self.channel.recv().await?;
            self.handle(inbound).await?;
        }
    }

    /// Take the next event if one can be produced without waiting.
    pub async fn try_next_event(&mut self) -> Result<Option<SessionEvent>, ClientError> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Ok(Some(event));
            }
            self.ensure_open()?;
            match self.channel.try_recv() {
                Some(inbound) => self.handle(inbound).await?,
                None => return Ok(None),
            }
        }
    }

    async fn handle(&mut self, inbound: Inbound) -> Result<(), ClientError> {
        match inbound {
            Inbound::Change(change) => {
                let incoming = Incoming::change(&change);
                self.apply(incoming, Some(change.room));
            }
            Inbound::Broadcast(msg) => self.apply(Incoming::broadcast(&msg), None),
            Inbound::Refresh => {
                self.refresh().await?;
            }
            Inbound::Lifecycle(event) => self.events.push_back(SessionEvent::Channel(event)),
        }
        Ok(())
    }

    /// Reconcile one update and queue whatever it produced.
    ///
    /// `record` is the full room when the update carried one.
    fn apply(&mut self, incoming: Incoming, record: Option<Room>) {
        let ctx = ReconcileContext {
            me: self.me,
            my_mark: self.my_mark,
            move_pending: self.ledger.has_pending(),
        };
        let origin = incoming.origin;
        let reconciled = reconcile(self.ledger.view(), &incoming, ctx);

        match reconciled.action {
            ReconcileAction::Ignored(reason) => {
                tracing::debug!(
                    "Ignored {:?} update for room {}: {:?}",
                    origin,
                    self.room.id,
                    reason
                );
                if origin == Origin::Refresh {
                    if let Some(room) = record {
                        self.room = room;
                    }
                    self.events.push_back(SessionEvent::Resynced {
                        view: reconciled.view,
                    });
                }
            }
            ReconcileAction::Deferred => {
                tracing::debug!(
                    "Deferred {:?} update for room {} behind a pending move",
                    origin,
                    self.room.id
                );
            }
            ReconcileAction::Applied {
                opponent_move,
                game_result,
            } => {
                let started = self.ledger.view().status == RoomStatus::Waiting
                    && reconciled.view.status == RoomStatus::Playing;
                if let Some(superseded) = self.ledger.accept(reconciled.view.clone()) {
                    tracing::warn!(
                        "Pending move at cell {} superseded by remote state",
                        superseded.record.cell_index
                    );
                }
                self.room = match record {
                    Some(room) => room,
                    None => overlay(&self.room, &reconciled.view),
                };
                tracing::debug!(
                    "Applied {:?} update for room {} ({} cells occupied)",
                    origin,
                    self.room.id,
                    reconciled.view.board.occupied_count()
                );

                let quiet = opponent_move.is_none() && game_result.is_none() && !started;
                if started {
                    tracing::info!("Room {} started", self.room.id);
                    self.events.push_back(SessionEvent::GameStarted {
                        room: self.room.clone(),
                    });
                }
                if let Some(record) = opponent_move {
                    self.events.push_back(SessionEvent::OpponentMoved {
                        record,
                        view: reconciled.view.clone(),
                    });
                }
                if origin == Origin::Refresh || quiet {
                    self.events.push_back(SessionEvent::Resynced {
                        view: reconciled.view.clone(),
                    });
                }
                if let Some(result) = game_result {
                    tracing::info!(
                        "Room {} ended (winner: {:?}, forfeit: {})",
                        self.room.id,
                        result.winner_id,
                        result.forfeit
                    );
                    self.events.push_back(SessionEvent::GameEnded(result));
                }
            }
        }
    }

    fn roll_back(&mut self, index: usize, error: StoreError) -> ClientError {
        self.ledger.rollback();
        tracing::warn!(
            "Move at cell {} in room {} rolled back: {}",
            index,
            self.room.id,
            error
        );
        ClientError::MoveRolledBack {
            index,
            source: error,
        }
    }

    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.closed {
            Err(ClientError::SessionClosed)
        } else {
            Ok(())
        }
    }
}

/// `room` with the game fields of `view` laid over it.
fn overlay(room: &Room, view: &GameView) -> Room {
    let mut next = room.clone();
    next.board = view.board.clone();
    next.current_turn = view.current_turn;
    next.status = view.status;
    next.winner_id = view.winner_id;
    next
}
