//! Optimistic move ledger.
//!
//! A local move flows through the ledger in this order:
//! 1. `begin()` - apply the move provisionally, remember the prior view
//! 2. `confirm()` - durable write succeeded, the provisional view settles
//! 3. `rollback()` - durable write failed, the prior view is restored
//!
//! At most one move is in flight. The ledger never retries a move; a
//! rolled-back move is reported to the caller and forgotten.

use thiserror::Error;
use tictactoe_sync_types::MoveRecord;

use crate::reconcile::GameView;
use crate::turn::MovePlan;

/// Error type for ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Another move is still awaiting its durable write.
    #[error("move at cell {index} is still pending")]
    MovePending {
        /// Cell of the pending move.
        index: usize,
    },
    /// There is no begun move to commit.
    #[error("no move is pending")]
    NothingPending,
    /// A remote update replaced the provisional move before it was written.
    #[error("move at cell {index} was superseded by remote state")]
    Superseded {
        /// Cell of the dropped move.
        index: usize,
    },
}

/// A provisionally applied move awaiting its durable write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMove {
    /// The move.
    pub record: MoveRecord,
    /// View before the move, restored on rollback.
    pub previous: GameView,
    /// View with the move applied.
    pub provisional: GameView,
}

/// Local view plus at most one unconfirmed move.
#[derive(Debug, Clone)]
pub struct MoveLedger {
    /// Last view known to be durable (or accepted from a remote update).
    settled: GameView,
    /// Move applied ahead of its durable write.
    pending: Option<PendingMove>,
}

impl MoveLedger {
    /// Create a ledger settled on `view`.
    pub fn new(view: GameView) -> Self {
        Self {
            settled: view,
            pending: None,
        }
    }

    /// The view to show: provisional if a move is pending.
    pub fn view(&self) -> &GameView {
        match &self.pending {
            Some(p) => &p.provisional,
            None => &self.settled,
        }
    }

    /// Last settled view.
    pub fn settled(&self) -> &GameView {
        &self.settled
    }

    /// The in-flight move, if any.
    pub fn pending(&self) -> Option<&PendingMove> {
        self.pending.as_ref()
    }

    /// Check if a move awaits its durable write.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Provisionally apply a planned move.
    pub fn begin(&mut self, plan: &MovePlan) -> Result<&GameView, LedgerError> {
        if let Some(p) = &self.pending {
            return Err(LedgerError::MovePending {
                index: p.record.cell_index,
            });
        }
        let previous = self.settled.clone();
        let provisional = GameView {
            board: plan.board.clone(),
            current_turn: plan.turn.next_turn,
            status: plan.turn.status,
            winner_id: plan.turn.winner,
        };
        let pending = self.pending.insert(PendingMove {
            record: plan.record.clone(),
            previous,
            provisional,
        });
        Ok(&pending.provisional)
    }

    /// The durable write landed; settle on the stored view.
    ///
    /// Returns the confirmed move, or `None` if nothing was pending.
    pub fn confirm(&mut self, stored: GameView) -> Option<PendingMove> {
        let pending = self.pending.take()?;
        self.settled = stored;
        Some(pending)
    }

    /// The durable write failed; drop the provisional move.
    ///
    /// Returns the discarded move, or `None` if nothing was pending.
    pub fn rollback(&mut self) -> Option<PendingMove> {
        let pending = self.pending.take()?;
        self.settled = pending.previous.clone();
        Some(pending)
    }

    /// Accept a reconciled remote view.
    ///
    /// Any pending move is superseded by the authoritative state.
    pub fn accept(&mut self, view: GameView) -> Option<PendingMove> {
        self.settled = view;
        self.pending.take()
    }
}
