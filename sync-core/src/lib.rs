//! # sync-core
//!
//! Pure logic for tictactoe-sync (no I/O, instant tests).
//!
//! This crate implements the board rules, turn coordination, room
//! lifecycle planning, reconciliation and the subscription state machine
//! without any network or storage I/O.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects:
//! - [`turn::plan_move`] and [`lifecycle::plan_join`] return the patch and
//!   write condition to send, they do not send it
//! - [`reconcile::reconcile`] returns the view to show and what happened
//! - [`state::SubscriptionState::on_event`] returns actions to execute
//!
//! The actual I/O (store writes, subscriptions, timers) is performed by
//! `sync-client`, which interprets these plans and actions.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod board;
pub mod lifecycle;
pub mod pending;
pub mod reconcile;
pub mod state;
pub mod turn;

pub use board::{apply_move, check_win, is_draw, winning_line, IllegalMove, Outcome};
pub use lifecycle::{
    history_record, new_room, plan_join, plan_leave, CreateError, JoinError, JoinPlan,
    LeaveError, LeavePlan,
};
pub use pending::{LedgerError, MoveLedger, PendingMove};
pub use reconcile::{
    reconcile, GameResult, GameView, IgnoreReason, Incoming, Origin, Progress,
    ReconcileAction, ReconcileContext, Reconciled,
};
pub use state::{Action, ChannelEvent, Event, RetryPolicy, SubscriptionState};
pub use turn::{next_turn, plan_move, validate_move, MoveError, MovePlan, TurnOutcome};
