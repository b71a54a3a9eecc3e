//! Play a scripted match between two in-process sessions.

use anyhow::{Context, Result};
use std::time::Duration;
use tictactoe_sync_client::{
    ClientConfig, ClientError, GameSession, Lobby, MemoryBackend, SessionEvent,
};
use tictactoe_sync_core::ChannelEvent;
use tictactoe_sync_types::BoardSize;

/// How long a session may stay quiet before its feed counts as drained.
const SETTLE: Duration = Duration::from_millis(200);

const LABELS: [&str; 2] = ["host", "guest"];

/// Options for the simulate command.
#[derive(Debug)]
pub struct Options {
    /// Board size.
    pub size: BoardSize,
    /// Cells to play, in order.
    pub moves: Vec<usize>,
    /// Swallow every broadcast.
    pub drop_broadcasts: bool,
    /// 1-based scripted move whose durable write fails.
    pub fail_write: Option<usize>,
    /// Scripted move after which the waiting player leaves.
    pub leave_after: Option<usize>,
}

/// Run the simulate command.
pub async fn run(config: ClientConfig, options: Options) -> Result<()> {
    let backend = MemoryBackend::new();
    let lobby = Lobby::new(backend.clone(), &config);

    let host = lobby.register_player(LABELS[0]).await?;
    let guest = lobby.register_player(LABELS[1]).await?;
    let room = lobby.create_room("sim", options.size, host.id).await?;
    lobby.join_room(room.id, guest.id).await?;
    backend.drop_broadcasts(options.drop_broadcasts);
    tracing::info!(
        "Simulating {} scripted moves in room {}",
        options.moves.len(),
        room.id
    );

    println!("=== ttt-sim simulate ===");
    println!();
    println!("Room:  {} ({})", room.id, options.size);
    println!("Host:  {} (X)", host.id);
    println!("Guest: {} (O)", guest.id);
    println!();

    let mut sessions = [
        GameSession::initialize(backend.clone(), room.id, host.id, config.clone()).await?,
        GameSession::initialize(backend.clone(), room.id, guest.id, config).await?,
    ];
    for (i, session) in sessions.iter_mut().enumerate() {
        drain(session, LABELS[i]).await?;
    }

    for (n, &cell) in options.moves.iter().enumerate() {
        let number = n + 1;
        let Some(mover) = sessions.iter().position(|s| s.is_my_turn()) else {
            println!("Game over, skipping remaining moves");
            break;
        };

        if options.fail_write == Some(number) {
            backend.fail_next_update("injected write failure");
        }

        match sessions[mover].request_move(cell).await {
            Ok(outcome) => {
                let note = if outcome.broadcast { "" } else { " (no broadcast)" };
                println!(
                    "#{} {} plays {} at {}{}",
                    number, LABELS[mover], outcome.record.mark, cell, note
                );
            }
            Err(e @ ClientError::MoveRolledBack { .. }) => {
                println!("#{} {} {}", number, LABELS[mover], e);
            }
            Err(e) if e.is_actor_error() => {
                println!("#{} {} rejected: {}", number, LABELS[mover], e);
            }
            Err(e) => return Err(e).context("Move failed"),
        }

        drain(&mut sessions[1 - mover], LABELS[1 - mover]).await?;
        drain(&mut sessions[mover], LABELS[mover]).await?;

        if options.leave_after == Some(number) {
            let leaver = if sessions[0].is_my_turn() { 1 } else { 0 };
            match sessions[leaver].request_leave().await? {
                Some(result) => println!(
                    "{} leaves, winner by forfeit: {:?}",
                    LABELS[leaver], result.winner_id
                ),
                None => println!("{} leaves, nothing to forfeit", LABELS[leaver]),
            }
            drain(&mut sessions[1 - leaver], LABELS[1 - leaver]).await?;
            break;
        }
    }

    let stored = backend
        .room(room.id)
        .context("Room missing from backend")?;
    println!();
    println!("Board:");
    println!("{}", stored.board);
    println!();
    println!("Room:");
    println!("{}", serde_json::to_string_pretty(&stored)?);

    let history = backend.history();
    println!();
    println!("History ({} record{}):", history.len(), if history.len() == 1 { "" } else { "s" });
    for record in &history {
        println!("{}", serde_json::to_string_pretty(record)?);
    }

    println!();
    println!(
        "Writes: {} accepted, {} rejected, {} terminal; broadcasts: {}",
        backend.update_log().iter().filter(|r| r.accepted).count(),
        backend.update_log().iter().filter(|r| !r.accepted).count(),
        backend.terminal_writes(room.id),
        backend.published_count()
    );

    Ok(())
}

/// Print everything a session produces until it goes quiet.
async fn drain(session: &mut GameSession<MemoryBackend>, label: &str) -> Result<()> {
    loop {
        match tokio::time::timeout(SETTLE, session.next_event()).await {
            Ok(Ok(event)) => println!("   {} <- {}", label, describe(&event)),
            Ok(Err(ClientError::SessionClosed)) | Err(_) => return Ok(()),
            Ok(Err(e)) => return Err(e).with_context(|| format!("{} session failed", label)),
        }
    }
}

fn describe(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Initialized { room, my_mark } => {
            format!("initialized as {} ({})", my_mark, room.status)
        }
        SessionEvent::GameStarted { room } => format!("game started, {} to move", room.status),
        SessionEvent::OpponentMoved { record, view } => format!(
            "opponent {} at {} ({} occupied)",
            record.mark,
            record.cell_index,
            view.board.occupied_count()
        ),
        SessionEvent::GameEnded(result) => match (&result.winner_id, &result.winning_line) {
            (Some(winner), Some(line)) => format!("game ended, {} won on {:?}", winner, line),
            (Some(winner), None) => format!("game ended, {} won by forfeit", winner),
            (None, _) => "game ended in a draw".to_string(),
        },
        SessionEvent::Resynced { view } => {
            format!("resynced ({}, {} occupied)", view.status, view.board.occupied_count())
        }
        SessionEvent::Channel(event) => match event {
            ChannelEvent::Subscribed => "subscribed".to_string(),
            ChannelEvent::Recovered => "resubscribed".to_string(),
            ChannelEvent::Interrupted { error } => format!("channel interrupted: {}", error),
            ChannelEvent::SubscribeFailed { attempt, error } => {
                format!("subscribe attempt {} failed: {}", attempt, error)
            }
            ChannelEvent::GaveUp { attempts, error } => {
                format!("gave up after {} attempts: {}", attempts, error)
            }
        },
    }
}
