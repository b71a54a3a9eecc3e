//! Two guests race for the same seat.

use anyhow::Result;
use tictactoe_sync_client::{ClientConfig, Lobby, MemoryBackend, RoomStore};
use tictactoe_sync_core::{plan_join, JoinPlan};
use tictactoe_sync_types::BoardSize;

/// Run the race command.
///
/// Both guests plan their join from the same read, then write in turn.
/// The guarded write lets exactly one of them through.
pub async fn run(config: ClientConfig, size: BoardSize) -> Result<()> {
    let backend = MemoryBackend::new();
    let lobby = Lobby::new(backend.clone(), &config);

    let host = lobby.register_player("host").await?;
    let first = lobby.register_player("first").await?;
    let second = lobby.register_player("second").await?;
    let room = lobby.create_room("race", size, host.id).await?;

    println!("=== ttt-sim race ===");
    println!();
    println!("Room: {} ({})", room.id, size);

    let read = backend.read_room(room.id).await?;
    let claims = [
        (&first, plan_join(&read, first.id)?),
        (&second, plan_join(&read, second.id)?),
    ];

    for (player, plan) in claims {
        let JoinPlan::Claim { patch, condition } = plan else {
            println!("  {}: already seated", player.display_name);
            continue;
        };
        match backend.update_room(room.id, &patch, &condition).await {
            Ok(stored) => println!(
                "  {}: took the seat, room now {}",
                player.display_name, stored.status
            ),
            Err(e) if e.is_conflict() => println!("  {}: lost the race ({})", player.display_name, e),
            Err(e) => return Err(e.into()),
        }
    }

    let late = lobby.register_player("late").await?;
    match lobby.join_room(room.id, late.id).await {
        Ok(_) => println!("  {}: joined", late.display_name),
        Err(e) => println!("  {}: {}", late.display_name, e),
    }

    let accepted = backend.update_log().iter().filter(|r| r.accepted).count();
    println!();
    println!("Accepted joins: {}", accepted);
    if let Some(stored) = backend.room(room.id) {
        println!("{}", serde_json::to_string_pretty(&stored)?);
    }

    Ok(())
}
