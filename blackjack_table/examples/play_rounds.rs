//! Table Example
//!
//! Plays a few rounds at an in-process table with two players who hit
//! below 17 and stand otherwise.

use std::time::Instant;

use blackjack_table::{
    ActionKind, Phase, SeatManagement, TableState, TableStateManagement, table::TableConfig,
};

fn main() {
    println!("=== Blackjack Table Example ===\n");

    let now = Instant::now();
    let mut table = match TableState::new(1, TableConfig::default()) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("Failed to build shoe: {e}");
            return;
        }
    };

    for (player_id, name) in [(1, "alice"), (2, "bob")] {
        if let Err(e) = table.join(player_id, name, 1000, now) {
            eprintln!("{name} could not sit down: {e}");
            return;
        }
    }

    for round in 1..=3 {
        let started = if table.phase() == Phase::Finished {
            table.new_round(now)
        } else {
            table.start_round(now)
        };
        if let Err(e) = started {
            eprintln!("Round {round} did not start: {e}");
            return;
        }

        for player_id in [1, 2] {
            if let Err(e) = table.place_bet(player_id, 50, now) {
                eprintln!("Player {player_id} could not bet: {e}");
            }
        }

        // Hit below 17, stand otherwise.
        while let Some(turn) = table.turn() {
            let snapshot = table.snapshot(Some(turn.player_id), now);
            let total = snapshot
                .seat_of(turn.player_id)
                .and_then(|seat| seat.hands.get(turn.hand_index))
                .map_or(21, |hand| hand.total);
            let action = if total < 17 {
                ActionKind::Hit
            } else {
                ActionKind::Stand
            };
            if let Err(e) = table.take_action(turn.player_id, action, turn.hand_index, now) {
                eprintln!("Player {} could not {action}: {e}", turn.player_id);
                return;
            }
        }

        let snapshot = table.snapshot(None, now);
        println!("Round {}", snapshot.round_id);
        if let Some(report) = &snapshot.last_round {
            println!(
                "  Dealer: {}{}",
                report.dealer_total,
                if report.dealer_bust { " (bust)" } else { "" }
            );
            for hand in &report.hands {
                println!(
                    "  Player {} hand {}: {} ({:+})",
                    hand.player_id, hand.hand_index, hand.outcome, hand.net
                );
            }
            println!("  House net: {:+}", report.house_net());
        }
        for seat in &snapshot.seats {
            println!("  {} has {} chips", seat.display_name, seat.chips);
        }
        println!();
    }
}
