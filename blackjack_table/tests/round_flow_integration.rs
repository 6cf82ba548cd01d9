//! Round flow tests driving the state machine directly.
//!
//! Shoes are stacked so every round is deterministic. Deal order is one
//! card per active seat in position order, the dealer's up card, a second
//! card per seat, then the hole card.

use blackjack_table::{
    game::{
        ActionKind, Card, IllegalActionReason, LeaveOutcome, Outcome, Phase, Rank, SeatManagement,
        Shoe, Suit, TableError, TableEvent, TableState, TableStateManagement,
    },
    table::TableConfig,
};
use std::time::{Duration, Instant};

fn stacked_table(config: TableConfig, ranks: &[Rank]) -> TableState {
    let shoe = Shoe::stacked(
        6,
        ranks.iter().map(|&rank| Card::new(rank, Suit::Spade)),
    )
    .unwrap();
    TableState::with_shoe(1, config, shoe)
}

fn seat_players(table: &mut TableState, players: &[i64], now: Instant) {
    for &player_id in players {
        table
            .join(player_id, &format!("player{player_id}"), 1000, now)
            .unwrap();
    }
}

fn chips(table: &TableState, player_id: i64) -> i64 {
    table.data().seat(player_id).unwrap().chips
}

fn total_chips(table: &TableState) -> i64 {
    table.data().seats().iter().map(|seat| seat.chips).sum()
}

/// Stand on every hand until the round leaves PlayerTurns.
fn stand_all(table: &mut TableState, now: Instant) {
    while let Some(turn) = table.turn() {
        table
            .take_action(turn.player_id, ActionKind::Stand, turn.hand_index, now)
            .unwrap();
    }
}

#[test]
fn test_two_player_round_conserves_chips() {
    let now = Instant::now();
    let mut table = stacked_table(
        TableConfig::default(),
        &[
            Rank::Ten,   // p1
            Rank::Five,  // p2
            Rank::Ten,   // dealer up
            Rank::Nine,  // p1 -> 19
            Rank::Six,   // p2 -> 11
            Rank::Seven, // dealer hole -> 17
            Rank::Ten,   // p2 double -> 21
        ],
    );
    seat_players(&mut table, &[1, 2], now);
    table.start_round(now).unwrap();
    table.place_bet(1, 100, now).unwrap();
    assert_eq!(table.phase(), Phase::Betting);
    table.place_bet(2, 50, now).unwrap();

    // Every connected seat has bet, so the window closed and cards are out.
    assert_eq!(table.phase(), Phase::PlayerTurns);
    let turn = table.turn().unwrap();
    assert_eq!((turn.player_id, turn.hand_index), (1, 0));

    table.take_action(1, ActionKind::Stand, 0, now).unwrap();
    table.take_action(2, ActionKind::Double, 0, now).unwrap();

    assert_eq!(table.phase(), Phase::Finished);
    let report = table.data().last_round().unwrap().clone();
    assert_eq!(report.dealer_total, 17);
    assert_eq!(report.hand(1, 0).unwrap().outcome, Outcome::Win);
    assert_eq!(report.hand(2, 0).unwrap().returned, 200);
    assert_eq!(chips(&table, 1), 1100);
    assert_eq!(chips(&table, 2), 1100);
    assert_eq!(total_chips(&table), 2000 - report.house_net());

    let settled = table
        .drain_events()
        .into_iter()
        .filter(|event| matches!(event, TableEvent::RoundSettled(_)))
        .count();
    assert_eq!(settled, 1);
}

#[test]
fn test_split_then_double_settles_each_hand() {
    let now = Instant::now();
    let mut table = stacked_table(
        TableConfig::default(),
        &[
            Rank::Eight, // p1
            Rank::Ten,   // dealer up
            Rank::Eight, // p1 -> pair
            Rank::Nine,  // dealer hole -> 19
            Rank::Three, // first split hand -> 11
            Rank::Ten,   // second split hand -> 18
            Rank::Ten,   // first hand double -> 21
        ],
    );
    seat_players(&mut table, &[1], now);
    table.start_round(now).unwrap();
    table.place_bet(1, 100, now).unwrap();

    let snapshot = table.snapshot(Some(1), now);
    assert!(snapshot.legal_actions.contains(&ActionKind::Split));
    table.take_action(1, ActionKind::Split, 0, now).unwrap();

    let seat = table.data().seat(1).unwrap();
    assert_eq!(seat.hands.len(), 2);
    assert_eq!(seat.chips, 800);
    assert_eq!(seat.chips + seat.total_bet(), 1000);
    assert!(seat.hands.iter().all(|hand| hand.is_split && hand.cards.len() == 2));

    // Split hands can't surrender.
    let error = table
        .take_action(1, ActionKind::Surrender, 0, now)
        .unwrap_err();
    assert_eq!(
        error,
        TableError::IllegalAction {
            reason: IllegalActionReason::SurrenderNotFirstAction
        }
    );

    table.take_action(1, ActionKind::Double, 0, now).unwrap();
    assert_eq!(table.turn().unwrap().hand_index, 1);
    table.take_action(1, ActionKind::Stand, 1, now).unwrap();

    assert_eq!(table.phase(), Phase::Finished);
    let report = table.data().last_round().unwrap();
    assert_eq!(report.hand(1, 0).unwrap().outcome, Outcome::Win);
    assert_eq!(report.hand(1, 0).unwrap().bet, 200);
    assert_eq!(report.hand(1, 1).unwrap().outcome, Outcome::Lose);
    assert_eq!(report.deltas[0].delta, 100);
    assert_eq!(chips(&table, 1), 1100);
}

#[test]
fn test_rejected_commands_leave_state_untouched() {
    let now = Instant::now();
    let mut table = stacked_table(
        TableConfig::default(),
        &[Rank::Ten, Rank::Five, Rank::Nine, Rank::Six, Rank::Seven, Rank::Ten],
    );
    seat_players(&mut table, &[1, 2], now);
    table.start_round(now).unwrap();
    table.place_bet(1, 100, now).unwrap();

    assert!(matches!(
        table.place_bet(1, 100, now),
        Err(TableError::IllegalAction {
            reason: IllegalActionReason::BetAlreadyPlaced
        })
    ));
    assert!(matches!(
        table.place_bet(2, 5, now),
        Err(TableError::BetOutOfRange { amount: 5, .. })
    ));
    assert!(matches!(
        table.take_action(1, ActionKind::Hit, 0, now),
        Err(TableError::InvalidPhase {
            phase: Phase::Betting
        })
    ));
    assert_eq!(chips(&table, 1), 900);
    assert_eq!(chips(&table, 2), 1000);

    table.place_bet(2, 10, now).unwrap();
    assert!(matches!(
        table.take_action(2, ActionKind::Stand, 0, now),
        Err(TableError::NotYourTurn { turn: Some(turn) }) if turn.player_id == 1
    ));
    assert!(matches!(
        table.take_action(1, ActionKind::Stand, 1, now),
        Err(TableError::NotYourTurn { .. })
    ));
    assert_eq!(table.turn().unwrap().player_id, 1);
}

#[test]
fn test_betting_window_without_bets_returns_to_waiting() {
    let now = Instant::now();
    let mut table = TableState::new(1, TableConfig::default()).unwrap();
    seat_players(&mut table, &[1], now);
    table.start_round(now).unwrap();

    let deadline = table.next_deadline().unwrap();
    assert!(!table.on_timer(deadline - Duration::from_millis(1)).unwrap());
    assert_eq!(table.phase(), Phase::Betting);

    assert!(table.on_timer(deadline).unwrap());
    assert_eq!(table.phase(), Phase::Waiting);
    assert!(table.data().dealer().hand.cards.is_empty());
    assert_eq!(table.data().seat(1).unwrap().missed_rounds, 1);
}

#[test]
fn test_idle_seat_is_evicted_after_missed_round_limit() {
    let mut now = Instant::now();
    let mut table = TableState::new(1, TableConfig::default()).unwrap();
    seat_players(&mut table, &[1], now);

    for _ in 0..3 {
        table.start_round(now).unwrap();
        now = table.next_deadline().unwrap();
        table.on_timer(now).unwrap();
    }

    assert!(table.data().seats().is_empty());
    assert_eq!(table.phase(), Phase::Waiting);
    let evicted = table
        .drain_events()
        .into_iter()
        .find_map(|event| match event {
            TableEvent::Evicted {
                player_id, chips, ..
            } => Some((player_id, chips)),
            _ => None,
        });
    assert_eq!(evicted, Some((1, 1000)));
}

#[test]
fn test_turn_timeout_auto_stands_and_round_completes() {
    let now = Instant::now();
    let mut table = stacked_table(
        TableConfig::default(),
        &[Rank::Ten, Rank::Ten, Rank::Eight, Rank::Seven],
    );
    seat_players(&mut table, &[1], now);
    table.start_round(now).unwrap();
    table.place_bet(1, 10, now).unwrap();
    assert_eq!(table.phase(), Phase::PlayerTurns);

    let deadline = table.next_deadline().unwrap();
    assert_eq!(deadline, now + TableConfig::default().turn_timeout());
    assert!(table.on_timer(deadline).unwrap());

    assert_eq!(table.phase(), Phase::Finished);
    assert!(table.drain_events().iter().any(|event| matches!(
        event,
        TableEvent::AutoStood {
            player_id: 1,
            hand_index: 0
        }
    )));
    // 18 against 17
    assert_eq!(chips(&table, 1), 1010);
}

#[test]
fn test_leaving_mid_round_keeps_seat_until_settlement() {
    let now = Instant::now();
    let mut table = stacked_table(
        TableConfig::default(),
        &[
            Rank::Ten,
            Rank::Nine,
            Rank::Ten,
            Rank::Eight,
            Rank::Nine,
            Rank::Seven,
        ],
    );
    seat_players(&mut table, &[1, 2], now);
    table.start_round(now).unwrap();
    table.place_bet(1, 50, now).unwrap();
    table.place_bet(2, 50, now).unwrap();

    assert_eq!(
        table.leave(1, now).unwrap(),
        LeaveOutcome::RemovedAtRoundEnd
    );
    table.advance(now);
    assert!(table.data().seat(1).unwrap().leaving);

    // A leaving seat only keeps its turn for the grace period.
    let grace = TableConfig::default().disconnect_grace();
    assert_eq!(table.next_deadline(), Some(now + grace));
    table.on_timer(now + grace).unwrap();
    assert_eq!(table.turn().unwrap().player_id, 2);

    stand_all(&mut table, now + grace);
    assert_eq!(table.phase(), Phase::Finished);
    assert!(table.data().seat(1).is_none());
    assert!(table.drain_events().iter().any(|event| matches!(
        event,
        TableEvent::Left {
            player_id: 1,
            chips: 1050
        }
    )));
}

#[test]
fn test_next_round_resets_hands_and_clears_report() {
    let now = Instant::now();
    let mut table = stacked_table(
        TableConfig::default(),
        &[Rank::Ten, Rank::Ten, Rank::Seven, Rank::Seven],
    );
    seat_players(&mut table, &[1], now);
    table.start_round(now).unwrap();
    table.place_bet(1, 10, now).unwrap();
    stand_all(&mut table, now);
    assert_eq!(table.phase(), Phase::Finished);

    let snapshot = table.snapshot(Some(1), now);
    assert_eq!(snapshot.seats[0].hands[0].outcome, Some(Outcome::Push));
    assert!(snapshot.dealer.hole_card_revealed);

    table.new_round(now).unwrap();
    assert_eq!(table.phase(), Phase::Betting);
    assert_eq!(table.data().round_id(), 2);
    assert!(table.data().last_round().is_none());
    assert!(table.data().seat(1).unwrap().hands.is_empty());
    assert!(table.data().dealer().hand.cards.is_empty());
}

#[test]
fn test_many_rounds_conserve_chips_across_reshuffles() {
    let config = TableConfig {
        deck_count: 1,
        ..TableConfig::default()
    };
    let mut now = Instant::now();
    let mut table = TableState::new(1, config).unwrap();
    seat_players(&mut table, &[1, 2, 3], now);

    let mut house_net = 0;
    for round in 0..40 {
        if round == 0 {
            table.start_round(now).unwrap();
        } else {
            table.new_round(now).unwrap();
        }
        for player_id in 1..=3 {
            if chips(&table, player_id) >= 10 {
                table.place_bet(player_id, 10, now).unwrap();
            }
        }
        if table.phase() == Phase::Betting {
            now = table.next_deadline().unwrap();
            table.on_timer(now).unwrap();
        }
        stand_all(&mut table, now);
        table.check_invariants().unwrap();

        assert_eq!(table.phase(), Phase::Finished);
        house_net += table.data().last_round().unwrap().house_net();
        assert_eq!(total_chips(&table), 3000 - house_net);
        now += Duration::from_secs(1);
    }
}

#[test]
fn test_resplit_to_limit_then_play_hands_in_order() {
    let now = Instant::now();
    let mut table = stacked_table(
        TableConfig::default(),
        &[
            Rank::Eight, // p1
            Rank::Ten,   // dealer up
            Rank::Eight, // p1 -> pair
            Rank::Nine,  // dealer hole -> 19
            Rank::Eight, // first split: hand 0 stays a pair
            Rank::Two,   // new hand 1 -> 10
            Rank::Eight, // second split: hand 0 stays a pair
            Rank::Three, // new hand 1 -> 11
            Rank::Eight, // third split: hand 0 stays a pair
            Rank::Four,  // new hand 1 -> 12
        ],
    );
    seat_players(&mut table, &[1], now);
    table.start_round(now).unwrap();
    table.place_bet(1, 100, now).unwrap();

    for _ in 0..3 {
        table.take_action(1, ActionKind::Split, 0, now).unwrap();
    }
    let seat = table.data().seat(1).unwrap();
    assert_eq!(seat.hands.len(), 4);
    assert_eq!(seat.chips, 600);

    let snapshot = table.snapshot(Some(1), now);
    assert!(!snapshot.legal_actions.contains(&ActionKind::Split));
    let error = table.take_action(1, ActionKind::Split, 0, now).unwrap_err();
    assert_eq!(
        error,
        TableError::IllegalAction {
            reason: IllegalActionReason::SplitLimitReached(3)
        }
    );
    assert_eq!(table.data().seat(1).unwrap().hands.len(), 4);

    // Each new hand went in right after the hand it came from.
    let totals: Vec<u8> = table
        .data()
        .seat(1)
        .unwrap()
        .hands
        .iter()
        .map(|hand| hand.value().total)
        .collect();
    assert_eq!(totals, vec![16, 12, 11, 10]);

    for expected in 0..4 {
        let turn = table.turn().unwrap();
        assert_eq!((turn.player_id, turn.hand_index), (1, expected));
        table
            .take_action(1, ActionKind::Stand, expected, now)
            .unwrap();
    }

    assert_eq!(table.phase(), Phase::Finished);
    let report = table.data().last_round().unwrap();
    assert_eq!(report.hands.len(), 4);
    assert!(report.hands.iter().all(|hand| hand.outcome == Outcome::Lose));
    assert_eq!(chips(&table, 1), 600);
}

#[test]
fn test_double_after_split_can_be_disabled() {
    let now = Instant::now();
    let mut table = stacked_table(
        TableConfig {
            allow_double_after_split: false,
            ..TableConfig::default()
        },
        &[
            Rank::Eight, // p1
            Rank::Ten,   // dealer up
            Rank::Eight, // p1 -> pair
            Rank::Seven, // dealer hole -> 17
            Rank::Three, // hand 0 -> 11
            Rank::Ten,   // hand 1 -> 18
        ],
    );
    seat_players(&mut table, &[1], now);
    table.start_round(now).unwrap();
    table.place_bet(1, 100, now).unwrap();
    table.take_action(1, ActionKind::Split, 0, now).unwrap();

    let snapshot = table.snapshot(Some(1), now);
    assert!(!snapshot.legal_actions.contains(&ActionKind::Double));
    let error = table.take_action(1, ActionKind::Double, 0, now).unwrap_err();
    assert_eq!(
        error,
        TableError::IllegalAction {
            reason: IllegalActionReason::DoubleAfterSplit
        }
    );
    assert_eq!(table.data().seat(1).unwrap().chips, 800);

    stand_all(&mut table, now);
    let report = table.data().last_round().unwrap();
    assert_eq!(report.hand(1, 0).unwrap().outcome, Outcome::Lose);
    assert_eq!(report.hand(1, 1).unwrap().outcome, Outcome::Win);
    assert_eq!(chips(&table, 1), 1000);
}
