//! Blackjack round state machine.
//!
//! A table is a [`Game<T>`] whose type parameter is the current phase. The
//! phases are wrapped in [`TableState`] so that a table can be stored and
//! driven without knowing its phase at compile time. Commands validate
//! first and mutate second, so a rejected command leaves the table
//! untouched.

use enum_dispatch::enum_dispatch;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, fmt, mem, time::Instant};

use super::{
    Chips, PlayerId, RoundId, SeatPosition,
    card::{Shoe, ShoeError},
    dealer::Dealer,
    errors::{IllegalActionReason, TableError, TableResult},
    hand::Hand,
    seat::{LeaveOutcome, Seat},
    settlement::{ChipDelta, DealerResult, HandSettlement, RoundReport, settle_hand},
    states::{
        ActionKind, Betting, Cursor, DealerTurn, Dealing, Finished, Phase, PlayerTurns,
        Settlement, TurnPointer, Waiting,
    },
    view::TableSnapshot,
};
use crate::{table::config::TableConfig, wallet::TableId};

/// Things that happened at the table that the owner of the state machine
/// may want to act on (persist, log, broadcast).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum TableEvent {
    Seated {
        player_id: PlayerId,
        position: SeatPosition,
    },
    Left {
        player_id: PlayerId,
        chips: Chips,
    },
    Evicted {
        player_id: PlayerId,
        chips: Chips,
        missed_rounds: u32,
    },
    RoundStarted {
        round_id: RoundId,
    },
    BettingClosed {
        round_id: RoundId,
        bets: usize,
    },
    AutoStood {
        player_id: PlayerId,
        hand_index: usize,
    },
    RoundSettled(RoundReport),
}

impl fmt::Display for TableEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Seated {
                player_id,
                position,
            } => format!("player {player_id} sat down at seat {position}"),
            Self::Left { player_id, chips } => {
                format!("player {player_id} left with ${chips}")
            }
            Self::Evicted {
                player_id,
                missed_rounds,
                ..
            } => format!("player {player_id} evicted after missing {missed_rounds} rounds"),
            Self::RoundStarted { round_id } => format!("round {round_id} betting opened"),
            Self::BettingClosed { round_id, bets } => {
                format!("round {round_id} betting closed with {bets} bets")
            }
            Self::AutoStood {
                player_id,
                hand_index,
            } => format!("player {player_id} hand {hand_index} auto-stood"),
            Self::RoundSettled(report) => format!(
                "round {} settled, dealer {}",
                report.round_id, report.dealer_total
            ),
        };
        write!(f, "{repr}")
    }
}

/// Mutable table data shared across all phases
#[derive(Debug, Default)]
pub struct TableData {
    table_id: TableId,
    config: TableConfig,
    /// Ordered by ascending position. Positions are sparse.
    seats: Vec<Seat>,
    dealer: Dealer,
    shoe: Shoe,
    round_id: RoundId,
    seq: u64,
    /// Report of the most recent settlement, cleared when the next round
    /// opens.
    last_round: Option<RoundReport>,
    events: VecDeque<TableEvent>,
    /// Set when a transition that can't fail hits an impossible state.
    /// Reported by [`TableState::check_invariants`].
    fault: Option<String>,
}

impl TableData {
    pub fn new(table_id: TableId, config: TableConfig) -> Result<Self, ShoeError> {
        let shoe = Shoe::with_threshold(config.deck_count, config.reshuffle_threshold_pct)?;
        Ok(Self::with_shoe(table_id, config, shoe))
    }

    #[must_use]
    pub fn with_shoe(table_id: TableId, config: TableConfig, shoe: Shoe) -> Self {
        Self {
            table_id,
            seats: Vec::with_capacity(config.max_seats),
            config,
            shoe,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    #[must_use]
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    #[must_use]
    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    #[must_use]
    pub fn dealer(&self) -> &Dealer {
        &self.dealer
    }

    #[must_use]
    pub fn round_id(&self) -> RoundId {
        self.round_id
    }

    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    #[must_use]
    pub fn last_round(&self) -> Option<&RoundReport> {
        self.last_round.as_ref()
    }

    #[must_use]
    pub fn shoe_remaining(&self) -> usize {
        self.shoe.remaining()
    }

    #[must_use]
    pub fn seat(&self, player_id: PlayerId) -> Option<&Seat> {
        self.seats.iter().find(|seat| seat.player_id == player_id)
    }

    fn seat_mut(&mut self, player_id: PlayerId) -> Option<&mut Seat> {
        self.seats.iter_mut().find(|seat| seat.player_id == player_id)
    }

    #[must_use]
    pub fn seat_at(&self, position: SeatPosition) -> Option<&Seat> {
        self.seats.iter().find(|seat| seat.position == position)
    }

    fn seat_at_mut(&mut self, position: SeatPosition) -> Option<&mut Seat> {
        self.seats.iter_mut().find(|seat| seat.position == position)
    }

    fn hand_at(&self, cursor: Cursor) -> Option<&Hand> {
        self.seat_at(cursor.seat_position)
            .and_then(|seat| seat.hands.get(cursor.hand_index))
    }

    #[must_use]
    pub fn turn_pointer(&self, cursor: Cursor) -> Option<TurnPointer> {
        self.seat_at(cursor.seat_position).map(|seat| TurnPointer {
            seat_position: seat.position,
            player_id: seat.player_id,
            hand_index: cursor.hand_index,
        })
    }

    /// First unfinished hand at or after `from`, in seat then hand order.
    fn next_open_hand(&self, from: Cursor) -> Option<Cursor> {
        self.seats
            .iter()
            .filter(|seat| seat.position >= from.seat_position)
            .find_map(|seat| {
                let first = if seat.position == from.seat_position {
                    from.hand_index
                } else {
                    0
                };
                seat.hands
                    .iter()
                    .enumerate()
                    .skip(first)
                    .find(|(_, hand)| !hand.is_finished)
                    .map(|(hand_index, _)| Cursor {
                        seat_position: seat.position,
                        hand_index,
                    })
            })
    }

    fn turn_deadline_for(&self, cursor: Cursor, now: Instant) -> Instant {
        let away = self
            .seat_at(cursor.seat_position)
            .is_none_or(Seat::is_away);
        if away {
            now + self.config.disconnect_grace()
        } else {
            now + self.config.turn_timeout()
        }
    }

    /// At least one bet is down and every connected seat has bet.
    fn all_connected_seats_bet(&self) -> bool {
        let mut any_bet = false;
        for seat in &self.seats {
            if seat.has_live_bet() {
                any_bet = true;
            } else if seat.connected {
                return false;
            }
        }
        any_bet
    }

    /// Remove seats that have missed too many betting windows.
    fn evict_idle_seats(&mut self) {
        let limit = self.config.missed_round_limit;
        let (evicted, kept) = mem::take(&mut self.seats)
            .into_iter()
            .partition::<Vec<_>, _>(|seat| seat.missed_rounds > limit && !seat.has_live_bet());
        self.seats = kept;
        for seat in evicted {
            info!(
                "Evicting player {} from table {} after {} missed rounds",
                seat.player_id, self.table_id, seat.missed_rounds
            );
            self.events.push_back(TableEvent::Evicted {
                player_id: seat.player_id,
                chips: seat.chips,
                missed_rounds: seat.missed_rounds,
            });
        }
    }

    /// Check whether `kind` is allowed for the hand under `cursor`.
    pub fn validate_action(&self, cursor: Cursor, kind: ActionKind) -> TableResult<()> {
        let seat = self
            .seat_at(cursor.seat_position)
            .ok_or_else(|| TableError::invariant("turn cursor points at an empty seat"))?;
        let hand = seat
            .hands
            .get(cursor.hand_index)
            .ok_or_else(|| TableError::invariant("turn cursor points past the last hand"))?;

        if hand.is_finished {
            return Err(TableError::illegal(IllegalActionReason::HandFinished));
        }
        let insufficient = || TableError::InsufficientChips {
            required: hand.bet,
            available: seat.chips,
        };
        match kind {
            ActionKind::Hit | ActionKind::Stand => Ok(()),
            ActionKind::Double => {
                if hand.cards.len() != 2 {
                    Err(TableError::illegal(IllegalActionReason::NotTwoCards))
                } else if hand.is_split && !self.config.allow_double_after_split {
                    Err(TableError::illegal(IllegalActionReason::DoubleAfterSplit))
                } else if seat.chips < hand.bet {
                    Err(insufficient())
                } else {
                    Ok(())
                }
            }
            ActionKind::Split => {
                if hand.cards.len() != 2 {
                    Err(TableError::illegal(IllegalActionReason::NotTwoCards))
                } else if !hand.is_pair() {
                    Err(TableError::illegal(IllegalActionReason::NotAPair))
                } else if seat.splits_this_round >= self.config.max_splits {
                    Err(TableError::illegal(IllegalActionReason::SplitLimitReached(
                        self.config.max_splits,
                    )))
                } else if seat.chips < hand.bet {
                    Err(insufficient())
                } else {
                    Ok(())
                }
            }
            ActionKind::Surrender => {
                if hand.cards.len() != 2 {
                    Err(TableError::illegal(IllegalActionReason::NotTwoCards))
                } else if hand.is_split || hand.actions_taken > 0 {
                    Err(TableError::illegal(
                        IllegalActionReason::SurrenderNotFirstAction,
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }

    #[must_use]
    pub fn legal_actions(&self, cursor: Cursor) -> Vec<ActionKind> {
        ActionKind::ALL
            .into_iter()
            .filter(|&kind| self.validate_action(cursor, kind).is_ok())
            .collect()
    }

    /// Apply an already validated action.
    fn apply_action(&mut self, cursor: Cursor, kind: ActionKind) -> TableResult<()> {
        let Self { seats, shoe, .. } = self;
        let seat = seats
            .iter_mut()
            .find(|seat| seat.position == cursor.seat_position)
            .ok_or_else(|| TableError::invariant("turn cursor points at an empty seat"))?;
        let idx = cursor.hand_index;
        let bet = seat
            .hands
            .get(idx)
            .map(|hand| hand.bet)
            .ok_or_else(|| TableError::invariant("turn cursor points past the last hand"))?;

        match kind {
            ActionKind::Hit => {
                let card = shoe.draw();
                if let Some(hand) = seat.hands.get_mut(idx) {
                    hand.cards.push(card);
                    hand.is_finished = hand.value().is_bust;
                }
            }
            ActionKind::Stand => {
                if let Some(hand) = seat.hands.get_mut(idx) {
                    hand.is_finished = true;
                }
            }
            ActionKind::Double => {
                seat.debit(bet)?;
                let card = shoe.draw();
                if let Some(hand) = seat.hands.get_mut(idx) {
                    hand.bet += bet;
                    hand.is_doubled = true;
                    hand.cards.push(card);
                    hand.is_finished = true;
                }
            }
            ActionKind::Split => {
                seat.debit(bet)?;
                let moved = {
                    let hand = seat.hands.get_mut(idx).ok_or_else(|| {
                        TableError::invariant("turn cursor points past the last hand")
                    })?;
                    let moved = hand
                        .cards
                        .pop()
                        .ok_or_else(|| TableError::invariant("split of an empty hand"))?;
                    hand.is_split = true;
                    hand.cards.push(shoe.draw());
                    moved
                };
                let new_hand = Hand {
                    cards: vec![moved, shoe.draw()],
                    bet,
                    is_split: true,
                    ..Default::default()
                };
                seat.hands.insert(idx + 1, new_hand);
                seat.splits_this_round += 1;
            }
            ActionKind::Surrender => {
                if let Some(hand) = seat.hands.get_mut(idx) {
                    hand.is_surrendered = true;
                    hand.is_finished = true;
                }
            }
        }
        if let Some(hand) = seat.hands.get_mut(idx) {
            hand.actions_taken = hand.actions_taken.saturating_add(1);
        }
        Ok(())
    }

    fn join(
        &mut self,
        player_id: PlayerId,
        display_name: &str,
        chips: Chips,
    ) -> TableResult<SeatPosition> {
        if self.seat(player_id).is_some() {
            return Err(TableError::AlreadySeated);
        }
        let max_seats = self.config.max_seats;
        let position = (1..=max_seats)
            .find(|&position| self.seat_at(position).is_none())
            .ok_or(TableError::TableFull { max_seats })?;

        let chips = chips.max(0);
        let idx = self.seats.partition_point(|seat| seat.position < position);
        self.seats
            .insert(idx, Seat::new(player_id, display_name, chips, position));
        self.events.push_back(TableEvent::Seated {
            player_id,
            position,
        });
        info!(
            "Player {} joined table {} at seat {} with {} chips",
            player_id, self.table_id, position, chips
        );
        Ok(position)
    }

    fn leave(&mut self, player_id: PlayerId) -> TableResult<LeaveOutcome> {
        let idx = self
            .seats
            .iter()
            .position(|seat| seat.player_id == player_id)
            .ok_or(TableError::UnknownPlayer { player_id })?;

        if self.seats[idx].has_live_bet() {
            let seat = &mut self.seats[idx];
            seat.leaving = true;
            info!(
                "Player {} leaving table {} after round {}",
                player_id, self.table_id, self.round_id
            );
            return Ok(LeaveOutcome::RemovedAtRoundEnd);
        }

        let seat = self.seats.remove(idx);
        self.events.push_back(TableEvent::Left {
            player_id,
            chips: seat.chips,
        });
        info!(
            "Player {} left table {} with {} chips",
            player_id, self.table_id, seat.chips
        );
        Ok(LeaveOutcome::Removed { chips: seat.chips })
    }

    fn set_connected(&mut self, player_id: PlayerId, connected: bool) -> TableResult<()> {
        let seat = self
            .seat_mut(player_id)
            .ok_or(TableError::UnknownPlayer { player_id })?;
        if seat.connected != connected {
            debug!("Player {player_id} connected: {connected}");
        }
        seat.connected = connected;
        Ok(())
    }
}

/// Phase-specific behavior shared by every [`Game<T>`].
pub trait PhaseState {
    const PHASE: Phase;

    fn betting_deadline(&self) -> Option<Instant> {
        None
    }

    /// Hand under the cursor and when it is auto-stood.
    fn turn(&self) -> Option<(Cursor, Instant)> {
        None
    }

    /// Next instant at which a timer event could change the table.
    fn timer(&self) -> Option<Instant> {
        None
    }

    /// Called after a seat joined, left or changed connection.
    fn on_seat_change(&mut self, _data: &mut TableData, _now: Instant) {}
}

impl PhaseState for Waiting {
    const PHASE: Phase = Phase::Waiting;
}

impl PhaseState for Betting {
    const PHASE: Phase = Phase::Betting;

    fn betting_deadline(&self) -> Option<Instant> {
        Some(self.deadline)
    }

    fn timer(&self) -> Option<Instant> {
        (!self.closed).then_some(self.deadline)
    }

    fn on_seat_change(&mut self, data: &mut TableData, _now: Instant) {
        if !self.closed && data.config.close_betting_when_all_bet && data.all_connected_seats_bet()
        {
            close_betting(&mut self.closed, data);
        }
    }
}

impl PhaseState for Dealing {
    const PHASE: Phase = Phase::Dealing;
}

impl PhaseState for PlayerTurns {
    const PHASE: Phase = Phase::PlayerTurns;

    fn turn(&self) -> Option<(Cursor, Instant)> {
        self.cursor.map(|cursor| (cursor, self.turn_deadline))
    }

    fn timer(&self) -> Option<Instant> {
        self.cursor.map(|_| self.turn_deadline)
    }

    fn on_seat_change(&mut self, data: &mut TableData, now: Instant) {
        let Some(cursor) = self.cursor else {
            return;
        };
        if data.seat_at(cursor.seat_position).is_none_or(Seat::is_away) {
            self.turn_deadline = self.turn_deadline.min(now + data.config.disconnect_grace());
        }
    }
}

impl PhaseState for DealerTurn {
    const PHASE: Phase = Phase::DealerTurn;
}

impl PhaseState for Settlement {
    const PHASE: Phase = Phase::Settlement;
}

impl PhaseState for Finished {
    const PHASE: Phase = Phase::Finished;
}

/// Close the betting window: seats without a bet miss the round and
/// seats over the missed-round limit are evicted.
fn close_betting(closed: &mut bool, data: &mut TableData) {
    *closed = true;
    let mut bets = 0;
    for seat in &mut data.seats {
        if seat.has_live_bet() {
            bets += 1;
            seat.missed_rounds = 0;
        } else {
            seat.missed_rounds += 1;
        }
    }
    data.evict_idle_seats();
    data.events.push_back(TableEvent::BettingClosed {
        round_id: data.round_id,
        bets,
    });
    info!(
        "Table {} round {} betting closed with {} bets",
        data.table_id, data.round_id, bets
    );
}

/// Trait for reading table state regardless of phase
#[enum_dispatch]
pub trait TableStateManagement {
    fn phase(&self) -> Phase;

    fn data(&self) -> &TableData;

    fn drain_events(&mut self) -> VecDeque<TableEvent>;

    /// Earliest instant at which [`TableState::on_timer`] has work to do.
    fn next_deadline(&self) -> Option<Instant>;

    fn turn(&self) -> Option<TurnPointer>;

    /// Record that one command or timer event was applied.
    fn bump_seq(&mut self) -> u64;

    /// Get the table as seen by `viewer`
    ///
    /// # Important
    /// This function's return value should be used - ignoring it wastes computation
    #[must_use]
    fn snapshot(&self, viewer: Option<PlayerId>, now: Instant) -> TableSnapshot;
}

/// Trait for seat management, allowed in every phase.
///
/// A seat change can close the betting window; follow it with
/// [`TableState::advance`].
#[enum_dispatch]
pub trait SeatManagement {
    /// Seat a player in the lowest free position.
    fn join(
        &mut self,
        player_id: PlayerId,
        display_name: &str,
        chips: Chips,
        now: Instant,
    ) -> TableResult<SeatPosition>;

    /// Free the seat now, or at round end when it has a live bet.
    fn leave(&mut self, player_id: PlayerId, now: Instant) -> TableResult<LeaveOutcome>;

    fn set_connected(
        &mut self,
        player_id: PlayerId,
        connected: bool,
        now: Instant,
    ) -> TableResult<()>;
}

/// A blackjack table with data and logic for running rounds end-to-end.
#[derive(Debug)]
pub struct Game<T> {
    pub data: TableData,
    pub state: T,
}

impl<T> Game<T> {
    fn into_phase<U>(self, state: U) -> Game<U> {
        Game {
            data: self.data,
            state,
        }
    }
}

impl<T: PhaseState> TableStateManagement for Game<T> {
    fn phase(&self) -> Phase {
        T::PHASE
    }

    fn data(&self) -> &TableData {
        &self.data
    }

    fn drain_events(&mut self) -> VecDeque<TableEvent> {
        mem::take(&mut self.data.events)
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.state.timer()
    }

    fn turn(&self) -> Option<TurnPointer> {
        self.state
            .turn()
            .and_then(|(cursor, _)| self.data.turn_pointer(cursor))
    }

    fn bump_seq(&mut self) -> u64 {
        self.data.seq += 1;
        self.data.seq
    }

    fn snapshot(&self, viewer: Option<PlayerId>, now: Instant) -> TableSnapshot {
        TableSnapshot::project(
            &self.data,
            T::PHASE,
            self.state.betting_deadline(),
            self.state.turn(),
            viewer,
            now,
        )
    }
}

impl<T: PhaseState> SeatManagement for Game<T> {
    fn join(
        &mut self,
        player_id: PlayerId,
        display_name: &str,
        chips: Chips,
        now: Instant,
    ) -> TableResult<SeatPosition> {
        let position = self.data.join(player_id, display_name, chips)?;
        self.state.on_seat_change(&mut self.data, now);
        Ok(position)
    }

    fn leave(&mut self, player_id: PlayerId, now: Instant) -> TableResult<LeaveOutcome> {
        let outcome = self.data.leave(player_id)?;
        self.state.on_seat_change(&mut self.data, now);
        Ok(outcome)
    }

    fn set_connected(
        &mut self,
        player_id: PlayerId,
        connected: bool,
        now: Instant,
    ) -> TableResult<()> {
        self.data.set_connected(player_id, connected)?;
        self.state.on_seat_change(&mut self.data, now);
        Ok(())
    }
}

/// Open a new round, or fall back to waiting when nobody is seated.
fn open_betting(mut data: TableData, now: Instant) -> TableState {
    data.evict_idle_seats();
    data.dealer.reset();
    data.last_round = None;
    for seat in &mut data.seats {
        seat.reset_for_round();
    }
    if data.seats.is_empty() {
        info!("Table {} has no seated players, waiting", data.table_id);
        return Game {
            data,
            state: Waiting,
        }
        .into();
    }

    data.round_id += 1;
    data.events.push_back(TableEvent::RoundStarted {
        round_id: data.round_id,
    });
    info!(
        "Table {} round {} betting open for {}s",
        data.table_id,
        data.round_id,
        data.config.betting_secs()
    );
    let deadline = now + data.config.betting_window();
    Game {
        data,
        state: Betting {
            deadline,
            closed: false,
        },
    }
    .into()
}

/// Put the cursor on the first hand that needs a decision.
fn begin_turns(data: TableData, now: Instant) -> TableState {
    let cursor = data.next_open_hand(Cursor::START);
    let turn_deadline = cursor.map_or(now, |cursor| data.turn_deadline_for(cursor, now));
    Game {
        data,
        state: PlayerTurns {
            cursor,
            turn_deadline,
        },
    }
    .into()
}

impl Game<Betting> {
    fn place_bet(&mut self, player_id: PlayerId, amount: Chips, now: Instant) -> TableResult<()> {
        if self.state.closed || now >= self.state.deadline {
            return Err(TableError::InvalidPhase {
                phase: Phase::Betting,
            });
        }
        let (min, max) = (self.data.config.min_bet, self.data.config.max_bet);
        let seat = self
            .data
            .seat_mut(player_id)
            .ok_or(TableError::UnknownPlayer { player_id })?;
        if seat.has_live_bet() {
            return Err(TableError::illegal(IllegalActionReason::BetAlreadyPlaced));
        }
        if amount < min || amount > max {
            return Err(TableError::BetOutOfRange { min, max, amount });
        }
        seat.debit(amount)?;
        seat.hands.push(Hand::with_bet(amount));
        debug!(
            "Player {} bet {} on table {} round {}",
            player_id, amount, self.data.table_id, self.data.round_id
        );

        self.state.on_seat_change(&mut self.data, now);
        Ok(())
    }

    /// Leave betting once the window is closed.
    fn finish_betting(self) -> TableState {
        if self.data.seats.iter().any(Seat::has_live_bet) {
            self.into_phase(Dealing).into()
        } else {
            info!(
                "Table {} round {} had no bets, waiting",
                self.data.table_id, self.data.round_id
            );
            self.into_phase(Waiting).into()
        }
    }
}

impl Game<Dealing> {
    /// Two passes over the active seats, then the dealer. The dealer's
    /// second card is the hole card.
    fn deal(mut self, now: Instant) -> TableState {
        if self.data.shoe.needs_reshuffle() {
            info!(
                "Reshuffling shoe for table {} ({} cards left)",
                self.data.table_id,
                self.data.shoe.remaining()
            );
            self.data.shoe.reshuffle();
        }

        let positions: Vec<SeatPosition> = self
            .data
            .seats
            .iter()
            .filter(|seat| seat.is_active())
            .map(|seat| seat.position)
            .collect();
        for _ in 0..2 {
            for &position in &positions {
                let card = self.data.shoe.draw();
                if let Some(hand) = self
                    .data
                    .seat_at_mut(position)
                    .and_then(|seat| seat.hands.first_mut())
                {
                    hand.cards.push(card);
                }
            }
            let card = self.data.shoe.draw();
            self.data.dealer.hand.cards.push(card);
        }

        for hand in self.data.seats.iter_mut().flat_map(|seat| seat.hands.iter_mut()) {
            if hand.is_natural() {
                hand.is_finished = true;
            }
        }
        debug!(
            "Dealt round {} on table {} to {} seats",
            self.data.round_id,
            self.data.table_id,
            positions.len()
        );
        begin_turns(self.data, now)
    }
}

impl Game<PlayerTurns> {
    fn take_action(
        &mut self,
        player_id: PlayerId,
        kind: ActionKind,
        hand_index: usize,
        now: Instant,
    ) -> TableResult<()> {
        let Some(cursor) = self.state.cursor else {
            return Err(TableError::InvalidPhase {
                phase: Phase::PlayerTurns,
            });
        };
        let seat = self
            .data
            .seat(player_id)
            .ok_or(TableError::UnknownPlayer { player_id })?;
        if seat.position != cursor.seat_position || hand_index != cursor.hand_index {
            return Err(TableError::NotYourTurn {
                turn: self.data.turn_pointer(cursor),
            });
        }

        self.data.validate_action(cursor, kind)?;
        self.data.apply_action(cursor, kind)?;
        debug!(
            "Player {} {} hand {} on table {}",
            player_id, kind, hand_index, self.data.table_id
        );
        self.advance_cursor(cursor, now);
        Ok(())
    }

    /// Auto-stand the hand under the cursor once its deadline has passed.
    fn expire_turn(&mut self, now: Instant) -> TableResult<bool> {
        let Some(cursor) = self.state.cursor else {
            return Ok(false);
        };
        if now < self.state.turn_deadline {
            return Ok(false);
        }
        let seat = self
            .data
            .seat_at_mut(cursor.seat_position)
            .ok_or_else(|| TableError::invariant("turn cursor points at an empty seat"))?;
        let player_id = seat.player_id;
        let hand = seat
            .hands
            .get_mut(cursor.hand_index)
            .ok_or_else(|| TableError::invariant("turn cursor points past the last hand"))?;
        hand.is_finished = true;

        info!(
            "Player {} timed out on table {}, standing hand {}",
            player_id, self.data.table_id, cursor.hand_index
        );
        self.data.events.push_back(TableEvent::AutoStood {
            player_id,
            hand_index: cursor.hand_index,
        });
        self.advance_cursor(cursor, now);
        Ok(true)
    }

    /// Stay on an unfinished hand, otherwise move to the next open hand.
    fn advance_cursor(&mut self, cursor: Cursor, now: Instant) {
        let next = if self.data.hand_at(cursor).is_some_and(|hand| !hand.is_finished) {
            Some(cursor)
        } else {
            self.data.next_open_hand(cursor.next_hand())
        };
        self.state.cursor = next;
        if let Some(next) = next {
            self.state.turn_deadline = self.data.turn_deadline_for(next, now);
        }
    }
}

impl Game<DealerTurn> {
    fn play_dealer(mut self) -> Game<Settlement> {
        let TableData { dealer, shoe, .. } = &mut self.data;
        let drawn = dealer.play(shoe);
        debug!(
            "Dealer drew {} cards on table {} for {}",
            drawn,
            self.data.table_id,
            self.data.dealer.hand.value().total
        );
        self.into_phase(Settlement)
    }
}

impl Game<Settlement> {
    fn settle(mut self) -> Game<Finished> {
        let dealer = DealerResult::from_hand(&self.data.dealer.hand);
        let mut hands = Vec::new();
        let mut deltas = Vec::new();

        for seat in self.data.seats.iter_mut().filter(|seat| seat.has_live_bet()) {
            let mut returned_total = 0;
            let mut net_total = 0;
            for (hand_index, hand) in seat.hands.iter_mut().enumerate() {
                let (outcome, returned) = settle_hand(hand, &dealer);
                let net = returned - hand.bet;
                hands.push(HandSettlement {
                    player_id: seat.player_id,
                    seat_position: seat.position,
                    hand_index,
                    outcome,
                    bet: hand.bet,
                    returned,
                    net,
                });
                returned_total += returned;
                net_total += net;
                hand.bet = 0;
            }
            if let Err(error) = seat.credit(returned_total) {
                self.data.fault = Some(error.to_string());
            }
            deltas.push(ChipDelta {
                player_id: seat.player_id,
                delta: net_total,
                balance_after: seat.chips,
            });
        }

        let report = RoundReport {
            round_id: self.data.round_id,
            dealer_total: dealer.total,
            dealer_blackjack: dealer.blackjack,
            dealer_bust: dealer.bust,
            hands,
            deltas,
        };
        info!(
            "Table {} round {} settled: dealer {}, {} hands, house net {}",
            self.data.table_id,
            report.round_id,
            report.dealer_total,
            report.hands.len(),
            report.house_net()
        );

        let (leaving, staying): (Vec<Seat>, Vec<Seat>) = mem::take(&mut self.data.seats)
            .into_iter()
            .partition(|seat| seat.leaving);
        self.data.seats = staying;
        for seat in leaving {
            self.data.events.push_back(TableEvent::Left {
                player_id: seat.player_id,
                chips: seat.chips,
            });
        }

        self.data
            .events
            .push_back(TableEvent::RoundSettled(report.clone()));
        self.data.last_round = Some(report);
        self.into_phase(Finished)
    }
}

/// Type-erased table. Every variant is one phase of the round.
#[enum_dispatch(TableStateManagement, SeatManagement)]
#[derive(Debug)]
pub enum TableState {
    Waiting(Game<Waiting>),
    Betting(Game<Betting>),
    Dealing(Game<Dealing>),
    PlayerTurns(Game<PlayerTurns>),
    DealerTurn(Game<DealerTurn>),
    Settlement(Game<Settlement>),
    Finished(Game<Finished>),
}

impl Default for TableState {
    fn default() -> Self {
        Game {
            data: TableData::default(),
            state: Waiting,
        }
        .into()
    }
}

impl TableState {
    pub fn new(table_id: TableId, config: TableConfig) -> Result<Self, ShoeError> {
        Ok(Game {
            data: TableData::new(table_id, config)?,
            state: Waiting,
        }
        .into())
    }

    /// A table that deals from `shoe`.
    #[must_use]
    pub fn with_shoe(table_id: TableId, config: TableConfig, shoe: Shoe) -> Self {
        Game {
            data: TableData::with_shoe(table_id, config, shoe),
            state: Waiting,
        }
        .into()
    }

    /// Open betting from Waiting or Finished. Needs at least one seat.
    pub fn start_round(&mut self, now: Instant) -> TableResult<()> {
        let phase = self.phase();
        if !matches!(phase, Phase::Waiting | Phase::Finished) || self.data().seats.is_empty() {
            return Err(TableError::InvalidPhase { phase });
        }
        self.reopen(now);
        Ok(())
    }

    /// Leave Finished for the next round, or for Waiting when every seat
    /// has gone.
    pub fn new_round(&mut self, now: Instant) -> TableResult<()> {
        let phase = self.phase();
        if phase != Phase::Finished {
            return Err(TableError::InvalidPhase { phase });
        }
        self.reopen(now);
        Ok(())
    }

    fn reopen(&mut self, now: Instant) {
        let data = match mem::take(self) {
            Self::Waiting(game) => game.data,
            Self::Finished(game) => game.data,
            other => {
                *self = other;
                return;
            }
        };
        *self = open_betting(data, now);
    }

    pub fn place_bet(
        &mut self,
        player_id: PlayerId,
        amount: Chips,
        now: Instant,
    ) -> TableResult<()> {
        let phase = self.phase();
        let Self::Betting(game) = self else {
            return Err(TableError::InvalidPhase { phase });
        };
        game.place_bet(player_id, amount, now)?;
        self.advance(now);
        Ok(())
    }

    pub fn take_action(
        &mut self,
        player_id: PlayerId,
        kind: ActionKind,
        hand_index: usize,
        now: Instant,
    ) -> TableResult<()> {
        let phase = self.phase();
        let Self::PlayerTurns(game) = self else {
            return Err(TableError::InvalidPhase { phase });
        };
        game.take_action(player_id, kind, hand_index, now)?;
        self.advance(now);
        Ok(())
    }

    /// Handle a timer wake-up. Returns whether anything changed; a stale
    /// wake-up is a no-op.
    pub fn on_timer(&mut self, now: Instant) -> TableResult<bool> {
        let changed = match self {
            Self::Betting(game) if !game.state.closed && now >= game.state.deadline => {
                close_betting(&mut game.state.closed, &mut game.data);
                true
            }
            Self::PlayerTurns(game) => game.expire_turn(now)?,
            _ => false,
        };
        if changed {
            self.advance(now);
        }
        Ok(changed)
    }

    /// Run through transient phases until the table rests in Waiting,
    /// open Betting, PlayerTurns with a hand to play, or Finished.
    pub fn advance(&mut self, now: Instant) {
        while !self.is_resting() {
            let state = mem::take(self);
            *self = state.step(now);
        }
    }

    fn is_resting(&self) -> bool {
        match self {
            Self::Waiting(_) | Self::Finished(_) => true,
            Self::Betting(game) => !game.state.closed,
            Self::PlayerTurns(game) => game.state.cursor.is_some(),
            Self::Dealing(_) | Self::DealerTurn(_) | Self::Settlement(_) => false,
        }
    }

    fn step(self, now: Instant) -> Self {
        match self {
            Self::Betting(game) if game.state.closed => game.finish_betting(),
            Self::Dealing(game) => game.deal(now),
            Self::PlayerTurns(game) if game.state.cursor.is_none() => {
                game.into_phase(DealerTurn).into()
            }
            Self::DealerTurn(game) => game.play_dealer().into(),
            Self::Settlement(game) => game.settle().into(),
            other => {
                warn!("Asked to step a resting table in {}", other.phase());
                other
            }
        }
    }

    /// Verify the structural invariants that every transition must keep.
    pub fn check_invariants(&self) -> TableResult<()> {
        let data = self.data();
        if let Some(fault) = &data.fault {
            return Err(TableError::invariant(fault.clone()));
        }
        let mut last_position = 0;
        for seat in &data.seats {
            if seat.position <= last_position || seat.position > data.config.max_seats {
                return Err(TableError::invariant(format!(
                    "seat position {} out of order",
                    seat.position
                )));
            }
            last_position = seat.position;
            if seat.chips < 0 {
                return Err(TableError::invariant(format!(
                    "player {} has negative chips",
                    seat.player_id
                )));
            }
            if seat.hands.iter().any(|hand| hand.bet < 0) {
                return Err(TableError::invariant(format!(
                    "player {} has a negative bet",
                    seat.player_id
                )));
            }
        }
        let cursor = match self {
            Self::PlayerTurns(game) => game.state.cursor,
            _ => None,
        };
        if let Some(cursor) = cursor {
            if !data.hand_at(cursor).is_some_and(|hand| !hand.is_finished) {
                return Err(TableError::invariant(
                    "turn cursor is not on an unfinished hand",
                ));
            }
        }
        Ok(())
    }
}
