//! Chip ledger data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::{ChipDelta, Chips, PlayerId, RoundId};

/// Table ID type
pub type TableId = i64;

/// One run of one table as the ledger sees it.
///
/// Table ids and round ids restart with every process, so ledger keys also
/// carry an instance id drawn when the table is spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerScope {
    pub table_id: TableId,
    pub instance: Uuid,
}

impl LedgerScope {
    /// Scope for a freshly spawned table.
    #[must_use]
    pub fn new(table_id: TableId) -> Self {
        Self::with_instance(table_id, Uuid::new_v4())
    }

    #[must_use]
    pub fn with_instance(table_id: TableId, instance: Uuid) -> Self {
        Self { table_id, instance }
    }

    /// Idempotency key for one player's settlement in one round.
    #[must_use]
    pub fn settlement_key(&self, round_id: RoundId, player_id: PlayerId) -> String {
        format!(
            "table:{}:{}:round:{round_id}:player:{player_id}",
            self.table_id, self.instance
        )
    }
}

/// Durable chip account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChipAccount {
    pub player_id: PlayerId,
    pub balance: Chips,
    pub updated_at: DateTime<Utc>,
}

/// Entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Net result of one round
    Settlement,
    /// Seat released; records the balance carried away from the table
    CashOut,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::Settlement => write!(f, "settlement"),
            EntryKind::CashOut => write!(f, "cash_out"),
        }
    }
}

impl std::str::FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "settlement" => Ok(Self::Settlement),
            "cash_out" => Ok(Self::CashOut),
            other => Err(format!("unknown entry kind '{other}'")),
        }
    }
}

/// One ledger line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipEntry {
    pub player_id: PlayerId,
    pub table_id: TableId,
    pub round_id: Option<RoundId>,
    pub delta: Chips,
    /// Balance the table saw after applying `delta`
    pub balance_after: Chips,
    pub kind: EntryKind,
    pub idempotency_key: String,
}

impl ChipEntry {
    #[must_use]
    pub fn settlement(scope: &LedgerScope, round_id: RoundId, delta: &ChipDelta) -> Self {
        Self {
            player_id: delta.player_id,
            table_id: scope.table_id,
            round_id: Some(round_id),
            delta: delta.delta,
            balance_after: delta.balance_after,
            kind: EntryKind::Settlement,
            idempotency_key: scope.settlement_key(round_id, delta.player_id),
        }
    }

    /// Cash-out at table sequence number `seq`; a player can leave and
    /// rejoin within one round.
    #[must_use]
    pub fn cash_out(
        scope: &LedgerScope,
        round_id: RoundId,
        seq: u64,
        player_id: PlayerId,
        chips: Chips,
    ) -> Self {
        Self {
            player_id,
            table_id: scope.table_id,
            round_id: Some(round_id),
            delta: 0,
            balance_after: chips,
            kind: EntryKind::CashOut,
            idempotency_key: format!(
                "{}:cash_out:{seq}",
                scope.settlement_key(round_id, player_id)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settlement_entry() {
        let delta = ChipDelta {
            player_id: 9,
            delta: -25,
            balance_after: 975,
        };
        let scope = LedgerScope::with_instance(3, Uuid::nil());
        let entry = ChipEntry::settlement(&scope, 12, &delta);
        assert_eq!(
            entry.idempotency_key,
            "table:3:00000000-0000-0000-0000-000000000000:round:12:player:9"
        );
        assert_eq!(entry.table_id, 3);
        assert_eq!(entry.delta, -25);
        assert_eq!(entry.kind, EntryKind::Settlement);
    }

    #[test]
    fn test_cash_out_key_differs_from_settlement() {
        let scope = LedgerScope::new(3);
        let entry = ChipEntry::cash_out(&scope, 12, 40, 9, 975);
        assert_eq!(entry.delta, 0);
        assert_ne!(entry.idempotency_key, scope.settlement_key(12, 9));
    }

    #[test]
    fn test_table_runs_never_share_keys() {
        let first = LedgerScope::new(1);
        let second = LedgerScope::new(1);
        assert_ne!(first.settlement_key(1, 7), second.settlement_key(1, 7));
    }

    #[test]
    fn test_entry_kind_round_trips_through_text() {
        for kind in [EntryKind::Settlement, EntryKind::CashOut] {
            assert_eq!(kind.to_string().parse::<EntryKind>(), Ok(kind));
        }
    }
}
