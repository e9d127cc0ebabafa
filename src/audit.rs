//! Audit trail of material exchange actions.
//!
//! Every action that moves money, inventory, or orders produces one
//! [`AuditRecord`], written as a single JSON line. The action payload is
//! typed per operation rather than free-form, so the trail is greppable by
//! field and the call sites cannot drift from the schema. Destinations are
//! pluggable: stdout for the server, an in-memory buffer for tests.

use crate::types::{Funds, OrderId, Quantity};
use serde::Serialize;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// What happened, with the fields that matter for that action.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuditAction {
    Login,
    Logout,
    Deposit {
        amount: Funds,
    },
    Withdraw {
        amount: Funds,
    },
    Escrow {
        quantity: Quantity,
    },
    Release {
        quantity: Quantity,
    },
    Buy {
        order_id: OrderId,
        quantity: Quantity,
        price: Funds,
    },
    Sell {
        order_id: OrderId,
        quantity: Quantity,
        price: Funds,
    },
    Cancel {
        order_id: OrderId,
        quantity: Quantity,
    },
    Trade {
        buy_order: OrderId,
        sell_order: OrderId,
        buyer: String,
        seller: String,
        quantity: Quantity,
        price: Funds,
    },
}

/// Whether the request was applied or bounced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Accepted,
    Refused,
}

/// One line of the trail. `trader` is the user name the action belongs to,
/// or "-" for matcher-driven actions that have two parties.
#[derive(Clone, Debug, Serialize)]
pub struct AuditRecord {
    /// Unix timestamp (seconds since epoch).
    pub timestamp_secs: u64,
    pub trader: String,
    pub outcome: Outcome,
    #[serde(flatten)]
    pub action: AuditAction,
}

impl AuditRecord {
    fn stamp(trader: &str, outcome: Outcome, action: AuditAction) -> Self {
        let timestamp_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            timestamp_secs,
            trader: trader.to_string(),
            outcome,
            action,
        }
    }
}

/// Destination for the trail.
pub trait AuditLog: Send + Sync {
    fn record(&self, trader: &str, outcome: Outcome, action: AuditAction);
}

/// One JSON line per record on stdout. Safe from multiple threads.
pub struct StdoutAudit;

impl AuditLog for StdoutAudit {
    fn record(&self, trader: &str, outcome: Outcome, action: AuditAction) {
        let record = AuditRecord::stamp(trader, outcome, action);
        if let Ok(line) = serde_json::to_string(&record) {
            println!("{}", line);
        }
    }
}

/// Buffers records so tests can inspect what the server claimed happened.
#[derive(Default)]
pub struct MemoryAudit {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().expect("audit lock").clone()
    }

    /// Records belonging to one trader, oldest first.
    pub fn for_trader(&self, name: &str) -> Vec<AuditRecord> {
        self.records()
            .into_iter()
            .filter(|record| record.trader == name)
            .collect()
    }
}

impl AuditLog for MemoryAudit {
    fn record(&self, trader: &str, outcome: Outcome, action: AuditAction) {
        let record = AuditRecord::stamp(trader, outcome, action);
        self.records.lock().expect("audit lock").push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_log_buffers_records_in_order() {
        let log = MemoryAudit::new();
        log.record("alice", Outcome::Accepted, AuditAction::Deposit { amount: 1000 });
        log.record("bob", Outcome::Refused, AuditAction::Withdraw { amount: 50 });

        let records = log.records();
        assert_eq!(records.len(), 2);
        assert!(matches!(records[0].action, AuditAction::Deposit { amount: 1000 }));
        assert_eq!(records[0].outcome, Outcome::Accepted);
        assert!(matches!(records[1].action, AuditAction::Withdraw { amount: 50 }));
        assert_eq!(records[1].outcome, Outcome::Refused);

        assert_eq!(log.for_trader("bob").len(), 1);
        assert!(log.for_trader("carol").is_empty());
    }

    #[test]
    fn record_serializes_flat_with_action_tag() {
        let record = AuditRecord::stamp(
            "alice",
            Outcome::Accepted,
            AuditAction::Buy {
                order_id: OrderId(7),
                quantity: 2,
                price: 50,
            },
        );
        let line = serde_json::to_string(&record).unwrap();
        assert!(line.contains("\"action\":\"buy\""));
        assert!(line.contains("\"order_id\":7"));
        assert!(line.contains("\"outcome\":\"accepted\""));
        assert!(line.contains("\"trader\":\"alice\""));
    }

    #[test]
    fn unit_actions_carry_only_the_tag() {
        let record = AuditRecord::stamp("bob", Outcome::Accepted, AuditAction::Logout);
        let line = serde_json::to_string(&record).unwrap();
        assert!(line.contains("\"action\":\"logout\""));
        assert!(!line.contains("amount"));
        assert!(!line.contains("order_id"));
    }
}
