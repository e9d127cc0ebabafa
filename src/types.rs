//! Core types and IDs for the bourse (charter data models).
//!
//! Monetary amounts and quantities are unsigned 32-bit; underflow is a failed
//! operation, never a wrap. Identifiers are newtype wrappers.

/// Cash amount, in indivisible units.
pub type Funds = u32;

/// Instrument quantity, in indivisible units.
pub type Quantity = u32;

/// Unique order identifier. Non-zero; strictly increasing per exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct OrderId(pub u32);

/// Identifier for a registered client connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// Order side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn is_buy(&self) -> bool {
        matches!(self, Side::Buy)
    }
}

/// Snapshot of an account: (balance, inventory).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccountStatus {
    pub balance: Funds,
    pub inventory: Quantity,
}
