//! Error taxonomy for the bourse.
//!
//! Every kind except an internal invariant violation is recoverable: the
//! session loop maps it to a NACK and keeps serving. Invariant violations
//! (encumbrance underflow) panic instead; they indicate a server bug, not a
//! peer fault.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BourseError {
    /// Payload size or content does not match the packet type.
    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    /// Request is illegal in the session's current state.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("insufficient inventory")]
    InsufficientInventory,

    /// The ledger has no account and cannot create one.
    #[error("unknown account: {0}")]
    UnknownAccount(String),

    /// The trader registry is at capacity.
    #[error("trader registry full")]
    RegistryFull,

    /// A trader with this name is already logged in.
    #[error("trader already logged in: {0}")]
    AlreadyLoggedIn(String),

    /// The account ledger is at capacity.
    #[error("account ledger full")]
    LedgerFull,

    /// Cancel target does not exist or is owned by another trader.
    #[error("order not found: {0}")]
    OrderNotFound(u32),

    /// Order quantity or price was zero.
    #[error("invalid order: {0}")]
    InvalidOrder(&'static str),

    /// The connection registry is at capacity.
    #[error("connection registry full")]
    TooManyConnections,

    /// The peer closed the connection at a packet boundary.
    #[error("peer closed connection")]
    PeerClosed,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BourseError>;
