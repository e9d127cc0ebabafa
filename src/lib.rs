//! # Bourse
//!
//! A multi-client continuous double-auction exchange for a single fungible
//! instrument. Clients connect over TCP, log in under a named account, move
//! cash and inventory in and out, post limit orders, cancel them, and
//! receive notifications of postings, cancellations, and executed trades. A
//! dedicated matcher thread pairs the best compatible orders and settles
//! them atomically against the account ledger.
//!
//! ## Entry points
//!
//! The binary (`src/main.rs`) wires everything together. Library users build
//! the pieces leaf-first: an [`AccountLedger`], a [`TraderRegistry`], a
//! [`ClientRegistry`], then [`Exchange::start`], and hand a
//! [`server::ServerContext`] to [`server::run_acceptor`].
//!
//! ## Example
//!
//! ```rust
//! use bourse::audit::StdoutAudit;
//! use bourse::{AccountLedger, Exchange, TraderRegistry};
//! use std::net::{TcpListener, TcpStream};
//! use std::sync::Arc;
//!
//! let ledger = Arc::new(AccountLedger::new());
//! let traders = Arc::new(TraderRegistry::new());
//! let exchange = Exchange::start(Arc::clone(&traders), Arc::new(StdoutAudit));
//!
//! // Sessions normally arrive through the acceptor; a loopback pair works too.
//! let listener = TcpListener::bind("127.0.0.1:0").unwrap();
//! let conn = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
//! let alice = traders.login(conn, "alice", &ledger).unwrap();
//!
//! alice.account().credit_balance(1_000);
//! let order = exchange.post_buy(&alice, 5, 100).unwrap();
//! assert_eq!(order.0, 1);
//! exchange.shutdown();
//! ```
//!
//! ## Lower-level API
//!
//! [`book::Book`] and [`matching::match_once`] can be driven directly when
//! you manage encumbrance yourself (tests and benches do).

pub mod audit;
pub mod book;
pub mod client_registry;
pub mod error;
pub mod exchange;
pub mod ledger;
pub mod matching;
pub mod protocol;
pub mod server;
pub mod sim;
pub mod trader;
pub mod types;

pub use book::{Book, Order};
pub use client_registry::ClientRegistry;
pub use error::{BourseError, Result};
pub use exchange::Exchange;
pub use ledger::{Account, AccountLedger};
pub use matching::{match_once, Execution};
pub use server::{client_service, run_acceptor, ServerContext};
pub use trader::{Trader, TraderRegistry};
pub use types::{AccountStatus, ConnectionId, Funds, OrderId, Quantity, Side};
