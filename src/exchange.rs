//! The exchange: order posting and cancellation, the background matcher
//! thread, and trade notifications.
//!
//! All book state lives behind one lock. Posting encumbers the order's cost
//! on the trader's account before touching the book; a failed debit never
//! reaches the book. The matcher holds the exchange lock for an entire
//! matching pass, so settlement and the BOUGHT/SOLD/TRADED notifications of
//! one trade are atomic from every other trader's viewpoint.

use crate::audit::{AuditAction, AuditLog, Outcome};
use crate::book::Book;
use crate::error::{BourseError, Result};
use crate::ledger::Account;
use crate::matching::{self, Execution};
use crate::protocol::{NotifyInfo, PacketHeader, PacketType, StatusInfo};
use crate::trader::{Trader, TraderRegistry};
use crate::types::{Funds, OrderId, Quantity, Side};
use log::{debug, info, warn};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

#[derive(Debug)]
struct ExchangeState {
    book: Book,
    /// Posts since the matcher last ran; wakeups coalesce.
    pending: u32,
    running: bool,
}

/// Order book plus matcher. Create with [`Exchange::start`]; stop with
/// [`Exchange::shutdown`], which refunds every resting order.
pub struct Exchange {
    state: Mutex<ExchangeState>,
    wake: Condvar,
    traders: Arc<TraderRegistry>,
    audit: Arc<dyn AuditLog>,
    matcher: Mutex<Option<JoinHandle<()>>>,
}

impl Exchange {
    /// Construct the exchange and spawn its matcher thread.
    pub fn start(traders: Arc<TraderRegistry>, audit: Arc<dyn AuditLog>) -> Arc<Self> {
        let exchange = Arc::new(Self {
            state: Mutex::new(ExchangeState {
                book: Book::new(),
                pending: 0,
                running: true,
            }),
            wake: Condvar::new(),
            traders,
            audit,
            matcher: Mutex::new(None),
        });
        let handle = {
            let exchange = Arc::clone(&exchange);
            std::thread::Builder::new()
                .name("matcher".into())
                .spawn(move || exchange.matcher_loop())
                .expect("spawn matcher thread")
        };
        *exchange.matcher.lock().expect("matcher handle lock") = Some(handle);
        info!("exchange started");
        exchange
    }

    /// Post a limit buy: encumber `quantity * price`, insert, wake matcher.
    pub fn post_buy(
        &self,
        trader: &Arc<Trader>,
        quantity: Quantity,
        price: Funds,
    ) -> Result<OrderId> {
        if quantity == 0 || price == 0 {
            return Err(BourseError::InvalidOrder("zero quantity or price"));
        }
        let cost = quantity
            .checked_mul(price)
            .ok_or(BourseError::InvalidOrder("order cost overflows"))?;
        trader.account().debit_balance(cost)?;

        let id = {
            let mut state = self.state.lock().expect("exchange lock");
            let id = state
                .book
                .add_order(Side::Buy, Arc::clone(trader), quantity, price);
            state.pending += 1;
            id
        };
        self.wake.notify_one();
        debug!(
            "posted buy order {} for '{}': {} @ {}",
            id.0,
            trader.name(),
            quantity,
            price
        );
        Ok(id)
    }

    /// Post a limit sell: encumber `quantity` of inventory, insert, wake
    /// matcher.
    pub fn post_sell(
        &self,
        trader: &Arc<Trader>,
        quantity: Quantity,
        price: Funds,
    ) -> Result<OrderId> {
        if quantity == 0 || price == 0 {
            return Err(BourseError::InvalidOrder("zero quantity or price"));
        }
        trader.account().debit_inventory(quantity)?;

        let id = {
            let mut state = self.state.lock().expect("exchange lock");
            let id = state
                .book
                .add_order(Side::Sell, Arc::clone(trader), quantity, price);
            state.pending += 1;
            id
        };
        self.wake.notify_one();
        debug!(
            "posted sell order {} for '{}': {} @ {}",
            id.0,
            trader.name(),
            quantity,
            price
        );
        Ok(id)
    }

    /// Cancel a resting order owned by `trader`.
    ///
    /// Refunds the residual encumbrance, removes the order, and broadcasts a
    /// CANCELED notification. An unknown id or an order owned by another
    /// trader fails without mutating anything.
    pub fn cancel(&self, trader: &Arc<Trader>, id: OrderId) -> Result<(Side, Quantity)> {
        let (side, order) = {
            let mut state = self.state.lock().expect("exchange lock");
            match state.book.find_order(id) {
                Some((_, order)) if !Arc::ptr_eq(&order.trader, trader) => {
                    return Err(BourseError::OrderNotFound(id.0));
                }
                Some(_) => {}
                None => return Err(BourseError::OrderNotFound(id.0)),
            }
            let (side, order) = state.book.remove_order(id).expect("order vanished under lock");
            // Refund under the exchange lock so the encumbrance is never
            // outside both the book and the balance.
            match side {
                Side::Buy => {
                    // quantity * price passed checked_mul at post time.
                    order.trader.account().credit_balance(order.quantity * order.price);
                }
                Side::Sell => order.trader.account().credit_inventory(order.quantity),
            }
            (side, order)
        };

        info!(
            "canceled order {} for '{}' (residual {})",
            id.0,
            trader.name(),
            order.quantity
        );

        let notify = match side {
            Side::Buy => NotifyInfo {
                buyer: id.0,
                seller: 0,
                quantity: order.quantity,
                price: 0,
            },
            Side::Sell => NotifyInfo {
                buyer: 0,
                seller: id.0,
                quantity: order.quantity,
                price: 0,
            },
        };
        let header = PacketHeader::now(PacketType::Canceled, NotifyInfo::SIZE as u16);
        self.traders.broadcast(&header, &notify.to_bytes());

        Ok((side, order.quantity))
    }

    /// Status snapshot: the account (if any) plus current quotes.
    pub fn status(&self, account: Option<&Account>) -> StatusInfo {
        let mut info = StatusInfo::default();
        if let Some(account) = account {
            let snapshot = account.status();
            info.balance = snapshot.balance;
            info.inventory = snapshot.inventory;
        }
        let state = self.state.lock().expect("exchange lock");
        info.bid = state.book.best_bid();
        info.ask = state.book.best_ask();
        info.last = state.book.last_trade_price();
        info
    }

    /// Number of resting orders (both sides).
    pub fn open_orders(&self) -> usize {
        self.state.lock().expect("exchange lock").book.order_count()
    }

    /// Stop the matcher and unwind the book, returning every residual
    /// encumbrance to its trader. No notifications are emitted.
    pub fn shutdown(&self) {
        {
            let mut state = self.state.lock().expect("exchange lock");
            if !state.running {
                return;
            }
            state.running = false;
        }
        self.wake.notify_one();
        if let Some(handle) = self.matcher.lock().expect("matcher handle lock").take() {
            let _ = handle.join();
        }

        let drained = {
            let mut state = self.state.lock().expect("exchange lock");
            state.book.drain()
        };
        for (side, order) in drained {
            match side {
                Side::Buy => order.trader.account().credit_balance(order.quantity * order.price),
                Side::Sell => order.trader.account().credit_inventory(order.quantity),
            }
            debug!("refunded order {} on shutdown", order.id.0);
        }
        info!("exchange stopped");
    }

    fn matcher_loop(&self) {
        debug!("matcher sleeping");
        loop {
            let mut state = self.state.lock().expect("exchange lock");
            while state.pending == 0 && state.running {
                state = self.wake.wait(state).expect("exchange lock");
            }
            if !state.running {
                break;
            }
            state.pending = 0;
            // The whole pass runs under the exchange lock: settlement and
            // notifications of each trade are atomic to other traders.
            while let Some(execution) = matching::match_once(&mut state.book) {
                self.notify_trade(&execution);
            }
        }
        debug!("matcher exiting");
    }

    fn notify_trade(&self, execution: &Execution) {
        info!(
            "trade: buy {} x sell {} -> {} @ {}",
            execution.buy_order.0, execution.sell_order.0, execution.quantity, execution.price
        );
        let notify = NotifyInfo {
            buyer: execution.buy_order.0,
            seller: execution.sell_order.0,
            quantity: execution.quantity,
            price: execution.price,
        };
        let payload = notify.to_bytes();

        let header = PacketHeader::now(PacketType::Bought, NotifyInfo::SIZE as u16);
        if let Err(e) = execution.buyer.send_packet(&header, &payload) {
            warn!("BOUGHT to '{}' failed: {}", execution.buyer.name(), e);
        }
        let header = PacketHeader::now(PacketType::Sold, NotifyInfo::SIZE as u16);
        if let Err(e) = execution.seller.send_packet(&header, &payload) {
            warn!("SOLD to '{}' failed: {}", execution.seller.name(), e);
        }
        let header = PacketHeader::now(PacketType::Traded, NotifyInfo::SIZE as u16);
        self.traders.broadcast(&header, &payload);

        self.audit.record(
            "-",
            Outcome::Accepted,
            AuditAction::Trade {
                buy_order: execution.buy_order,
                sell_order: execution.sell_order,
                buyer: execution.buyer.name().to_string(),
                seller: execution.seller.name().to_string(),
                quantity: execution.quantity,
                price: execution.price,
            },
        );
    }
}
