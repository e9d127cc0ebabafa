//! Resting-order storage: two flat lists with linear best-price scans.
//!
//! The book keeps buys and sells unordered and scans for the best price on
//! demand. Ties between equal-price orders are broken by scan order; no time
//! priority is promised. Order ids are allocated here, strictly increasing
//! from 1.

use crate::trader::Trader;
use crate::types::{Funds, OrderId, Quantity, Side};
use std::sync::Arc;

/// One resting limit order. The side is implied by which list holds it.
///
/// While resting, the order's cost is encumbered on the trader's account:
/// `quantity * price` of balance for a buy, `quantity` of inventory for a
/// sell. Dropping the order releases its trader reference.
#[derive(Debug)]
pub struct Order {
    pub id: OrderId,
    pub trader: Arc<Trader>,
    pub quantity: Quantity,
    pub price: Funds,
}

/// Order book for the single instrument.
#[derive(Debug)]
pub struct Book {
    pub(crate) buys: Vec<Order>,
    pub(crate) sells: Vec<Order>,
    pub(crate) last_trade_price: Funds,
    next_order_id: u32,
}

impl Book {
    pub fn new() -> Self {
        Self {
            buys: Vec::new(),
            sells: Vec::new(),
            last_trade_price: 0,
            next_order_id: 1,
        }
    }

    /// Insert a new resting order and return its freshly allocated id.
    pub fn add_order(
        &mut self,
        side: Side,
        trader: Arc<Trader>,
        quantity: Quantity,
        price: Funds,
    ) -> OrderId {
        let id = OrderId(self.next_order_id);
        self.next_order_id += 1;
        let order = Order {
            id,
            trader,
            quantity,
            price,
        };
        match side {
            Side::Buy => self.buys.push(order),
            Side::Sell => self.sells.push(order),
        }
        id
    }

    /// Locate an order by id.
    pub fn find_order(&self, id: OrderId) -> Option<(Side, &Order)> {
        if let Some(o) = self.buys.iter().find(|o| o.id == id) {
            return Some((Side::Buy, o));
        }
        self.sells
            .iter()
            .find(|o| o.id == id)
            .map(|o| (Side::Sell, o))
    }

    /// Remove an order by id, returning it with its side.
    pub fn remove_order(&mut self, id: OrderId) -> Option<(Side, Order)> {
        if let Some(i) = self.buys.iter().position(|o| o.id == id) {
            return Some((Side::Buy, self.buys.remove(i)));
        }
        self.sells
            .iter()
            .position(|o| o.id == id)
            .map(|i| (Side::Sell, self.sells.remove(i)))
    }

    /// Index of the highest-priced buy, first found on ties.
    pub(crate) fn best_buy_index(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, o) in self.buys.iter().enumerate() {
            match best {
                Some(b) if self.buys[b].price >= o.price => {}
                _ => best = Some(i),
            }
        }
        best
    }

    /// Index of the lowest-priced sell, first found on ties.
    pub(crate) fn best_sell_index(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, o) in self.sells.iter().enumerate() {
            match best {
                Some(b) if self.sells[b].price <= o.price => {}
                _ => best = Some(i),
            }
        }
        best
    }

    /// Highest resting buy price, 0 if none.
    pub fn best_bid(&self) -> Funds {
        self.best_buy_index().map_or(0, |i| self.buys[i].price)
    }

    /// Lowest resting sell price, 0 if none.
    pub fn best_ask(&self) -> Funds {
        self.best_sell_index().map_or(0, |i| self.sells[i].price)
    }

    /// Price of the most recent trade, 0 if the book has never traded.
    pub fn last_trade_price(&self) -> Funds {
        self.last_trade_price
    }

    pub fn order_count(&self) -> usize {
        self.buys.len() + self.sells.len()
    }

    /// Remove and return every resting order (book teardown).
    pub fn drain(&mut self) -> Vec<(Side, Order)> {
        let mut out: Vec<(Side, Order)> = Vec::with_capacity(self.order_count());
        out.extend(self.buys.drain(..).map(|o| (Side::Buy, o)));
        out.extend(self.sells.drain(..).map(|o| (Side::Sell, o)));
        out
    }
}

impl Default for Book {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_trader;

    #[test]
    fn ids_are_strictly_increasing_across_both_sides() {
        let mut book = Book::new();
        let (t, _peer) = test_trader("alice");
        let a = book.add_order(Side::Buy, Arc::clone(&t), 1, 10);
        let b = book.add_order(Side::Sell, Arc::clone(&t), 1, 20);
        let c = book.add_order(Side::Buy, t, 1, 30);
        assert_eq!(a, OrderId(1));
        assert_eq!(b, OrderId(2));
        assert_eq!(c, OrderId(3));
    }

    #[test]
    fn best_bid_is_highest_buy_and_best_ask_is_lowest_sell() {
        let mut book = Book::new();
        let (t, _peer) = test_trader("alice");
        book.add_order(Side::Buy, Arc::clone(&t), 1, 90);
        book.add_order(Side::Buy, Arc::clone(&t), 1, 110);
        book.add_order(Side::Buy, Arc::clone(&t), 1, 100);
        book.add_order(Side::Sell, Arc::clone(&t), 1, 130);
        book.add_order(Side::Sell, t, 1, 120);
        assert_eq!(book.best_bid(), 110);
        assert_eq!(book.best_ask(), 120);
    }

    #[test]
    fn empty_sides_quote_zero() {
        let book = Book::new();
        assert_eq!(book.best_bid(), 0);
        assert_eq!(book.best_ask(), 0);
        assert_eq!(book.last_trade_price(), 0);
    }

    #[test]
    fn remove_order_finds_either_side() {
        let mut book = Book::new();
        let (t, _peer) = test_trader("alice");
        let buy = book.add_order(Side::Buy, Arc::clone(&t), 2, 50);
        let sell = book.add_order(Side::Sell, t, 3, 60);

        let (side, order) = book.remove_order(sell).unwrap();
        assert_eq!(side, Side::Sell);
        assert_eq!(order.quantity, 3);
        let (side, order) = book.remove_order(buy).unwrap();
        assert_eq!(side, Side::Buy);
        assert_eq!(order.quantity, 2);
        assert!(book.remove_order(buy).is_none());
        assert_eq!(book.order_count(), 0);
    }

    #[test]
    fn drain_empties_the_book() {
        let mut book = Book::new();
        let (t, _peer) = test_trader("alice");
        book.add_order(Side::Buy, Arc::clone(&t), 1, 10);
        book.add_order(Side::Sell, t, 1, 20);
        let drained = book.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(book.order_count(), 0);
    }
}
