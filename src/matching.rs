//! One matching step: pair the best buy with the best sell, pick the trade
//! price, settle both accounts, and update the book.
//!
//! [`match_once`] is IO-free so tests and benches can drive it directly; the
//! exchange's matcher thread loops it under the exchange lock and emits the
//! notifications.

use crate::book::Book;
use crate::trader::Trader;
use crate::types::{Funds, OrderId, Quantity};
use std::sync::Arc;

/// Outcome of one executed trade.
#[derive(Clone, Debug)]
pub struct Execution {
    pub buy_order: OrderId,
    pub sell_order: OrderId,
    pub quantity: Quantity,
    pub price: Funds,
    /// Limit prices of the matched orders; `sell_limit <= price <= buy_limit`.
    pub buy_limit: Funds,
    pub sell_limit: Funds,
    pub buyer: Arc<Trader>,
    pub seller: Arc<Trader>,
}

/// Trade-price selection within the overlap `[min_price, max_price]`.
///
/// The last trade price wins if it lies in the overlap; otherwise the nearer
/// endpoint. A book that has never traded (`last == 0`) uses the integer
/// midpoint.
pub fn trade_price(last: Funds, min_price: Funds, max_price: Funds) -> Funds {
    if last == 0 {
        (min_price + max_price) / 2
    } else if last >= min_price && last <= max_price {
        last
    } else if last < min_price {
        min_price
    } else {
        max_price
    }
}

/// Execute at most one trade between the current best buy and best sell.
///
/// Returns `None` when either side is empty or the book does not cross.
/// On a trade: the seller's balance is credited with the proceeds, the
/// buyer's inventory with the quantity, and the buyer's balance with the
/// over-encumbrance refund `quantity * (buy_limit - price)`. Fully filled
/// orders are removed, releasing their trader references.
pub fn match_once(book: &mut Book) -> Option<Execution> {
    let bi = book.best_buy_index()?;
    let si = book.best_sell_index()?;
    if book.buys[bi].price < book.sells[si].price {
        return None;
    }

    let buy_limit = book.buys[bi].price;
    let sell_limit = book.sells[si].price;
    let price = trade_price(book.last_trade_price, sell_limit, buy_limit);
    let quantity = book.buys[bi].quantity.min(book.sells[si].quantity);

    let buyer = Arc::clone(&book.buys[bi].trader);
    let seller = Arc::clone(&book.sells[si].trader);

    // Settlement. The products cannot exceed the encumbrance checked at post
    // time (quantity <= buy quantity, price <= buy limit).
    let proceeds = quantity
        .checked_mul(price)
        .expect("trade proceeds overflow encumbered cost");
    seller.account().credit_balance(proceeds);
    buyer.account().credit_inventory(quantity);
    let refund = quantity * (buy_limit - price);
    if refund > 0 {
        buyer.account().credit_balance(refund);
    }

    book.buys[bi].quantity -= quantity;
    book.sells[si].quantity -= quantity;
    book.last_trade_price = price;

    let execution = Execution {
        buy_order: book.buys[bi].id,
        sell_order: book.sells[si].id,
        quantity,
        price,
        buy_limit,
        sell_limit,
        buyer,
        seller,
    };

    if book.buys[bi].quantity == 0 {
        book.buys.swap_remove(bi);
    }
    if book.sells[si].quantity == 0 {
        book.sells.swap_remove(si);
    }

    Some(execution)
}
