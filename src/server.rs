//! Per-connection service loop and the TCP acceptor.
//!
//! Each connection gets its own thread running [`client_service`]: register
//! with the connection registry, run the request/reply state machine
//! (unauthenticated until a successful LOGIN), and on end-of-stream log the
//! trader out and unregister. Replies are ACK/NACK; POSTED is broadcast
//! after the poster's ACK.

use crate::audit::{AuditAction, AuditLog, Outcome};
use crate::client_registry::ClientRegistry;
use crate::error::{BourseError, Result};
use crate::exchange::Exchange;
use crate::ledger::AccountLedger;
use crate::protocol::{
    self, CancelInfo, EscrowInfo, FundsInfo, NotifyInfo, OrderInfo, PacketHeader, PacketType,
};
use crate::trader::{Trader, TraderRegistry};
use crate::types::{OrderId, Side};
use log::{debug, info, warn};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

/// Everything a session thread needs, constructed once at startup.
pub struct ServerContext {
    pub ledger: Arc<AccountLedger>,
    pub traders: Arc<TraderRegistry>,
    pub clients: Arc<ClientRegistry>,
    pub exchange: Arc<Exchange>,
    pub audit: Arc<dyn AuditLog>,
}

/// Accept connections until the listener fails (normally because shutdown
/// closed it). Each connection gets its own service thread.
pub fn run_acceptor(listener: TcpListener, ctx: Arc<ServerContext>) {
    loop {
        match listener.accept() {
            Ok((stream, addr)) => {
                debug!("accepted connection from {}", addr);
                let ctx = Arc::clone(&ctx);
                std::thread::spawn(move || client_service(stream, ctx));
            }
            Err(e) => {
                info!("accept loop ending: {}", e);
                break;
            }
        }
    }
}

/// Service one client connection to completion.
pub fn client_service(stream: TcpStream, ctx: Arc<ServerContext>) {
    let conn_id = match stream.try_clone().and_then(|clone| {
        ctx.clients
            .register(clone)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    }) {
        Ok(id) => id,
        Err(e) => {
            warn!("refusing connection: {}", e);
            return;
        }
    };

    let mut reader = stream;
    let mut trader: Option<Arc<Trader>> = None;

    loop {
        let (header, payload) = match protocol::recv_packet(&mut reader) {
            Ok(packet) => packet,
            Err(BourseError::PeerClosed) => {
                debug!("connection {:?}: end of stream", conn_id);
                break;
            }
            Err(e) => {
                warn!("connection {:?}: receive failed: {}", conn_id, e);
                break;
            }
        };

        let outcome = match &trader {
            None => handle_unauthenticated(&reader, &ctx, &mut trader, &header, &payload),
            Some(t) => handle_request(t, &ctx, &header, &payload),
        };
        if let Err(e) = outcome {
            // Reply could not be written; the peer is gone.
            debug!("connection {:?}: send failed: {}", conn_id, e);
            break;
        }
    }

    if let Some(trader) = trader.take() {
        ctx.traders.logout(&trader);
        ctx.audit
            .record(trader.name(), Outcome::Accepted, AuditAction::Logout);
    }
    ctx.clients.unregister(conn_id);
    debug!("connection {:?}: service thread terminating", conn_id);
}

/// Write a NACK straight to the connection (no trader yet).
fn send_nack_raw(stream: &TcpStream) -> Result<()> {
    let header = PacketHeader::now(PacketType::Nack, 0);
    protocol::send_packet(&mut &*stream, &header, &[])
}

/// Before login only LOGIN is legal; everything else is NACKed.
fn handle_unauthenticated(
    stream: &TcpStream,
    ctx: &ServerContext,
    trader: &mut Option<Arc<Trader>>,
    header: &PacketHeader,
    payload: &[u8],
) -> Result<()> {
    if header.packet_type != PacketType::Login as u8 {
        return send_nack_raw(stream);
    }
    let name = match std::str::from_utf8(payload) {
        Ok(name) if !name.is_empty() => name,
        _ => return send_nack_raw(stream),
    };
    let write_half = stream.try_clone()?;
    match ctx.traders.login(write_half, name, &ctx.ledger) {
        Ok(session) => {
            ctx.audit.record(name, Outcome::Accepted, AuditAction::Login);
            session.send_ack(None)?;
            *trader = Some(session);
            Ok(())
        }
        Err(e) => {
            info!("login '{}' refused: {}", name, e);
            ctx.audit.record(name, Outcome::Refused, AuditAction::Login);
            send_nack_raw(stream)
        }
    }
}

/// Dispatch one authenticated request. The returned error is an I/O failure
/// writing the reply; request-level failures are answered with NACK.
fn handle_request(
    trader: &Arc<Trader>,
    ctx: &ServerContext,
    header: &PacketHeader,
    payload: &[u8],
) -> Result<()> {
    let Some(packet_type) = PacketType::from_u8(header.packet_type) else {
        debug!("unknown packet type {}", header.packet_type);
        return trader.send_nack();
    };
    match packet_type {
        PacketType::Login => {
            // Already logged in.
            trader.send_nack()
        }
        PacketType::Status => {
            let info = ctx.exchange.status(Some(trader.account()));
            trader.send_ack(Some(&info))
        }
        PacketType::Deposit => {
            let Ok(funds) = FundsInfo::from_bytes(payload) else {
                return trader.send_nack();
            };
            trader.account().credit_balance(funds.amount);
            ctx.audit.record(
                trader.name(),
                Outcome::Accepted,
                AuditAction::Deposit { amount: funds.amount },
            );
            let info = ctx.exchange.status(Some(trader.account()));
            trader.send_ack(Some(&info))
        }
        PacketType::Withdraw => {
            let Ok(funds) = FundsInfo::from_bytes(payload) else {
                return trader.send_nack();
            };
            let action = AuditAction::Withdraw { amount: funds.amount };
            match trader.account().debit_balance(funds.amount) {
                Ok(()) => {
                    ctx.audit.record(trader.name(), Outcome::Accepted, action);
                    let info = ctx.exchange.status(Some(trader.account()));
                    trader.send_ack(Some(&info))
                }
                Err(_) => {
                    ctx.audit.record(trader.name(), Outcome::Refused, action);
                    trader.send_nack()
                }
            }
        }
        PacketType::Escrow => {
            let Ok(escrow) = EscrowInfo::from_bytes(payload) else {
                return trader.send_nack();
            };
            trader.account().credit_inventory(escrow.quantity);
            ctx.audit.record(
                trader.name(),
                Outcome::Accepted,
                AuditAction::Escrow { quantity: escrow.quantity },
            );
            let info = ctx.exchange.status(Some(trader.account()));
            trader.send_ack(Some(&info))
        }
        PacketType::Release => {
            let Ok(escrow) = EscrowInfo::from_bytes(payload) else {
                return trader.send_nack();
            };
            let action = AuditAction::Release { quantity: escrow.quantity };
            match trader.account().debit_inventory(escrow.quantity) {
                Ok(()) => {
                    ctx.audit.record(trader.name(), Outcome::Accepted, action);
                    let info = ctx.exchange.status(Some(trader.account()));
                    trader.send_ack(Some(&info))
                }
                Err(_) => {
                    ctx.audit.record(trader.name(), Outcome::Refused, action);
                    trader.send_nack()
                }
            }
        }
        PacketType::Buy => handle_post(trader, ctx, payload, Side::Buy),
        PacketType::Sell => handle_post(trader, ctx, payload, Side::Sell),
        PacketType::Cancel => {
            let Ok(cancel) = CancelInfo::from_bytes(payload) else {
                return trader.send_nack();
            };
            match ctx.exchange.cancel(trader, cancel.order_id) {
                Ok((_, quantity)) => {
                    ctx.audit.record(
                        trader.name(),
                        Outcome::Accepted,
                        AuditAction::Cancel { order_id: cancel.order_id, quantity },
                    );
                    let mut info = ctx.exchange.status(Some(trader.account()));
                    info.order_id = cancel.order_id.0;
                    info.quantity = quantity;
                    trader.send_ack(Some(&info))
                }
                Err(e) => {
                    debug!("cancel {} by '{}' refused: {}", cancel.order_id.0, trader.name(), e);
                    ctx.audit.record(
                        trader.name(),
                        Outcome::Refused,
                        AuditAction::Cancel { order_id: cancel.order_id, quantity: 0 },
                    );
                    trader.send_nack()
                }
            }
        }
        // Server-to-client types arriving inbound are protocol violations.
        PacketType::Ack
        | PacketType::Nack
        | PacketType::Bought
        | PacketType::Sold
        | PacketType::Posted
        | PacketType::Canceled
        | PacketType::Traded => trader.send_nack(),
    }
}

fn handle_post(
    trader: &Arc<Trader>,
    ctx: &ServerContext,
    payload: &[u8],
    side: Side,
) -> Result<()> {
    let Ok(order) = OrderInfo::from_bytes(payload) else {
        return trader.send_nack();
    };
    let posted = if side.is_buy() {
        ctx.exchange.post_buy(trader, order.quantity, order.price)
    } else {
        ctx.exchange.post_sell(trader, order.quantity, order.price)
    };
    let audit_action = |order_id: OrderId| {
        if side.is_buy() {
            AuditAction::Buy { order_id, quantity: order.quantity, price: order.price }
        } else {
            AuditAction::Sell { order_id, quantity: order.quantity, price: order.price }
        }
    };
    match posted {
        Ok(id) => {
            ctx.audit
                .record(trader.name(), Outcome::Accepted, audit_action(id));
            let mut info = ctx.exchange.status(Some(trader.account()));
            info.order_id = id.0;
            trader.send_ack(Some(&info))?;

            // POSTED goes out after the poster's ACK.
            let notify = if side.is_buy() {
                NotifyInfo {
                    buyer: id.0,
                    seller: 0,
                    quantity: order.quantity,
                    price: order.price,
                }
            } else {
                NotifyInfo {
                    buyer: 0,
                    seller: id.0,
                    quantity: order.quantity,
                    price: order.price,
                }
            };
            let header = PacketHeader::now(PacketType::Posted, NotifyInfo::SIZE as u16);
            ctx.traders.broadcast(&header, &notify.to_bytes());
            Ok(())
        }
        Err(e) => {
            debug!("{:?} by '{}' refused: {}", side, trader.name(), e);
            ctx.audit
                .record(trader.name(), Outcome::Refused, audit_action(OrderId(0)));
            trader.send_nack()
        }
    }
}
