//! Bourse wire protocol: fixed 12-byte header plus optional payload.
//!
//! All multi-byte fields are big-endian. The header carries the packet type,
//! the payload size, and the producer's wall-clock timestamp. Payload codecs
//! are hand-rolled over byte buffers; there is no serde on the wire path.

use crate::error::{BourseError, Result};
use crate::types::{Funds, OrderId, Quantity};
use std::io::{self, Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

pub const HEADER_SIZE: usize = 12;

/// Packet type byte. Values are stable and shared with clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Login = 1,
    Status = 2,
    Deposit = 3,
    Withdraw = 4,
    Escrow = 5,
    Release = 6,
    Buy = 7,
    Sell = 8,
    Cancel = 9,
    Ack = 10,
    Nack = 11,
    Bought = 12,
    Sold = 13,
    Posted = 14,
    Canceled = 15,
    Traded = 16,
}

impl PacketType {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => PacketType::Login,
            2 => PacketType::Status,
            3 => PacketType::Deposit,
            4 => PacketType::Withdraw,
            5 => PacketType::Escrow,
            6 => PacketType::Release,
            7 => PacketType::Buy,
            8 => PacketType::Sell,
            9 => PacketType::Cancel,
            10 => PacketType::Ack,
            11 => PacketType::Nack,
            12 => PacketType::Bought,
            13 => PacketType::Sold,
            14 => PacketType::Posted,
            15 => PacketType::Canceled,
            16 => PacketType::Traded,
            _ => return None,
        })
    }
}

/// Fixed packet header.
///
/// `packet_type` is kept as the raw byte so an unknown type can still be
/// framed (its payload consumed) and answered with a NACK at dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketHeader {
    pub packet_type: u8,
    pub payload_size: u16,
    pub timestamp_sec: u32,
    pub timestamp_nsec: u32,
}

impl PacketHeader {
    /// Header for `packet_type` stamped with the current wall clock.
    pub fn now(packet_type: PacketType, payload_size: u16) -> Self {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            packet_type: packet_type as u8,
            payload_size,
            timestamp_sec: ts.as_secs() as u32,
            timestamp_nsec: ts.subsec_nanos(),
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.packet_type;
        // buf[1] reserved, zero
        buf[2..4].copy_from_slice(&self.payload_size.to_be_bytes());
        buf[4..8].copy_from_slice(&self.timestamp_sec.to_be_bytes());
        buf[8..12].copy_from_slice(&self.timestamp_nsec.to_be_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Self {
        Self {
            packet_type: buf[0],
            payload_size: u16::from_be_bytes([buf[2], buf[3]]),
            timestamp_sec: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            timestamp_nsec: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        }
    }
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// DEPOSIT / WITHDRAW payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FundsInfo {
    pub amount: Funds,
}

impl FundsInfo {
    pub const SIZE: usize = 4;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        self.amount.to_be_bytes()
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() != Self::SIZE {
            return Err(BourseError::MalformedPacket("bad FUNDS_INFO size"));
        }
        Ok(Self { amount: read_u32(buf, 0) })
    }
}

/// ESCROW / RELEASE payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EscrowInfo {
    pub quantity: Quantity,
}

impl EscrowInfo {
    pub const SIZE: usize = 4;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        self.quantity.to_be_bytes()
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() != Self::SIZE {
            return Err(BourseError::MalformedPacket("bad ESCROW_INFO size"));
        }
        Ok(Self { quantity: read_u32(buf, 0) })
    }
}

/// BUY / SELL payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderInfo {
    pub quantity: Quantity,
    pub price: Funds,
}

impl OrderInfo {
    pub const SIZE: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.quantity.to_be_bytes());
        buf[4..8].copy_from_slice(&self.price.to_be_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() != Self::SIZE {
            return Err(BourseError::MalformedPacket("bad ORDER_INFO size"));
        }
        Ok(Self {
            quantity: read_u32(buf, 0),
            price: read_u32(buf, 4),
        })
    }
}

/// CANCEL payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CancelInfo {
    pub order_id: OrderId,
}

impl CancelInfo {
    pub const SIZE: usize = 4;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        self.order_id.0.to_be_bytes()
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() != Self::SIZE {
            return Err(BourseError::MalformedPacket("bad CANCEL_INFO size"));
        }
        Ok(Self { order_id: OrderId(read_u32(buf, 0)) })
    }
}

/// ACK payload: account snapshot plus market quotes.
///
/// `order_id` and `quantity` are zero except in replies to BUY/SELL (new
/// order id) and CANCEL (canceled order id and residual quantity).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusInfo {
    pub balance: Funds,
    pub inventory: Quantity,
    pub bid: Funds,
    pub ask: Funds,
    pub last: Funds,
    pub order_id: u32,
    pub quantity: Quantity,
}

impl StatusInfo {
    pub const SIZE: usize = 28;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        for (i, v) in [
            self.balance,
            self.inventory,
            self.bid,
            self.ask,
            self.last,
            self.order_id,
            self.quantity,
        ]
        .iter()
        .enumerate()
        {
            buf[i * 4..i * 4 + 4].copy_from_slice(&v.to_be_bytes());
        }
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() != Self::SIZE {
            return Err(BourseError::MalformedPacket("bad STATUS_INFO size"));
        }
        Ok(Self {
            balance: read_u32(buf, 0),
            inventory: read_u32(buf, 4),
            bid: read_u32(buf, 8),
            ask: read_u32(buf, 12),
            last: read_u32(buf, 16),
            order_id: read_u32(buf, 20),
            quantity: read_u32(buf, 24),
        })
    }
}

/// POSTED / CANCELED / BOUGHT / SOLD / TRADED payload.
///
/// For POSTED of a buy, `buyer` is the new order id and `seller` is zero
/// (symmetric for a sell). For CANCELED only the owning side is non-zero and
/// `price` is zero. For trade notifications both order ids are set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NotifyInfo {
    pub buyer: u32,
    pub seller: u32,
    pub quantity: Quantity,
    pub price: Funds,
}

impl NotifyInfo {
    pub const SIZE: usize = 16;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.buyer.to_be_bytes());
        buf[4..8].copy_from_slice(&self.seller.to_be_bytes());
        buf[8..12].copy_from_slice(&self.quantity.to_be_bytes());
        buf[12..16].copy_from_slice(&self.price.to_be_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() != Self::SIZE {
            return Err(BourseError::MalformedPacket("bad NOTIFY_INFO size"));
        }
        Ok(Self {
            buyer: read_u32(buf, 0),
            seller: read_u32(buf, 4),
            quantity: read_u32(buf, 8),
            price: read_u32(buf, 12),
        })
    }
}

/// Write a packet: header then payload. `header.payload_size` must equal
/// `payload.len()`.
pub fn send_packet(w: &mut impl Write, header: &PacketHeader, payload: &[u8]) -> Result<()> {
    debug_assert_eq!(header.payload_size as usize, payload.len());
    w.write_all(&header.to_bytes())?;
    if !payload.is_empty() {
        w.write_all(payload)?;
    }
    w.flush()?;
    Ok(())
}

/// Read until `buf` is full or EOF. Returns the number of bytes read.
fn read_full(r: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = r.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

/// Read one packet, blocking until complete.
///
/// EOF at a packet boundary is `PeerClosed` (clean close); EOF inside a
/// header or payload is an I/O error.
pub fn recv_packet(r: &mut impl Read) -> Result<(PacketHeader, Vec<u8>)> {
    let mut hdr_buf = [0u8; HEADER_SIZE];
    let n = read_full(r, &mut hdr_buf)?;
    if n == 0 {
        return Err(BourseError::PeerClosed);
    }
    if n < HEADER_SIZE {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated header").into());
    }
    let header = PacketHeader::from_bytes(&hdr_buf);

    let size = header.payload_size as usize;
    let mut payload = vec![0u8; size];
    if size > 0 {
        let n = read_full(r, &mut payload)?;
        if n < size {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated payload").into());
        }
    }
    Ok((header, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_round_trip() {
        let hdr = PacketHeader {
            packet_type: PacketType::Buy as u8,
            payload_size: OrderInfo::SIZE as u16,
            timestamp_sec: 1_700_000_000,
            timestamp_nsec: 999_999_999,
        };
        let parsed = PacketHeader::from_bytes(&hdr.to_bytes());
        assert_eq!(parsed, hdr);
    }

    #[test]
    fn header_reserved_byte_is_zero() {
        let hdr = PacketHeader::now(PacketType::Ack, 0);
        assert_eq!(hdr.to_bytes()[1], 0);
    }

    #[test]
    fn status_info_round_trip() {
        let info = StatusInfo {
            balance: 1000,
            inventory: 5,
            bid: 120,
            ask: 130,
            last: 125,
            order_id: 7,
            quantity: 3,
        };
        assert_eq!(StatusInfo::from_bytes(&info.to_bytes()).unwrap(), info);
    }

    #[test]
    fn notify_info_round_trip() {
        let info = NotifyInfo {
            buyer: 2,
            seller: 1,
            quantity: 5,
            price: 110,
        };
        assert_eq!(NotifyInfo::from_bytes(&info.to_bytes()).unwrap(), info);
    }

    #[test]
    fn order_info_rejects_wrong_size() {
        assert!(matches!(
            OrderInfo::from_bytes(&[0u8; 7]),
            Err(BourseError::MalformedPacket(_))
        ));
    }

    #[test]
    fn send_then_recv_round_trip() {
        let info = OrderInfo { quantity: 5, price: 100 };
        let hdr = PacketHeader::now(PacketType::Buy, OrderInfo::SIZE as u16);
        let mut wire = Vec::new();
        send_packet(&mut wire, &hdr, &info.to_bytes()).unwrap();

        let (parsed_hdr, payload) = recv_packet(&mut Cursor::new(wire)).unwrap();
        assert_eq!(parsed_hdr.packet_type, PacketType::Buy as u8);
        assert_eq!(OrderInfo::from_bytes(&payload).unwrap(), info);
    }

    #[test]
    fn recv_clean_eof_is_peer_closed() {
        let mut empty = Cursor::new(Vec::new());
        assert!(matches!(recv_packet(&mut empty), Err(BourseError::PeerClosed)));
    }

    #[test]
    fn recv_truncated_header_is_io_error() {
        let mut short = Cursor::new(vec![1u8, 0, 0]);
        assert!(matches!(recv_packet(&mut short), Err(BourseError::Io(_))));
    }

    #[test]
    fn recv_truncated_payload_is_io_error() {
        let hdr = PacketHeader::now(PacketType::Deposit, FundsInfo::SIZE as u16);
        let mut wire = hdr.to_bytes().to_vec();
        wire.extend_from_slice(&[0u8; 2]); // half a FUNDS_INFO
        assert!(matches!(
            recv_packet(&mut Cursor::new(wire)),
            Err(BourseError::Io(_))
        ));
    }

    #[test]
    fn unknown_type_byte_is_framed_not_fatal() {
        let hdr = PacketHeader {
            packet_type: 200,
            payload_size: 0,
            timestamp_sec: 0,
            timestamp_nsec: 0,
        };
        let mut wire = Vec::new();
        send_packet(&mut wire, &hdr, &[]).unwrap();
        let (parsed, payload) = recv_packet(&mut Cursor::new(wire)).unwrap();
        assert_eq!(parsed.packet_type, 200);
        assert!(PacketType::from_u8(parsed.packet_type).is_none());
        assert!(payload.is_empty());
    }
}
