//! Tag-value frame decoder
//!
//! The decoder is allocation-free on the steady path: fields are borrowed
//! subslices of the input collected into a fixed array, and a 512-slot table
//! indexed by tag gives O(1) field access after parsing. Tags outside the
//! table are retained in the field list but not addressable; a frame with
//! more than [`MAX_FIELDS`] fields is rejected.

use crate::wire::{self, tag, FixMsgKind, SOH};
use chrono::NaiveDateTime;
use common::{ClockCalibration, MarketMessage, Px, Qty, Quote, Side, Symbol, Trade, Ts};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Maximum fields per frame
pub const MAX_FIELDS: usize = 256;

/// Size of the tag lookup table; larger tags are dropped silently
pub const TAG_TABLE_SIZE: usize = 512;

/// Wire timestamp layout for tag 52
const SENDING_TIME_FORMAT: &str = "%Y%m%d-%H:%M:%S%.3f";

/// Decode failure taxonomy
///
/// All variants are recoverable: the caller counts the error and moves on
/// to the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Frame shorter than the minimum header + trailer
    #[error("frame too short")]
    TooShort,
    /// Frame does not begin with the version field
    #[error("bad header")]
    BadHeader,
    /// Malformed `tag=value<SOH>` field
    #[error("bad field syntax at byte {at}")]
    BadFieldSyntax {
        /// Offset of the offending field
        at: usize,
    },
    /// More than [`MAX_FIELDS`] fields
    #[error("too many fields")]
    TooManyFields,
    /// A required tag is absent
    #[error("missing required field {0}")]
    MissingRequiredField(u16),
    /// Trailer checksum does not match the frame body
    #[error("checksum mismatch: expected {expected}, found {found}")]
    ChecksumMismatch {
        /// Checksum computed over the frame
        expected: u8,
        /// Checksum carried in tag 10
        found: u8,
    },
    /// Tag 35 carries a kind the engine does not understand
    #[error("unknown message kind")]
    UnknownMessageKind,
}

/// Decoder configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct ParserConfig {
    /// Reject frames whose tag-10 checksum does not match
    ///
    /// Off by default; the upstream feed is trusted and resyncs via
    /// snapshots.
    pub enforce_checksum: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct RawField<'a> {
    tag: u16,
    value: &'a [u8],
}

const EMPTY_VALUE: &[u8] = &[];

/// One decoded frame borrowing the input buffer
#[derive(Debug, PartialEq)]
pub struct ParsedFrame<'a> {
    fields: [RawField<'a>; MAX_FIELDS],
    count: usize,
    /// `tag -> field index + 1`; 0 marks an absent tag
    slots: [u16; TAG_TABLE_SIZE],
    receive_ts: Ts,
    calibration: ClockCalibration,
}

impl<'a> ParsedFrame<'a> {
    /// Raw bytes of a field by tag; `None` for absent or out-of-table tags
    #[inline]
    #[must_use]
    pub fn field(&self, tag: u16) -> Option<&'a [u8]> {
        let slot = *self.slots.get(tag as usize)?;
        if slot == 0 {
            return None;
        }
        Some(self.fields[slot as usize - 1].value)
    }

    /// Field decoded as a signed integer
    #[must_use]
    pub fn int_field(&self, tag: u16) -> Option<i64> {
        parse_int(self.field(tag)?)
    }

    /// Field decoded as a fixed-point price
    #[must_use]
    pub fn price_field(&self, tag: u16) -> Option<Px> {
        parse_decimal_ticks(self.field(tag)?).map(Px::from_i64)
    }

    /// Field decoded as a quantity; negative values are rejected
    #[must_use]
    pub fn qty_field(&self, tag: u16) -> Option<Qty> {
        let v = self.int_field(tag)?;
        u64::try_from(v).ok().map(Qty::new)
    }

    /// Message kind carried in tag 35
    #[must_use]
    pub fn kind(&self) -> Option<FixMsgKind> {
        let code = *self.field(tag::MSG_TYPE)?.first()?;
        FixMsgKind::from_code(code)
    }

    /// Instrument symbol (tag 55)
    #[must_use]
    pub fn symbol(&self) -> Option<Symbol> {
        self.field(tag::SYMBOL).map(Symbol::from_bytes)
    }

    /// Last trade price (tag 31)
    #[must_use]
    pub fn last_price(&self) -> Option<Px> {
        self.price_field(tag::LAST_PX)
    }

    /// Last trade quantity (tag 32)
    #[must_use]
    pub fn last_qty(&self) -> Option<Qty> {
        self.qty_field(tag::LAST_QTY)
    }

    /// Bid price (tag 132)
    #[must_use]
    pub fn bid_px(&self) -> Option<Px> {
        self.price_field(tag::BID_PX)
    }

    /// Ask price (tag 133)
    #[must_use]
    pub fn ask_px(&self) -> Option<Px> {
        self.price_field(tag::OFFER_PX)
    }

    /// Bid size (tag 134)
    #[must_use]
    pub fn bid_sz(&self) -> Option<Qty> {
        self.qty_field(tag::BID_SIZE)
    }

    /// Ask size (tag 135)
    #[must_use]
    pub fn ask_sz(&self) -> Option<Qty> {
        self.qty_field(tag::OFFER_SIZE)
    }

    /// Sending time (tag 52) mapped into the monotonic domain through the
    /// startup calibration
    #[must_use]
    pub fn sending_time(&self) -> Option<Ts> {
        let raw = self.field(tag::SENDING_TIME)?;
        let wall_ns = parse_wire_timestamp(raw)?;
        Some(self.calibration.to_monotonic(wall_ns))
    }

    /// When the frame was received
    #[must_use]
    pub const fn receive_ts(&self) -> Ts {
        self.receive_ts
    }

    /// Number of decoded fields
    #[must_use]
    pub const fn field_count(&self) -> usize {
        self.count
    }

    /// Decoded `(tag, value)` pairs in wire order
    pub fn fields(&self) -> impl Iterator<Item = (u16, &'a [u8])> + '_ {
        self.fields[..self.count].iter().map(|f| (f.tag, f.value))
    }
}

/// Frame decoder with parse counters
///
/// Shareable across threads; parsing only touches atomics, so one decoder
/// can serve every ingest site.
pub struct FixParser {
    config: ParserConfig,
    calibration: ClockCalibration,
    messages_parsed: AtomicU64,
    parse_errors: AtomicU64,
}

impl FixParser {
    /// Create a decoder with the given configuration, capturing the clock
    /// calibration in force at construction
    #[must_use]
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config,
            calibration: ClockCalibration::capture(),
            messages_parsed: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
        }
    }

    /// Decode one frame
    ///
    /// Failures are counted and reported; the decoder is immediately ready
    /// for the next frame.
    pub fn parse<'a>(&self, buf: &'a [u8], receive_ts: Ts) -> Result<ParsedFrame<'a>, ParseError> {
        match self.parse_inner(buf, receive_ts) {
            Ok(frame) => {
                self.messages_parsed.fetch_add(1, Ordering::Relaxed);
                Ok(frame)
            }
            Err(e) => {
                self.parse_errors.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    fn parse_inner<'a>(
        &self,
        buf: &'a [u8],
        receive_ts: Ts,
    ) -> Result<ParsedFrame<'a>, ParseError> {
        if buf.len() < 20 {
            return Err(ParseError::TooShort);
        }
        if !buf.starts_with(b"8=FIX") {
            return Err(ParseError::BadHeader);
        }

        let mut frame = ParsedFrame {
            fields: [RawField {
                tag: 0,
                value: EMPTY_VALUE,
            }; MAX_FIELDS],
            count: 0,
            slots: [0u16; TAG_TABLE_SIZE],
            receive_ts,
            calibration: self.calibration,
        };

        let mut pos = 0usize;
        let mut checksum_span = buf.len();
        let mut checksum_value: Option<&[u8]> = None;

        while pos < buf.len() {
            if frame.count == MAX_FIELDS {
                return Err(ParseError::TooManyFields);
            }
            let field_start = pos;
            let eq = buf[pos..]
                .iter()
                .position(|&b| b == b'=')
                .ok_or(ParseError::BadFieldSyntax { at: field_start })?;
            let tag_num = parse_tag(&buf[pos..pos + eq])
                .ok_or(ParseError::BadFieldSyntax { at: field_start })?;
            pos += eq + 1;
            let soh = buf[pos..]
                .iter()
                .position(|&b| b == SOH)
                .ok_or(ParseError::BadFieldSyntax { at: field_start })?;
            let value = &buf[pos..pos + soh];
            pos += soh + 1;

            frame.fields[frame.count] = RawField {
                tag: tag_num,
                value,
            };
            frame.count += 1;
            if (tag_num as usize) < TAG_TABLE_SIZE {
                frame.slots[tag_num as usize] = frame.count as u16;
            }
            if tag_num == tag::CHECKSUM {
                checksum_span = field_start;
                checksum_value = Some(value);
            }
        }

        for required in [tag::BODY_LENGTH, tag::MSG_TYPE] {
            if frame.field(required).is_none() {
                return Err(ParseError::MissingRequiredField(required));
            }
        }

        if self.config.enforce_checksum {
            let raw = checksum_value.ok_or(ParseError::MissingRequiredField(tag::CHECKSUM))?;
            let found = parse_int(raw)
                .and_then(|v| u8::try_from(v).ok())
                .ok_or(ParseError::BadFieldSyntax { at: checksum_span })?;
            let expected = wire::checksum(&buf[..checksum_span]);
            if expected != found {
                return Err(ParseError::ChecksumMismatch { expected, found });
            }
        }

        Ok(frame)
    }

    /// Build a [`Trade`] from a market-data frame
    pub fn to_trade(&self, frame: &ParsedFrame<'_>) -> Result<Trade, ParseError> {
        match frame.kind() {
            Some(FixMsgKind::MarketDataSnapshot | FixMsgKind::MarketDataIncrementalRefresh) => {}
            _ => return Err(ParseError::UnknownMessageKind),
        }
        let symbol = frame
            .symbol()
            .ok_or(ParseError::MissingRequiredField(tag::SYMBOL))?;
        let price = frame
            .last_price()
            .ok_or(ParseError::MissingRequiredField(tag::LAST_PX))?;
        let quantity = frame
            .last_qty()
            .ok_or(ParseError::MissingRequiredField(tag::LAST_QTY))?;
        let aggressor = match frame.field(tag::SIDE).and_then(|v| v.first().copied()) {
            Some(b'2') => Side::Sell,
            _ => Side::Buy,
        };
        Ok(Trade {
            ts: frame.receive_ts(),
            symbol,
            price,
            quantity,
            aggressor,
            trade_id: self.messages_parsed.load(Ordering::Relaxed),
        })
    }

    /// Build a [`Quote`] from a snapshot frame
    pub fn to_quote(&self, frame: &ParsedFrame<'_>) -> Result<Quote, ParseError> {
        if frame.kind() != Some(FixMsgKind::MarketDataSnapshot) {
            return Err(ParseError::UnknownMessageKind);
        }
        let symbol = frame
            .symbol()
            .ok_or(ParseError::MissingRequiredField(tag::SYMBOL))?;
        let bid_px = frame
            .bid_px()
            .ok_or(ParseError::MissingRequiredField(tag::BID_PX))?;
        let ask_px = frame
            .ask_px()
            .ok_or(ParseError::MissingRequiredField(tag::OFFER_PX))?;
        let bid_sz = frame
            .bid_sz()
            .ok_or(ParseError::MissingRequiredField(tag::BID_SIZE))?;
        let ask_sz = frame
            .ask_sz()
            .ok_or(ParseError::MissingRequiredField(tag::OFFER_SIZE))?;
        Ok(Quote {
            ts: frame.receive_ts(),
            symbol,
            bid_px,
            ask_px,
            bid_sz,
            ask_sz,
        })
    }

    /// Build a typed [`MarketMessage`] from a frame
    ///
    /// Snapshot frames carrying trade fields convert to trades, otherwise
    /// to quotes; heartbeats pass through; anything else is
    /// [`ParseError::UnknownMessageKind`].
    pub fn to_message(&self, frame: &ParsedFrame<'_>) -> Result<MarketMessage, ParseError> {
        let sequence = self.messages_parsed.load(Ordering::Relaxed);
        let receive_ts = frame.receive_ts();
        let exchange_ts = frame.sending_time().unwrap_or(receive_ts);
        match frame.kind() {
            Some(FixMsgKind::Heartbeat) => Ok(MarketMessage::heartbeat(sequence, receive_ts)),
            Some(FixMsgKind::MarketDataIncrementalRefresh) => {
                let trade = self.to_trade(frame)?;
                Ok(MarketMessage::trade(sequence, receive_ts, exchange_ts, trade))
            }
            Some(FixMsgKind::MarketDataSnapshot) => {
                if frame.last_price().is_some() && frame.last_qty().is_some() {
                    let trade = self.to_trade(frame)?;
                    Ok(MarketMessage::trade(sequence, receive_ts, exchange_ts, trade))
                } else {
                    let quote = self.to_quote(frame)?;
                    Ok(MarketMessage::quote(sequence, receive_ts, exchange_ts, quote))
                }
            }
            _ => Err(ParseError::UnknownMessageKind),
        }
    }

    /// Frames decoded successfully
    #[must_use]
    pub fn messages_parsed(&self) -> u64 {
        self.messages_parsed.load(Ordering::Relaxed)
    }

    /// Frames rejected
    #[must_use]
    pub fn parse_errors(&self) -> u64 {
        self.parse_errors.load(Ordering::Relaxed)
    }

    /// Clear the decoder's accumulated counters
    pub fn reset(&self) {
        self.messages_parsed.store(0, Ordering::Relaxed);
        self.parse_errors.store(0, Ordering::Relaxed);
    }
}

impl Default for FixParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

/// Decode an unsigned tag number; rejects empty and non-digit input
fn parse_tag(bytes: &[u8]) -> Option<u16> {
    if bytes.is_empty() || bytes.len() > 5 {
        return None;
    }
    let mut v: u32 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        v = v * 10 + u32::from(b - b'0');
    }
    u16::try_from(v).ok()
}

/// Decode a signed integer with overflow checking
fn parse_int(bytes: &[u8]) -> Option<i64> {
    let (neg, digits) = match bytes.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, bytes),
    };
    if digits.is_empty() {
        return None;
    }
    let mut v: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return None;
        }
        v = v.checked_mul(10)?.checked_add(i64::from(b - b'0'))?;
    }
    if neg {
        v.checked_neg()
    } else {
        Some(v)
    }
}

/// Decode a decimal into fixed-point ticks (scale 10_000)
///
/// Fractional digits beyond the fourth are truncated.
fn parse_decimal_ticks(bytes: &[u8]) -> Option<i64> {
    let (neg, rest) = match bytes.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, bytes),
    };
    if rest.is_empty() {
        return None;
    }
    let point = rest.iter().position(|&b| b == b'.');
    let (int_part, frac_part) = match point {
        Some(i) => (&rest[..i], &rest[i + 1..]),
        None => (rest, &rest[rest.len()..]),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    let mut ticks: i64 = 0;
    for &b in int_part {
        if !b.is_ascii_digit() {
            return None;
        }
        ticks = ticks.checked_mul(10)?.checked_add(i64::from(b - b'0'))?;
    }
    ticks = ticks.checked_mul(10_000)?;

    let mut scale = 1_000i64;
    for &b in frac_part.iter().take(4) {
        if !b.is_ascii_digit() {
            return None;
        }
        ticks = ticks.checked_add(i64::from(b - b'0').checked_mul(scale)?)?;
        scale /= 10;
    }
    // Validate (but discard) any remaining fractional digits.
    if frac_part.len() > 4 && !frac_part[4..].iter().all(u8::is_ascii_digit) {
        return None;
    }

    if neg {
        ticks.checked_neg()
    } else {
        Some(ticks)
    }
}

/// Decode `YYYYMMDD-HH:MM:SS.sss` UTC into epoch nanoseconds
fn parse_wire_timestamp(bytes: &[u8]) -> Option<u64> {
    let s = std::str::from_utf8(bytes).ok()?;
    let naive = NaiveDateTime::parse_from_str(s, SENDING_TIME_FORMAT).ok()?;
    let ns = naive.and_utc().timestamp_nanos_opt()?;
    u64::try_from(ns).ok()
}
