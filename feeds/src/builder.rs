//! Outbound frame assembly
//!
//! Builds well-formed tag-value frames: body length in tag 9 counts the
//! bytes between the body-length field's separator and the checksum tag,
//! and tag 10 carries the modulo-256 checksum of everything before it.
//! Used by the simulator's wire mode and the decoder tests.

use crate::wire::{checksum, tag, FixMsgKind, BEGIN_STRING, SOH};
use chrono::Utc;
use common::{Px, Qty, Side};
use std::fmt::Write as _;

/// Reusable frame assembler
pub struct FixMessageBuilder {
    body: String,
    frame: String,
    seq: u64,
}

impl FixMessageBuilder {
    /// Create a builder with sequence numbering starting at 1
    #[must_use]
    pub fn new() -> Self {
        Self {
            body: String::with_capacity(256),
            frame: String::with_capacity(512),
            seq: 0,
        }
    }

    /// Assemble a trade frame (incremental refresh)
    pub fn trade(&mut self, symbol: &str, price: Px, quantity: Qty, aggressor: Side) -> Vec<u8> {
        self.begin(FixMsgKind::MarketDataIncrementalRefresh);
        self.field_str(tag::SYMBOL, symbol);
        self.field_display(tag::LAST_PX, price);
        self.field_display(tag::LAST_QTY, quantity.as_u64());
        self.field_str(
            tag::SIDE,
            match aggressor {
                Side::Buy => "1",
                Side::Sell => "2",
            },
        );
        self.finish()
    }

    /// Assemble a top-of-book quote frame (snapshot)
    pub fn quote(
        &mut self,
        symbol: &str,
        bid_px: Px,
        ask_px: Px,
        bid_sz: Qty,
        ask_sz: Qty,
    ) -> Vec<u8> {
        self.begin(FixMsgKind::MarketDataSnapshot);
        self.field_str(tag::SYMBOL, symbol);
        self.field_display(tag::BID_PX, bid_px);
        self.field_display(tag::OFFER_PX, ask_px);
        self.field_display(tag::BID_SIZE, bid_sz.as_u64());
        self.field_display(tag::OFFER_SIZE, ask_sz.as_u64());
        self.finish()
    }

    /// Assemble a heartbeat frame
    pub fn heartbeat(&mut self) -> Vec<u8> {
        self.begin(FixMsgKind::Heartbeat);
        self.finish()
    }

    /// Sequence number the next frame will carry
    #[must_use]
    pub const fn next_seq(&self) -> u64 {
        self.seq + 1
    }

    fn begin(&mut self, kind: FixMsgKind) {
        self.seq += 1;
        self.body.clear();
        self.body.push_str("35=");
        self.body.push(kind.code() as char);
        self.body.push(SOH as char);
        let _ = write!(self.body, "{}={}", tag::MSG_SEQ_NUM, self.seq);
        self.body.push(SOH as char);
        let _ = write!(
            self.body,
            "{}={}",
            tag::SENDING_TIME,
            Utc::now().format("%Y%m%d-%H:%M:%S%.3f")
        );
        self.body.push(SOH as char);
    }

    fn field_str(&mut self, tag_num: u16, value: &str) {
        let _ = write!(self.body, "{tag_num}={value}");
        self.body.push(SOH as char);
    }

    fn field_display(&mut self, tag_num: u16, value: impl std::fmt::Display) {
        let _ = write!(self.body, "{tag_num}={value}");
        self.body.push(SOH as char);
    }

    fn finish(&mut self) -> Vec<u8> {
        self.frame.clear();
        let _ = write!(
            self.frame,
            "8={}",
            std::str::from_utf8(BEGIN_STRING).unwrap_or("FIX.4.4")
        );
        self.frame.push(SOH as char);
        let _ = write!(self.frame, "9={}", self.body.len());
        self.frame.push(SOH as char);
        self.frame.push_str(&self.body);

        let sum = checksum(self.frame.as_bytes());
        let _ = write!(self.frame, "10={sum:03}");
        self.frame.push(SOH as char);
        self.frame.clone().into_bytes()
    }
}

impl Default for FixMessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}
