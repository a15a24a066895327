//! Wire constants: field separator, tag numbers, message-kind codes

/// Field separator (ASCII SOH)
pub const SOH: u8 = 0x01;

/// Protocol version string carried in tag 8
pub const BEGIN_STRING: &[u8] = b"FIX.4.4";

/// Tag numbers used by the engine
pub mod tag {
    /// Protocol version (header)
    pub const BEGIN_STRING: u16 = 8;
    /// Body length (header)
    pub const BODY_LENGTH: u16 = 9;
    /// Message kind, single character (header)
    pub const MSG_TYPE: u16 = 35;
    /// Message sequence number
    pub const MSG_SEQ_NUM: u16 = 34;
    /// Sending time, `YYYYMMDD-HH:MM:SS.sss` UTC
    pub const SENDING_TIME: u16 = 52;
    /// Instrument symbol
    pub const SYMBOL: u16 = 55;
    /// Aggressor side, '1' = buy, '2' = sell
    pub const SIDE: u16 = 54;
    /// Last trade price
    pub const LAST_PX: u16 = 31;
    /// Last trade quantity
    pub const LAST_QTY: u16 = 32;
    /// Bid price
    pub const BID_PX: u16 = 132;
    /// Ask price
    pub const OFFER_PX: u16 = 133;
    /// Bid size
    pub const BID_SIZE: u16 = 134;
    /// Ask size
    pub const OFFER_SIZE: u16 = 135;
    /// Modulo-256 checksum (trailer)
    pub const CHECKSUM: u16 = 10;
}

/// Message kinds carried in tag 35
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixMsgKind {
    /// Session keep-alive
    Heartbeat,
    /// Test request
    TestRequest,
    /// Session logon
    Logon,
    /// Session logout
    Logout,
    /// Market data subscription request
    MarketDataRequest,
    /// Full market data snapshot
    MarketDataSnapshot,
    /// Incremental market data refresh
    MarketDataIncrementalRefresh,
}

impl FixMsgKind {
    /// Decode the single-character code of tag 35
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            b'0' => Some(Self::Heartbeat),
            b'1' => Some(Self::TestRequest),
            b'A' => Some(Self::Logon),
            b'5' => Some(Self::Logout),
            b'V' => Some(Self::MarketDataRequest),
            b'W' => Some(Self::MarketDataSnapshot),
            b'X' => Some(Self::MarketDataIncrementalRefresh),
            _ => None,
        }
    }

    /// The single-character code for tag 35
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Heartbeat => b'0',
            Self::TestRequest => b'1',
            Self::Logon => b'A',
            Self::Logout => b'5',
            Self::MarketDataRequest => b'V',
            Self::MarketDataSnapshot => b'W',
            Self::MarketDataIncrementalRefresh => b'X',
        }
    }
}

/// Modulo-256 checksum over a byte span
#[must_use]
pub fn checksum(bytes: &[u8]) -> u8 {
    let sum: u32 = bytes.iter().map(|&b| u32::from(b)).fold(0, u32::wrapping_add);
    (sum % 256) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_codes_roundtrip() {
        for kind in [
            FixMsgKind::Heartbeat,
            FixMsgKind::TestRequest,
            FixMsgKind::Logon,
            FixMsgKind::Logout,
            FixMsgKind::MarketDataRequest,
            FixMsgKind::MarketDataSnapshot,
            FixMsgKind::MarketDataIncrementalRefresh,
        ] {
            assert_eq!(FixMsgKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(FixMsgKind::from_code(b'?'), None);
    }

    #[test]
    fn checksum_is_byte_sum_mod_256() {
        assert_eq!(checksum(b""), 0);
        assert_eq!(checksum(&[255, 1]), 0);
        assert_eq!(checksum(b"8=FIX.4.4"), {
            let s: u32 = b"8=FIX.4.4".iter().map(|&b| u32::from(b)).sum();
            (s % 256) as u8
        });
    }
}
