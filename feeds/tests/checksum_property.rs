//! Property tests for frame integrity validation

use common::{Px, Qty, Side, Ts};
use feeds::{FixMessageBuilder, FixParser, ParserConfig};
use proptest::prelude::*;

fn validating_parser() -> FixParser {
    FixParser::new(ParserConfig {
        enforce_checksum: true,
    })
}

proptest! {
    /// Flipping any single bit of a well-formed frame must make validation
    /// fail — either as a checksum mismatch or, when the flip breaks the
    /// frame structure itself, as a structural parse error.
    #[test]
    fn any_single_bit_flip_fails_validation(byte_pos in 0usize..256, bit in 0u8..8) {
        let parser = validating_parser();
        let mut builder = FixMessageBuilder::new();
        let frame = builder.trade("AAPL", Px::new(150.25), Qty::new(1000), Side::Buy);
        prop_assume!(byte_pos < frame.len());

        prop_assert!(parser.parse(&frame, Ts::from_nanos(0)).is_ok());

        let mut tampered = frame.clone();
        tampered[byte_pos] ^= 1 << bit;
        prop_assert!(parser.parse(&tampered, Ts::from_nanos(0)).is_err());
    }

    /// Round-trip: every frame the builder emits passes strict validation.
    #[test]
    fn built_frames_always_validate(px_ticks in 1i64..10_000_000_000i64, qty in 1u64..1_000_000) {
        let parser = validating_parser();
        let mut builder = FixMessageBuilder::new();
        let frame = builder.trade("NVDA", Px::from_i64(px_ticks), Qty::new(qty), Side::Sell);
        let parsed = parser.parse(&frame, Ts::from_nanos(0)).unwrap();
        let trade = parser.to_trade(&parsed).unwrap();
        prop_assert_eq!(trade.price.as_i64(), px_ticks);
        prop_assert_eq!(trade.quantity.as_u64(), qty);
        prop_assert_eq!(trade.aggressor, Side::Sell);
    }
}
