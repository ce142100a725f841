//! Round-trip, truncation and range tests for every temporal precision.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Timelike, Utc};

use crate::encoding::EncodingError;
use crate::time::*;

fn instant(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, nanos: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s)
        .single()
        .and_then(|at| at.with_nanosecond(nanos))
        .unwrap()
}

fn roundtrip(codec: &TimeCodec, at: DateTime<Utc>) -> (Vec<u8>, DateTime<Utc>) {
    let mut buf = Vec::new();
    codec.encode(at, &mut buf).unwrap();
    assert_eq!(buf.len(), codec.size());
    let decoded = codec.decode(&buf);
    (buf, decoded)
}

// ------------------------------------------------------------------------------------------------
// Sizes and resolutions
// ------------------------------------------------------------------------------------------------

#[test]
fn sizes_and_resolutions() {
    let expected = [
        (TemporalPrecision::Nanosecond, 12, Duration::from_nanos(1)),
        (TemporalPrecision::Millisecond, 8, Duration::from_millis(1)),
        (TemporalPrecision::Second, 4, Duration::from_secs(1)),
        (TemporalPrecision::Minute, 4, Duration::from_secs(60)),
        (TemporalPrecision::Hour, 3, Duration::from_secs(3_600)),
        (TemporalPrecision::Day, 2, Duration::from_secs(86_400)),
    ];
    for (precision, size, resolution) in expected {
        let codec = TimeCodec::new(precision);
        assert_eq!(codec.size(), size, "{precision:?}");
        assert_eq!(codec.resolution(), resolution, "{precision:?}");
    }
}

// ------------------------------------------------------------------------------------------------
// Truncation
// ------------------------------------------------------------------------------------------------

#[test]
fn roundtrip_truncates_to_resolution() {
    let at = instant(2026, 3, 14, 15, 9, 26, 535_897_932);
    let expected = [
        (TemporalPrecision::Nanosecond, at),
        (
            TemporalPrecision::Millisecond,
            instant(2026, 3, 14, 15, 9, 26, 535_000_000),
        ),
        (TemporalPrecision::Second, instant(2026, 3, 14, 15, 9, 26, 0)),
        (TemporalPrecision::Minute, instant(2026, 3, 14, 15, 9, 0, 0)),
        (TemporalPrecision::Hour, instant(2026, 3, 14, 15, 0, 0, 0)),
        (TemporalPrecision::Day, instant(2026, 3, 14, 0, 0, 0, 0)),
    ];
    for (precision, truncated) in expected {
        let codec = TimeCodec::new(precision);
        let (_, decoded) = roundtrip(&codec, at);
        assert_eq!(decoded, truncated, "{precision:?}");
        assert_eq!(codec.truncate(at).unwrap(), truncated);
    }
}

#[test]
fn truncated_instant_is_a_fixed_point() {
    let at = instant(2030, 12, 31, 23, 59, 59, 999_999_999);
    for precision in TemporalPrecision::ALL {
        let codec = TimeCodec::new(precision);
        let once = codec.truncate(at).unwrap();
        assert_eq!(codec.truncate(once).unwrap(), once, "{precision:?}");
    }
}

#[test]
fn pre_epoch_millis_truncate_toward_the_past() {
    let codec = TimeCodec::new(TemporalPrecision::Millisecond);
    let at = instant(1969, 12, 31, 23, 59, 59, 999_500_000);
    let (_, decoded) = roundtrip(&codec, at);
    assert_eq!(decoded, instant(1969, 12, 31, 23, 59, 59, 999_000_000));
}

// ------------------------------------------------------------------------------------------------
// Day epoch
// ------------------------------------------------------------------------------------------------

#[test]
fn day_epoch_is_2025() {
    let codec = TimeCodec::new(TemporalPrecision::Day);
    let (bytes, _) = roundtrip(&codec, instant(2025, 1, 1, 0, 0, 0, 0));
    assert_eq!(bytes, [0x00, 0x00]);

    let (bytes, _) = roundtrip(&codec, instant(2025, 1, 2, 12, 0, 0, 0));
    assert_eq!(bytes, [0x00, 0x01]);
    assert_eq!(codec.min_instant(), instant(2025, 1, 1, 0, 0, 0, 0));
}

#[test]
fn day_precision_covers_the_u16_range() {
    let codec = TimeCodec::new(TemporalPrecision::Day);
    let last = DateTime::from_timestamp(DAY_EPOCH_SECONDS + 65_535 * 86_400, 0).unwrap();
    let (bytes, decoded) = roundtrip(&codec, last);
    assert_eq!(bytes, [0xFF, 0xFF]);
    assert_eq!(decoded, last);

    let beyond = DateTime::from_timestamp(DAY_EPOCH_SECONDS + 65_536 * 86_400, 0).unwrap();
    assert!(matches!(
        codec.encode(beyond, &mut Vec::new()),
        Err(EncodingError::TimeOutOfRange(_))
    ));
}

#[test]
fn out_of_range_instants_are_rejected() {
    let before_2025 = instant(2024, 12, 31, 23, 59, 59, 0);
    assert!(
        TimeCodec::new(TemporalPrecision::Day)
            .encode(before_2025, &mut Vec::new())
            .is_err()
    );

    let before_1970 = instant(1969, 6, 1, 0, 0, 0, 0);
    for precision in [
        TemporalPrecision::Second,
        TemporalPrecision::Minute,
        TemporalPrecision::Hour,
    ] {
        let mut buf = Vec::new();
        assert!(
            TimeCodec::new(precision).encode(before_1970, &mut buf).is_err(),
            "{precision:?}"
        );
    }
}

#[test]
fn max_instant_is_the_last_encodable_step() {
    for precision in TemporalPrecision::ALL {
        let codec = TimeCodec::new(precision);
        let max = codec.max_instant();
        let (_, decoded) = roundtrip(&codec, max);
        assert_eq!(decoded, codec.truncate(max).unwrap(), "{precision:?}");

        if matches!(precision, TemporalPrecision::Nanosecond | TemporalPrecision::Millisecond) {
            continue;
        }
        assert_eq!(decoded, max, "{precision:?}");
        let step = chrono::TimeDelta::from_std(codec.resolution()).unwrap();
        assert!(
            matches!(
                codec.encode(max + step, &mut Vec::new()),
                Err(EncodingError::TimeOutOfRange(_))
            ),
            "{precision:?}"
        );
    }
}

// ------------------------------------------------------------------------------------------------
// Ordering and decode robustness
// ------------------------------------------------------------------------------------------------

#[test]
fn encodings_sort_chronologically() {
    let earlier = instant(2025, 6, 1, 8, 0, 0, 0);
    let later = instant(2025, 6, 3, 9, 30, 0, 0);
    for precision in TemporalPrecision::ALL {
        let codec = TimeCodec::new(precision);
        let (a, _) = roundtrip(&codec, earlier);
        let (b, _) = roundtrip(&codec, later);
        assert!(a < b, "{precision:?}");
    }
}

#[test]
fn signed_precisions_sort_across_1970() {
    let before = instant(1969, 12, 31, 23, 59, 59, 0);
    let after = instant(1970, 1, 1, 0, 0, 1, 0);
    for precision in [TemporalPrecision::Nanosecond, TemporalPrecision::Millisecond] {
        let codec = TimeCodec::new(precision);
        let (a, decoded) = roundtrip(&codec, before);
        let (b, _) = roundtrip(&codec, after);
        assert!(a < b, "{precision:?}");
        assert_eq!(decoded, before);
    }

    let mut epoch = Vec::new();
    TimeCodec::new(TemporalPrecision::Millisecond)
        .encode(DateTime::UNIX_EPOCH, &mut epoch)
        .unwrap();
    assert_eq!(epoch, [0x80, 0, 0, 0, 0, 0, 0, 0]);
}

#[test]
fn decode_never_panics_on_short_input() {
    for precision in TemporalPrecision::ALL {
        let codec = TimeCodec::new(precision);
        let _ = codec.decode(&[]);
        let _ = codec.decode(&[0xFF]);
    }
    assert_eq!(
        TimeCodec::new(TemporalPrecision::Second).decode(&[]),
        DateTime::UNIX_EPOCH
    );
}

#[test]
fn precision_tags_roundtrip() {
    for precision in TemporalPrecision::ALL {
        assert_eq!(TemporalPrecision::from_tag(precision.tag()).unwrap(), precision);
    }
    assert!(TemporalPrecision::from_tag(6).is_err());
}
