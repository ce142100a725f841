//! # Time encodings
//!
//! Fixed-width encodings of an instant at a configurable precision. Every
//! record written by [`crate::codec`] carries one of these as its suffix, so
//! the width must be known up front and never vary for a given store.
//!
//! | Precision     | Width | Layout (big-endian)                          |
//! |---------------|-------|----------------------------------------------|
//! | `Nanosecond`  | 12    | `[i64* seconds][u32 nanos]` since 1970       |
//! | `Millisecond` | 8     | `[i64* millis]` since 1970                   |
//! | `Second`      | 4     | `[u32 seconds]` since 1970                   |
//! | `Minute`      | 4     | `[u32 minutes]` since 1970                   |
//! | `Hour`        | 3     | `[u24 hours]` since 1970                     |
//! | `Day`         | 2     | `[u16 days]` since [`DAY_EPOCH_SECONDS`]     |
//!
//! `i64*` is a signed count with its sign bit flipped, so that byte order
//! equals chronological order on both sides of 1970.
//!
//! Encoding truncates toward the past to the precision's resolution.
//! Decoding never fails: it reconstructs exactly the truncated instant.

#[cfg(test)]
mod tests;

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::encoding::EncodingError;

/// Start of the day-precision epoch: 2025-01-01T00:00:00Z.
pub const DAY_EPOCH_SECONDS: i64 = 1_735_689_600;

const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 3_600;
const SECONDS_PER_DAY: i64 = 86_400;
const MAX_U24: i64 = (1 << 24) - 1;
const SIGN_BIT: u64 = 1 << 63;

/// Largest encoded width of any precision.
const MAX_WIDTH: usize = 12;

/// Temporal resolution of a store, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalPrecision {
    Nanosecond,
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
}

impl TemporalPrecision {
    /// All precisions, in tag order.
    pub const ALL: [TemporalPrecision; 6] = [
        TemporalPrecision::Nanosecond,
        TemporalPrecision::Millisecond,
        TemporalPrecision::Second,
        TemporalPrecision::Minute,
        TemporalPrecision::Hour,
        TemporalPrecision::Day,
    ];

    /// Persisted one-byte tag.
    pub fn tag(self) -> u8 {
        match self {
            TemporalPrecision::Nanosecond => 0,
            TemporalPrecision::Millisecond => 1,
            TemporalPrecision::Second => 2,
            TemporalPrecision::Minute => 3,
            TemporalPrecision::Hour => 4,
            TemporalPrecision::Day => 5,
        }
    }

    /// Inverse of [`TemporalPrecision::tag`].
    pub fn from_tag(tag: u8) -> Result<Self, EncodingError> {
        Self::ALL
            .get(usize::from(tag))
            .copied()
            .ok_or(EncodingError::InvalidTag {
                tag,
                type_name: "TemporalPrecision",
            })
    }
}

/// Encodes and decodes instants at one [`TemporalPrecision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeCodec {
    precision: TemporalPrecision,
}

impl TimeCodec {
    pub fn new(precision: TemporalPrecision) -> Self {
        Self { precision }
    }

    pub fn precision(&self) -> TemporalPrecision {
        self.precision
    }

    /// Number of bytes every encoded instant occupies.
    pub fn size(&self) -> usize {
        match self.precision {
            TemporalPrecision::Nanosecond => 12,
            TemporalPrecision::Millisecond => 8,
            TemporalPrecision::Second | TemporalPrecision::Minute => 4,
            TemporalPrecision::Hour => 3,
            TemporalPrecision::Day => 2,
        }
    }

    /// Smallest distinguishable step between two encoded instants.
    pub fn resolution(&self) -> Duration {
        match self.precision {
            TemporalPrecision::Nanosecond => Duration::from_nanos(1),
            TemporalPrecision::Millisecond => Duration::from_millis(1),
            TemporalPrecision::Second => Duration::from_secs(1),
            TemporalPrecision::Minute => Duration::from_secs(SECONDS_PER_MINUTE as u64),
            TemporalPrecision::Hour => Duration::from_secs(SECONDS_PER_HOUR as u64),
            TemporalPrecision::Day => Duration::from_secs(SECONDS_PER_DAY as u64),
        }
    }

    /// Append the encoding of `instant` to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`EncodingError::TimeOutOfRange`] if the truncated instant
    /// cannot be represented in this precision's width (for example a
    /// pre-2025 instant at day precision).
    pub fn encode(&self, instant: DateTime<Utc>, out: &mut Vec<u8>) -> Result<(), EncodingError> {
        let secs = instant.timestamp();
        let out_of_range = || EncodingError::TimeOutOfRange(instant.to_rfc3339());
        match self.precision {
            TemporalPrecision::Nanosecond => {
                out.extend_from_slice(&order_preserving(secs));
                out.extend_from_slice(&instant.timestamp_subsec_nanos().to_be_bytes());
            }
            TemporalPrecision::Millisecond => {
                out.extend_from_slice(&order_preserving(instant.timestamp_millis()));
            }
            TemporalPrecision::Second => {
                let v = u32::try_from(secs).map_err(|_| out_of_range())?;
                out.extend_from_slice(&v.to_be_bytes());
            }
            TemporalPrecision::Minute => {
                let v = u32::try_from(secs.div_euclid(SECONDS_PER_MINUTE))
                    .map_err(|_| out_of_range())?;
                out.extend_from_slice(&v.to_be_bytes());
            }
            TemporalPrecision::Hour => {
                let hours = secs.div_euclid(SECONDS_PER_HOUR);
                if !(0..=MAX_U24).contains(&hours) {
                    return Err(out_of_range());
                }
                out.extend_from_slice(&hours.to_be_bytes()[5..]);
            }
            TemporalPrecision::Day => {
                let days = (secs - DAY_EPOCH_SECONDS).div_euclid(SECONDS_PER_DAY);
                let v = u16::try_from(days).map_err(|_| out_of_range())?;
                out.extend_from_slice(&v.to_be_bytes());
            }
        }
        Ok(())
    }

    /// Decode an instant from the first [`TimeCodec::size`] bytes of `buf`.
    ///
    /// Missing bytes read as zero; a stored value outside the calendar range
    /// decodes to the Unix epoch.
    pub fn decode(&self, buf: &[u8]) -> DateTime<Utc> {
        let mut raw = [0u8; MAX_WIDTH];
        let n = buf.len().min(self.size());
        raw[..n].copy_from_slice(&buf[..n]);

        let decoded = match self.precision {
            TemporalPrecision::Nanosecond => {
                let mut secs = [0u8; 8];
                secs.copy_from_slice(&raw[..8]);
                let mut nanos = [0u8; 4];
                nanos.copy_from_slice(&raw[8..12]);
                DateTime::from_timestamp(from_order_preserving(secs), u32::from_be_bytes(nanos))
            }
            TemporalPrecision::Millisecond => {
                let mut millis = [0u8; 8];
                millis.copy_from_slice(&raw[..8]);
                DateTime::from_timestamp_millis(from_order_preserving(millis))
            }
            TemporalPrecision::Second => {
                DateTime::from_timestamp(i64::from(be_u32(&raw)), 0)
            }
            TemporalPrecision::Minute => {
                DateTime::from_timestamp(i64::from(be_u32(&raw)) * SECONDS_PER_MINUTE, 0)
            }
            TemporalPrecision::Hour => {
                let hours = (i64::from(raw[0]) << 16) | (i64::from(raw[1]) << 8) | i64::from(raw[2]);
                DateTime::from_timestamp(hours * SECONDS_PER_HOUR, 0)
            }
            TemporalPrecision::Day => {
                let days = i64::from(u16::from_be_bytes([raw[0], raw[1]]));
                DateTime::from_timestamp(DAY_EPOCH_SECONDS + days * SECONDS_PER_DAY, 0)
            }
        };
        decoded.unwrap_or_default()
    }

    /// Truncate `instant` to this precision, as a round trip would.
    pub fn truncate(&self, instant: DateTime<Utc>) -> Result<DateTime<Utc>, EncodingError> {
        let mut buf = Vec::with_capacity(self.size());
        self.encode(instant, &mut buf)?;
        Ok(self.decode(&buf))
    }

    /// Smallest instant this codec can encode.
    pub fn min_instant(&self) -> DateTime<Utc> {
        match self.precision {
            TemporalPrecision::Nanosecond | TemporalPrecision::Millisecond => {
                DateTime::<Utc>::MIN_UTC
            }
            TemporalPrecision::Second | TemporalPrecision::Minute | TemporalPrecision::Hour => {
                DateTime::UNIX_EPOCH
            }
            TemporalPrecision::Day => {
                DateTime::from_timestamp(DAY_EPOCH_SECONDS, 0).unwrap_or_default()
            }
        }
    }

    /// Largest instant this codec can encode. Every later instant up to the
    /// end of the same resolution step encodes to the same bytes.
    pub fn max_instant(&self) -> DateTime<Utc> {
        let secs = match self.precision {
            TemporalPrecision::Nanosecond | TemporalPrecision::Millisecond => {
                return DateTime::<Utc>::MAX_UTC;
            }
            TemporalPrecision::Second => i64::from(u32::MAX),
            TemporalPrecision::Minute => i64::from(u32::MAX) * SECONDS_PER_MINUTE,
            TemporalPrecision::Hour => MAX_U24 * SECONDS_PER_HOUR,
            TemporalPrecision::Day => DAY_EPOCH_SECONDS + i64::from(u16::MAX) * SECONDS_PER_DAY,
        };
        DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

fn order_preserving(v: i64) -> [u8; 8] {
    ((v as u64) ^ SIGN_BIT).to_be_bytes()
}

fn from_order_preserving(bytes: [u8; 8]) -> i64 {
    (u64::from_be_bytes(bytes) ^ SIGN_BIT) as i64
}

fn be_u32(raw: &[u8; MAX_WIDTH]) -> u32 {
    u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]])
}
