//! Randomized byte ranges into the benchmark object.

use std::fmt;

use rand::Rng;

use crate::error::{BenchError, Result};

/// A half-open byte interval `[start, end)` into the target object.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ByteRange {
    /// Offset of the first byte.
    pub start: u64,
    /// Offset one past the last byte.
    pub end: u64,
}

impl ByteRange {
    /// Picks a uniformly random range of `len` bytes that lies entirely within an object of
    /// `object_size` bytes.
    ///
    /// Fails if the range cannot fit, independently of the random source.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, object_size: u64, len: u64) -> Result<Self> {
        if len == 0 || len > object_size {
            return Err(BenchError::RangeTooLarge {
                payload: len,
                object: object_size,
            });
        }

        let start = rng.random_range(0..=object_size - len);
        Ok(Self {
            start,
            end: start + len,
        })
    }

    /// Number of bytes covered by this range.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Returns `true` if the range covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Renders the range as an HTTP `Range` header value.
    ///
    /// HTTP ranges are inclusive on both ends, so the last byte is `end - 1`.
    pub fn to_http_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end.saturating_sub(1))
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}
