//! ## provbank-core::codec
//! **Wire-level timing header**
//!
//! Every measured packet carries a fixed 12-byte header in front of its
//! opaque payload: a 4-byte sequence number followed by an 8-byte
//! microseconds-since-epoch send timestamp. Both fields are big-endian
//! regardless of host byte order, so records produced on one machine decode
//! identically on any other.
//!
//! Encoding and decoding are pure; the only clock access is in
//! [`stamp`], which samples the send timestamp at the last possible moment
//! before the bytes leave the process.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::time::Clock;

/// Length of the fixed timing header in bytes.
pub const HEADER_LEN: usize = 12;

/// Codec error conditions. Malformed input is fatal to the single record,
/// never to the run.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("timing header requires {HEADER_LEN} bytes, got {0}")]
    MalformedHeader(usize),
}

/// The minimal unit of measurement: sequence number, origin send timestamp,
/// opaque payload.
///
/// `sequence` is monotonic per sender-session and wraps at `u32::MAX`.
/// `origin_timestamp_us` is sampled at the instant of transmission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimingRecord {
    pub sequence: u32,
    pub origin_timestamp_us: u64,
    pub payload: Bytes,
}

/// Prefixes the timing header to `payload`. Pure; callers that need the
/// timestamp sampled at send time should use [`stamp`] instead.
pub fn encode(sequence: u32, origin_timestamp_us: u64, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u32(sequence);
    buf.put_u64(origin_timestamp_us);
    buf.put_slice(payload);
    buf.freeze()
}

/// Encodes a record with the origin timestamp taken from `clock` as the
/// final step before returning, minimizing skew between the stamped time
/// and the actual send. Returns the encoded bytes and the sampled timestamp.
pub fn stamp(sequence: u32, payload: &[u8], clock: &dyn Clock) -> (Bytes, u64) {
    let origin = clock.now_us();
    (encode(sequence, origin, payload), origin)
}

/// Splits a packet back into its timing record.
///
/// Fails with [`CodecError::MalformedHeader`] when the input is shorter than
/// the header; never yields a partial record.
pub fn decode(bytes: &[u8]) -> Result<TimingRecord, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::MalformedHeader(bytes.len()));
    }
    let sequence = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let origin_timestamp_us = u64::from_be_bytes([
        bytes[4], bytes[5], bytes[6], bytes[7], bytes[8], bytes[9], bytes[10], bytes[11],
    ]);
    Ok(TimingRecord {
        sequence,
        origin_timestamp_us,
        payload: Bytes::copy_from_slice(&bytes[HEADER_LEN..]),
    })
}
