//! Decoding of raw characteristic payloads into scaled measurements.

use crate::channel::{ByteOrder, ChannelDescriptor, Layout, SampleKind};
use thiserror::Error;

/// Largest integer magnitude that converts to `f64` without rounding (2^53).
const MAX_EXACT_INTEGER: u64 = 1 << f64::MANTISSA_DIGITS;

/// Error types for decoding characteristic payloads.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Payload width disagrees with the channel layout
    #[error("expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    /// Float payload or scaled value is NaN or infinite
    #[error("value is not a finite number")]
    MalformedFloat,
    /// 64-bit integer that does not fit the f64 mantissa
    #[error("integer {0} cannot be represented exactly")]
    Inexact(String),
}

macro_rules! read_bytes {
    ($ty:ty, $order:expr, $bytes:expr) => {{
        let mut buf = [0u8; std::mem::size_of::<$ty>()];
        buf.copy_from_slice($bytes);
        match $order {
            ByteOrder::Little => <$ty>::from_le_bytes(buf),
            ByteOrder::Big => <$ty>::from_be_bytes(buf),
        }
    }};
}

/// Decode a raw payload into its unscaled numeric value.
///
/// # Errors
/// Returns [`DecodeError::LengthMismatch`] when `bytes` is not exactly the
/// layout width, [`DecodeError::MalformedFloat`] for NaN or infinite floats and
/// [`DecodeError::Inexact`] for 64-bit integers beyond 2^53.
pub fn decode_raw(layout: Layout, bytes: &[u8]) -> Result<f64, DecodeError> {
    let expected = layout.width();
    if bytes.len() != expected {
        return Err(DecodeError::LengthMismatch {
            expected,
            actual: bytes.len(),
        });
    }

    let order = layout.order;
    let value = match layout.kind {
        SampleKind::I8 => f64::from(bytes[0] as i8),
        SampleKind::U8 => f64::from(bytes[0]),
        SampleKind::I16 => f64::from(read_bytes!(i16, order, bytes)),
        SampleKind::U16 => f64::from(read_bytes!(u16, order, bytes)),
        SampleKind::I32 => f64::from(read_bytes!(i32, order, bytes)),
        SampleKind::U32 => f64::from(read_bytes!(u32, order, bytes)),
        SampleKind::I64 => {
            let raw = read_bytes!(i64, order, bytes);
            if raw.unsigned_abs() > MAX_EXACT_INTEGER {
                return Err(DecodeError::Inexact(raw.to_string()));
            }
            raw as f64
        }
        SampleKind::U64 => {
            let raw = read_bytes!(u64, order, bytes);
            if raw > MAX_EXACT_INTEGER {
                return Err(DecodeError::Inexact(raw.to_string()));
            }
            raw as f64
        }
        SampleKind::F32 => f64::from(read_bytes!(f32, order, bytes)),
        SampleKind::F64 => read_bytes!(f64, order, bytes),
    };

    if !value.is_finite() {
        return Err(DecodeError::MalformedFloat);
    }

    Ok(value)
}

/// Decode a raw payload and apply the scale factor.
///
/// The result is always finite.
pub fn decode(layout: Layout, bytes: &[u8], scale: f64) -> Result<f64, DecodeError> {
    let value = decode_raw(layout, bytes)? * scale;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DecodeError::MalformedFloat)
    }
}

/// Decode a payload read from `channel`.
pub fn decode_channel(channel: &ChannelDescriptor, bytes: &[u8]) -> Result<f64, DecodeError> {
    decode(channel.layout, bytes, channel.scale)
}
