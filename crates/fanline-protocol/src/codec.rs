//! Codec for encoding and decoding routed envelopes.
//!
//! Envelopes are MessagePack-encoded maps. The substrate's pub/sub channels
//! are message-oriented, so no framing prefix is needed.

use bytes::Bytes;
use thiserror::Error;

use crate::envelope::RoutedEnvelope;

/// Maximum encoded envelope size (1 MiB).
pub const MAX_ENVELOPE_SIZE: usize = 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Envelope exceeds maximum size.
    #[error("Envelope size {0} exceeds maximum {MAX_ENVELOPE_SIZE}")]
    TooLarge(usize),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Encode an envelope to bytes.
///
/// # Errors
///
/// Returns an error if the envelope is too large or encoding fails.
pub fn encode(envelope: &RoutedEnvelope) -> Result<Bytes, ProtocolError> {
    let payload = rmp_serde::to_vec_named(envelope)?;

    if payload.len() > MAX_ENVELOPE_SIZE {
        return Err(ProtocolError::TooLarge(payload.len()));
    }

    Ok(Bytes::from(payload))
}

/// Decode an envelope from bytes.
///
/// # Errors
///
/// Returns an error if the data is too large or invalid.
pub fn decode(data: &[u8]) -> Result<RoutedEnvelope, ProtocolError> {
    if data.len() > MAX_ENVELOPE_SIZE {
        return Err(ProtocolError::TooLarge(data.len()));
    }

    let envelope = rmp_serde::from_slice(data)?;
    Ok(envelope)
}
