//! Base64 text encoding for SRTP master key material.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::{DecodeError, Engine};

use super::error::SdesError;
use super::key::{MasterKey, MASTER_LEN};

/// Standard alphabet, padded on encode, lenient on decode.
///
/// Some endpoints strip the trailing `=`; 30-byte keys never need it anyway.
/// Leftover bits in a truncated last quantum are dropped, so a clipped key
/// decodes to a short buffer instead of failing outright.
const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Encoded length of a 30-byte key (40 characters, no padding needed).
pub const MASTER_LEN_B64: usize = (MASTER_LEN + 2) / 3 * 4;

/// Text transport for fixed-length key material.
pub trait KeyCodec {
    fn encode(&self, key: &MasterKey) -> String;

    /// Decode `text`; anything other than exactly 30 bytes is rejected.
    fn decode(&self, text: &str) -> Result<MasterKey, SdesError>;
}

/// The base64 mapping used in `inline:` key parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Codec;

impl KeyCodec for Base64Codec {
    fn encode(&self, key: &MasterKey) -> String {
        KEY_ENGINE.encode(key.as_bytes())
    }

    fn decode(&self, text: &str) -> Result<MasterKey, SdesError> {
        let decoded = KEY_ENGINE.decode(text).map_err(|e| {
            tracing::debug!("base64 key rejected: {}", e);
            SdesError::DecodeLengthMismatch {
                expected: MASTER_LEN,
                actual: usable_len(text, &e),
            }
        })?;
        MasterKey::from_slice(&decoded).ok_or(SdesError::DecodeLengthMismatch {
            expected: MASTER_LEN,
            actual: decoded.len(),
        })
    }
}

/// Bytes recoverable from `text` before the decoder gave up.
fn usable_len(text: &str, err: &DecodeError) -> usize {
    match err {
        DecodeError::InvalidByte(offset, _) => offset * 3 / 4,
        _ => (text.len() + 3) / 4 * 3,
    }
}
