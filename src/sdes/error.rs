//! Error taxonomy for SDES negotiation.

use thiserror::Error;

use super::engine::EngineError;

/// Failures reported by context setup, offer rendering and answer processing.
///
/// Parse failures (`MalformedLine` through `KeyLengthMismatch`) reject only the
/// offending line; any previously accepted key and installed policy stay as
/// they were.
#[derive(Debug, Error)]
pub enum SdesError {
    #[error("no SRTP engine registered")]
    EngineUnavailable,

    #[error("SRTP random source failed")]
    RandomSourceFailure(#[source] EngineError),

    #[error("base64 encode/decode self-test failed: {0}")]
    SelfTestFailure(String),

    #[error("decoded key is {actual} bytes (need {expected})")]
    DecodeLengthMismatch { expected: usize, actual: usize },

    #[error("malformed crypto attribute: {0}")]
    MalformedLine(String),

    #[error("unsupported crypto session parameters: {0}")]
    UnsupportedSessionParams(String),

    #[error("unsupported crypto suite: {0}")]
    UnsupportedSuite(String),

    #[error("SRTP crypto offer not acceptable")]
    NoAcceptableOffer,

    #[error("SRTP descriptions key is {actual} bytes (need {expected})")]
    KeyLengthMismatch { expected: usize, actual: usize },

    #[error("could not activate SRTP policy")]
    PolicyActivationFailure(#[source] EngineError),
}
