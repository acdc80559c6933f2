//! SDP Security Descriptions (RFC 4568) for SRTP.
//!
//! Generates the local master key for a stream, renders it as an
//! `a=crypto` offer line, and accepts the remote side's `a=crypto` answer,
//! installing SRTP policies through an [`SrtpEngine`] when the remote key
//! changes.
//!
//! ```text
//! a=crypto:1 AES_CM_128_HMAC_SHA1_80 inline:PS1uQCVeeCFCanVmcjkpPywjNWhcYD0mXXtxaVBR
//! ```

mod codec;
mod context;
mod engine;
mod error;
mod key;
mod negotiation;
pub mod parser;
mod suite;

pub use codec::{Base64Codec, KeyCodec, MASTER_LEN_B64};
pub use context::CryptoContext;
pub use engine::{Direction, EngineError, EngineHandle, MediaTransport, SrtpEngine};
pub use error::SdesError;
pub use key::{MasterKey, MASTER_KEY_LEN, MASTER_LEN, MASTER_SALT_LEN};
pub use negotiation::{Acceptance, Negotiator};
pub use parser::{parse_answer, parse_attribute, CryptoAnswer, CryptoAttribute, KeyLifetime, KeyParam};
pub use suite::CryptoSuite;
