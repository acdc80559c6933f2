//! Per-stream SDES key state.

use std::fmt;

use super::codec::{Base64Codec, KeyCodec};
use super::engine::SrtpEngine;
use super::error::SdesError;
use super::key::{MasterKey, MASTER_LEN};
use super::suite::CryptoSuite;

/// Keying state for one media stream.
///
/// The local key is generated once in [`CryptoContext::create`] and never
/// changes. The remote side starts out all-zero and is replaced only when an
/// answer carries a different key. Owned by the session driving the stream;
/// not meant to be shared across sessions.
pub struct CryptoContext {
    local_key: MasterKey,
    local_key_b64: String,
    remote_key: MasterKey,
    suite: Option<CryptoSuite>,
    tag: Option<String>,
    offer_line: Option<String>,
}

impl CryptoContext {
    /// Generate a fresh local key with the engine's random source.
    pub fn create<E: SrtpEngine>(engine: &E) -> Result<Self, SdesError> {
        Self::create_with_codec(engine, &Base64Codec)
    }

    /// Like [`CryptoContext::create`], checking the key against `codec`.
    ///
    /// The key must survive an encode/decode round trip through `codec`
    /// byte for byte, otherwise no context is returned.
    pub fn create_with_codec<E, C>(engine: &E, codec: &C) -> Result<Self, SdesError>
    where
        E: SrtpEngine,
        C: KeyCodec + ?Sized,
    {
        let mut local_key = MasterKey::zeroed();
        engine
            .fill_random(local_key.as_bytes_mut())
            .map_err(SdesError::RandomSourceFailure)?;

        let local_key_b64 = codec.encode(&local_key);

        let decoded = codec.decode(&local_key_b64).map_err(|e| {
            tracing::error!("base64 encode/decode bad len: {}", e);
            SdesError::SelfTestFailure(e.to_string())
        })?;
        if decoded != local_key {
            tracing::error!("base64 encode/decode bad key");
            return Err(SdesError::SelfTestFailure(format!(
                "decoded {} bytes differ from generated key",
                MASTER_LEN
            )));
        }

        tracing::debug!("local key encoded, {} chars", local_key_b64.len());

        Ok(Self {
            local_key,
            local_key_b64,
            remote_key: MasterKey::zeroed(),
            suite: None,
            tag: None,
            offer_line: None,
        })
    }

    pub fn local_key(&self) -> &MasterKey {
        &self.local_key
    }

    pub fn local_key_b64(&self) -> &str {
        &self.local_key_b64
    }

    /// Last accepted remote key, `None` until an answer has been accepted.
    pub fn remote_key(&self) -> Option<&MasterKey> {
        if self.remote_key.is_zero() {
            None
        } else {
            Some(&self.remote_key)
        }
    }

    pub fn suite(&self) -> Option<CryptoSuite> {
        self.suite
    }

    /// Tag adopted from the first accepted answer, as the peer wrote it.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Most recently rendered offer line, if any.
    pub fn offer_line(&self) -> Option<&str> {
        self.offer_line.as_deref()
    }

    pub(crate) fn remote_key_matches(&self, key: &MasterKey) -> bool {
        self.remote_key == *key
    }

    pub(crate) fn store_remote(&mut self, suite: CryptoSuite, key: MasterKey) {
        self.suite = Some(suite);
        self.remote_key = key;
        self.offer_line = None;
    }

    /// Pin the suite used for offers before any answer arrives.
    pub fn prefer_suite(&mut self, suite: CryptoSuite) {
        if self.suite != Some(suite) {
            self.suite = Some(suite);
            self.offer_line = None;
        }
    }

    /// Returns the suite, filling in the default on first use.
    pub(crate) fn suite_or_default(&mut self) -> CryptoSuite {
        *self.suite.get_or_insert_with(CryptoSuite::strongest)
    }

    /// Keep `tag` unless one was adopted before. Returns whether it was taken.
    pub(crate) fn adopt_tag(&mut self, tag: &str) -> bool {
        if self.tag.is_some() {
            return false;
        }
        self.tag = Some(tag.to_string());
        self.offer_line = None;
        true
    }

    pub(crate) fn set_offer_line(&mut self, line: String) -> &str {
        self.offer_line.insert(line)
    }
}

// Key text stays out of logs.
impl fmt::Debug for CryptoContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoContext")
            .field("local_key", &self.local_key)
            .field("remote_key", &self.remote_key)
            .field("suite", &self.suite)
            .field("tag", &self.tag)
            .field("has_offer_line", &self.offer_line.is_some())
            .finish()
    }
}
