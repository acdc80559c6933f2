//! Parser for one RFC 4568 crypto attribute.
//!
//! Grammar handled (attribute name optional):
//! - `1 AES_CM_128_HMAC_SHA1_80 inline:<key||salt>`
//! - `1 AES_CM_128_HMAC_SHA1_80 inline:<key||salt>|2^20|1:32`
//! - `1 AES_CM_128_HMAC_SHA1_80 inline:<key||salt>|1066:4`
//! - `2 AES_CM_128_HMAC_SHA1_32 inline:<a>|2^20|1:4;inline:<b>|2:4`
//!
//! Session parameters are not supported and reject the whole line. Key
//! parameters carrying a lifetime are skipped; the first `inline` key without
//! one is chosen.

use super::codec::{Base64Codec, KeyCodec};
use super::error::SdesError;
use super::key::MasterKey;
use super::suite::CryptoSuite;

const ATTRIBUTE_PREFIXES: [&str; 2] = ["a=crypto:", "crypto:"];

/// RFC 4568 allows at most nine digits in a tag.
const MAX_TAG_DIGITS: usize = 9;

/// Key lifetime as written, with its packet count when it could be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyLifetime<'a> {
    pub raw: &'a str,
    pub packets: Option<u64>,
}

impl<'a> KeyLifetime<'a> {
    /// `2^N` means two to the power N; anything else is a decimal count.
    pub fn parse(raw: &'a str) -> Self {
        let packets = match raw.strip_prefix("2^") {
            Some(exp) => exp
                .parse::<u32>()
                .ok()
                .and_then(|n| 2u64.checked_pow(n)),
            None => raw.parse::<u64>().ok(),
        };
        Self { raw, packets }
    }
}

/// One `;`-separated entry of the key-params field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyParam<'a> {
    pub method: &'a str,
    /// Base64 key and salt. Only present for `inline` entries.
    pub key_salt: Option<&'a str>,
    pub lifetime: Option<KeyLifetime<'a>>,
    /// `value:length` master key index, kept as written.
    pub mki: Option<&'a str>,
}

impl<'a> KeyParam<'a> {
    fn parse(entry: &'a str) -> Self {
        let (method, info) = match entry.split_once(':') {
            Some((method, info)) => (method, Some(info)),
            None => (entry, None),
        };

        if method != "inline" {
            return Self {
                method,
                key_salt: None,
                lifetime: None,
                mki: None,
            };
        }

        let mut fields = info.unwrap_or("").split('|');
        let key_salt = fields.next().filter(|s| !s.is_empty());
        let second = fields.next();

        // The field after the key is either a lifetime or an MKI. Only an
        // MKI has a colon in it. An empty field still counts as a lifetime.
        let (lifetime, mki) = match second {
            Some(field) if field.contains(':') => (None, Some(field)),
            Some(field) => (
                Some(KeyLifetime::parse(field)),
                fields.next().filter(|s| !s.is_empty()),
            ),
            None => (None, None),
        };

        tracing::trace!(
            "SRTP SDES lifetime {} MKI {}",
            lifetime.map(|l| l.raw).unwrap_or("-"),
            mki.unwrap_or("-")
        );

        Self {
            method,
            key_salt,
            lifetime,
            mki,
        }
    }

    /// An `inline` key with no lifetime attached.
    pub fn is_usable(&self) -> bool {
        self.method == "inline" && self.key_salt.is_some() && self.lifetime.is_none()
    }
}

/// Structure of a crypto attribute, before the chosen key is decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoAttribute<'a> {
    /// Tag digits exactly as sent.
    pub tag: &'a str,
    pub suite: CryptoSuite,
    /// Every key parameter up to and including the chosen one.
    pub key_params: Vec<KeyParam<'a>>,
}

impl<'a> CryptoAttribute<'a> {
    /// The accepted key parameter (always the last one examined).
    pub fn chosen(&self) -> Option<&KeyParam<'a>> {
        self.key_params.last().filter(|p| p.is_usable())
    }
}

/// A parsed answer ready for negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoAnswer {
    pub tag: String,
    pub suite: CryptoSuite,
    pub remote_key: MasterKey,
}

/// Parse the structure of `line` and pick the first acceptable key parameter.
pub fn parse_attribute(line: &str) -> Result<CryptoAttribute<'_>, SdesError> {
    let body = strip_attribute_name(line.trim());

    let mut tokens = body.split_whitespace();
    let (tag, suite) = match (tokens.next(), tokens.next()) {
        (Some(tag), Some(suite)) => (tag, suite),
        _ => {
            tracing::warn!("Unrecognized crypto attribute: {}", line);
            return Err(SdesError::MalformedLine(line.to_string()));
        }
    };
    let key_params = tokens.next();
    let session_params: Vec<&str> = tokens.collect();

    if !session_params.is_empty() {
        let joined = session_params.join(" ");
        tracing::warn!("Unsupported crypto parameters: {}", joined);
        return Err(SdesError::UnsupportedSessionParams(joined));
    }

    let tag = parse_tag(tag).ok_or_else(|| {
        tracing::warn!("Bad crypto tag in: {}", line);
        SdesError::MalformedLine(line.to_string())
    })?;

    let suite: CryptoSuite = suite.parse().map_err(|e| {
        tracing::warn!("Unsupported crypto suite: {}", suite);
        e
    })?;

    let mut seen = Vec::new();
    for entry in key_params.unwrap_or("").split(';') {
        let param = KeyParam::parse(entry);
        let usable = param.is_usable();
        if let Some(lifetime) = param.lifetime {
            tracing::info!(
                "Crypto life time (unsupported): {} Lifetime {}",
                line,
                lifetime
                    .packets
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| lifetime.raw.to_string())
            );
        }
        seen.push(param);
        if usable {
            return Ok(CryptoAttribute {
                tag,
                suite,
                key_params: seen,
            });
        }
    }

    tracing::info!("SRTP crypto offer not acceptable");
    Err(SdesError::NoAcceptableOffer)
}

/// Parse `line` and decode the chosen key with `codec`.
pub fn parse_answer_with<C: KeyCodec + ?Sized>(
    line: &str,
    codec: &C,
) -> Result<CryptoAnswer, SdesError> {
    let attr = parse_attribute(line)?;
    let key_salt = attr
        .chosen()
        .and_then(|p| p.key_salt)
        .ok_or(SdesError::NoAcceptableOffer)?;

    let remote_key = codec.decode(key_salt).map_err(|e| match e {
        SdesError::DecodeLengthMismatch { expected, actual } => {
            tracing::warn!("SRTP descriptions key {} != {}", actual, expected);
            SdesError::KeyLengthMismatch { expected, actual }
        }
        other => {
            tracing::warn!("SRTP descriptions key unreadable: {}", other);
            other
        }
    })?;

    Ok(CryptoAnswer {
        tag: attr.tag.to_string(),
        suite: attr.suite,
        remote_key,
    })
}

/// [`parse_answer_with`] using base64.
pub fn parse_answer(line: &str) -> Result<CryptoAnswer, SdesError> {
    parse_answer_with(line, &Base64Codec)
}

fn strip_attribute_name(line: &str) -> &str {
    ATTRIBUTE_PREFIXES
        .iter()
        .find_map(|prefix| line.strip_prefix(prefix))
        .unwrap_or(line)
}

fn parse_tag(tag: &str) -> Option<&str> {
    let valid = !tag.is_empty()
        && tag.len() <= MAX_TAG_DIGITS
        && tag.bytes().all(|b| b.is_ascii_digit());
    valid.then_some(tag)
}
