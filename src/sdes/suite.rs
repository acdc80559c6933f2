//! SRTP crypto suites understood in `a=crypto` lines.

use std::fmt;
use std::str::FromStr;

use super::error::SdesError;

/// Crypto suites from RFC 4568 section 6.2 that this negotiator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CryptoSuite {
    AesCm128HmacSha1_80,
    AesCm128HmacSha1_32,
}

impl CryptoSuite {
    /// All supported suites, strongest first.
    pub const ALL: [CryptoSuite; 2] = [
        CryptoSuite::AesCm128HmacSha1_80,
        CryptoSuite::AesCm128HmacSha1_32,
    ];

    /// Suite used for offers when nothing has been negotiated yet.
    pub const fn strongest() -> Self {
        CryptoSuite::AesCm128HmacSha1_80
    }

    /// Name as it appears on the wire.
    pub const fn as_str(&self) -> &'static str {
        match self {
            CryptoSuite::AesCm128HmacSha1_80 => "AES_CM_128_HMAC_SHA1_80",
            CryptoSuite::AesCm128HmacSha1_32 => "AES_CM_128_HMAC_SHA1_32",
        }
    }

    /// SRTP authentication tag length in bytes.
    pub const fn srtp_auth_tag_len(&self) -> usize {
        match self {
            CryptoSuite::AesCm128HmacSha1_80 => 10,
            CryptoSuite::AesCm128HmacSha1_32 => 4,
        }
    }

    /// SRTCP authentication tag length in bytes (80 bits for both suites).
    pub const fn srtcp_auth_tag_len(&self) -> usize {
        10
    }
}

impl fmt::Display for CryptoSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CryptoSuite {
    type Err = SdesError;

    /// Exact, case-sensitive match against the wire names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|suite| suite.as_str() == s)
            .ok_or_else(|| SdesError::UnsupportedSuite(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_suites() {
        assert_eq!(
            "AES_CM_128_HMAC_SHA1_80".parse::<CryptoSuite>().unwrap(),
            CryptoSuite::AesCm128HmacSha1_80
        );
        assert_eq!(
            "AES_CM_128_HMAC_SHA1_32".parse::<CryptoSuite>().unwrap(),
            CryptoSuite::AesCm128HmacSha1_32
        );
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        let err = "aes_cm_128_hmac_sha1_80".parse::<CryptoSuite>().unwrap_err();
        assert!(matches!(err, SdesError::UnsupportedSuite(_)));
    }

    #[test]
    fn test_unknown_suite() {
        assert!("F8_128_HMAC_SHA1_80".parse::<CryptoSuite>().is_err());
        assert!("AES_256_CM_HMAC_SHA1_80".parse::<CryptoSuite>().is_err());
    }

    #[test]
    fn test_display_matches_wire_name() {
        for suite in CryptoSuite::ALL {
            assert_eq!(suite.to_string().parse::<CryptoSuite>().unwrap(), suite);
        }
        assert_eq!(CryptoSuite::strongest(), CryptoSuite::ALL[0]);
    }

    #[test]
    fn test_auth_tag_lengths() {
        assert_eq!(CryptoSuite::AesCm128HmacSha1_80.srtp_auth_tag_len(), 10);
        assert_eq!(CryptoSuite::AesCm128HmacSha1_32.srtp_auth_tag_len(), 4);
        assert_eq!(CryptoSuite::AesCm128HmacSha1_32.srtcp_auth_tag_len(), 10);
    }
}
