//! Fixed-length SRTP master key material.

use std::fmt;

/// Master key length for AES-128 (16 bytes).
pub const MASTER_KEY_LEN: usize = 16;

/// Master salt length (14 bytes per RFC 3711).
pub const MASTER_SALT_LEN: usize = 14;

/// Total keying material: 16 bytes key + 14 bytes salt = 30 bytes.
pub const MASTER_LEN: usize = MASTER_KEY_LEN + MASTER_SALT_LEN;

/// SRTP master key followed by master salt, exactly [`MASTER_LEN`] bytes.
///
/// The all-zero value doubles as the "nothing accepted yet" marker for the
/// remote side of a context.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MasterKey([u8; MASTER_LEN]);

impl MasterKey {
    pub const fn zeroed() -> Self {
        Self([0u8; MASTER_LEN])
    }

    pub const fn from_bytes(bytes: [u8; MASTER_LEN]) -> Self {
        Self(bytes)
    }

    /// Copy key material out of a slice, `None` unless it is exactly 30 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; MASTER_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    pub fn as_bytes(&self) -> &[u8; MASTER_LEN] {
        &self.0
    }

    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8; MASTER_LEN] {
        &mut self.0
    }

    /// The 16-byte master key.
    pub fn key(&self) -> [u8; MASTER_KEY_LEN] {
        let mut key = [0u8; MASTER_KEY_LEN];
        key.copy_from_slice(&self.0[..MASTER_KEY_LEN]);
        key
    }

    /// The 14-byte master salt.
    pub fn salt(&self) -> [u8; MASTER_SALT_LEN] {
        let mut salt = [0u8; MASTER_SALT_LEN];
        salt.copy_from_slice(&self.0[MASTER_KEY_LEN..]);
        salt
    }
}

impl Default for MasterKey {
    fn default() -> Self {
        Self::zeroed()
    }
}

// Never print key bytes.
impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            f.write_str("MasterKey(<unset>)")
        } else {
            f.write_str("MasterKey(<redacted>)")
        }
    }
}
